use serde::{Deserialize, Serialize};

use super::vector::{Comparison, Vector, VectorSet};
use crate::dialect::Backend;
use crate::http::InjectionPoint;

/// What the connection probe learned about the unmodified page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BaselineSummary {
    pub status: u16,
    pub length: usize,
    /// Mean latency of the baseline samples.
    pub elapsed_ms: u64,
    pub is_dynamic: bool,
}

/// Outcome of a confirmation pass, returned to callers and persisted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InjectionReport {
    pub vulnerable: bool,
    pub backend: Option<Backend>,
    pub parameter: Option<InjectionPoint>,
    /// Vector extraction runs through (error, then boolean, then time).
    pub vector: Option<Vector>,
    pub vectors: VectorSet,
    pub match_string: Option<String>,
    pub not_match_string: Option<String>,
    pub code: Option<u16>,
    pub text_only: bool,
    pub is_multipart: bool,
    pub is_json: bool,
    pub baseline: BaselineSummary,
    pub fingerprint: Option<String>,
    /// Loaded from a previous session instead of being confirmed now.
    #[serde(default)]
    pub resumed: bool,
}

impl InjectionReport {
    pub fn not_injectable() -> Self {
        Self::default()
    }

    /// Build a report around a confirmed vector set.
    pub fn confirmed(parameter: InjectionPoint, vectors: VectorSet, backend: Option<Backend>) -> Self {
        let vector = vectors.primary().cloned();
        let (match_string, not_match_string, code, text_only) = vectors
            .boolean
            .as_ref()
            .map(|v| match &v.comparison {
                Comparison::Boolean { match_string, not_match_string, code, text_only } => {
                    (match_string.clone(), not_match_string.clone(), *code, *text_only)
                }
                _ => (None, None, None, false),
            })
            .unwrap_or_default();
        Self {
            vulnerable: vector.is_some(),
            backend,
            parameter: Some(parameter),
            vector,
            vectors,
            match_string,
            not_match_string,
            code,
            text_only,
            ..Default::default()
        }
    }

    /// Multi-line summary in the style of classic injection tools.
    pub fn render(&self) -> String {
        let Some(parameter) = &self.parameter else {
            return "no injectable parameter found".to_string();
        };
        let mut out = format!(
            "Parameter: {} ({})\n",
            parameter.name, parameter.location
        );
        for vector in self.vectors.iter() {
            out.push_str(&format!(
                "    Type: {}\n    Title: {}\n    Payload: {}\n\n",
                vector.technique, vector.title, vector.template
            ));
        }
        if let Some(backend) = self.backend {
            out.push_str(&format!("back-end DBMS: {}\n", backend));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Location;
    use crate::models::Technique;

    #[test]
    fn test_confirmed_report_carries_match_string() {
        let mut vectors = VectorSet::default();
        vectors.insert(Vector {
            technique: Technique::Boolean,
            title: "AND boolean-based blind".into(),
            template: "[ORIGVALUE] AND ([INFERENCE])".into(),
            comparison: Comparison::Boolean {
                match_string: Some("Welcome".into()),
                not_match_string: None,
                code: None,
                text_only: false,
            },
            backend: None,
        });
        let point = InjectionPoint {
            location: Location::Get,
            name: "id".into(),
            original_value: "1".into(),
            is_custom_marker: false,
        };
        let report = InjectionReport::confirmed(point, vectors, Some(Backend::Mysql));
        assert!(report.vulnerable);
        assert_eq!(report.match_string.as_deref(), Some("Welcome"));
        assert!(report.render().contains("Parameter: id (GET)"));
        assert!(report.render().contains("back-end DBMS: MySQL"));
    }

    #[test]
    fn test_not_injectable_report() {
        let report = InjectionReport::not_injectable();
        assert!(!report.vulnerable);
        assert!(report.vector.is_none());
    }
}
