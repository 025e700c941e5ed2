pub mod metadata;

use serde::{Deserialize, Serialize};

use crate::errors::BlindsightError;

/// Database engines the engine knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Mysql,
    Postgresql,
    Mssql,
    Oracle,
}

impl Backend {
    pub const ALL: [Backend; 4] = [Backend::Mysql, Backend::Postgresql, Backend::Mssql, Backend::Oracle];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mysql => "MySQL",
            Self::Postgresql => "PostgreSQL",
            Self::Mssql => "Microsoft SQL Server",
            Self::Oracle => "Oracle",
        }
    }

    /// A tautology only this engine evaluates without a syntax error.
    pub fn fingerprint_predicate(&self) -> &'static str {
        match self {
            Self::Mysql => "CONNECTION_ID()=CONNECTION_ID()",
            Self::Postgresql => "PG_BACKEND_PID()=PG_BACKEND_PID()",
            Self::Mssql => "@@SPID=@@SPID",
            Self::Oracle => "ROWNUM=ROWNUM",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Backend {
    type Err = BlindsightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "postgresql" | "postgres" | "pgsql" | "pg" => Ok(Self::Postgresql),
            "mssql" | "sqlserver" | "microsoftsqlserver" => Ok(Self::Mssql),
            "oracle" => Ok(Self::Oracle),
            _ => Err(BlindsightError::Config(format!("Unsupported DBMS: {}", s))),
        }
    }
}

/// Builds the SQL fragments bisection queries are made of.
///
/// Without a known backend the generic flavour sticks to functions shared by
/// most engines (`LENGTH`, `SUBSTR`, `ASCII`, `COALESCE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dialect {
    backend: Option<Backend>,
}

impl Dialect {
    pub fn new(backend: Option<Backend>) -> Self {
        Self { backend }
    }

    pub fn mysql() -> Self {
        Self::new(Some(Backend::Mysql))
    }

    pub fn backend(&self) -> Option<Backend> {
        self.backend
    }

    /// Length in characters, the unit `char_ordinal` positions count in.
    /// MySQL `LENGTH` counts bytes and MSSQL `LEN` drops trailing spaces.
    pub fn length(&self, expression: &str) -> String {
        match self.backend {
            Some(Backend::Mysql) => format!("CHAR_LENGTH(({}))", expression),
            Some(Backend::Mssql) => format!("(LEN(({})+'.')-1)", expression),
            _ => format!("LENGTH(({}))", expression),
        }
    }

    /// Longest identifier (database, table, column name) the engine allows.
    pub fn identifier_max_length(&self) -> Option<usize> {
        match self.backend {
            Some(Backend::Mysql) => Some(64),
            Some(Backend::Postgresql) => Some(63),
            Some(Backend::Mssql) | Some(Backend::Oracle) => Some(128),
            None => None,
        }
    }

    /// Ordinal of the character at 1-based `position`.
    pub fn char_ordinal(&self, expression: &str, position: usize) -> String {
        match self.backend {
            Some(Backend::Mysql) => format!("ORD(MID(({}),{},1))", expression, position),
            Some(Backend::Postgresql) => {
                format!("ASCII(SUBSTRING(({})::text FROM {} FOR 1))", expression, position)
            }
            Some(Backend::Mssql) => format!("UNICODE(SUBSTRING(({}),{},1))", expression, position),
            Some(Backend::Oracle) => format!("ASCII(SUBSTRC(({}),{},1))", expression, position),
            None => format!("ASCII(SUBSTR(({}),{},1))", expression, position),
        }
    }

    /// Cast to text, mapping NULL to a single space so length is never NULL.
    pub fn as_text(&self, expression: &str) -> String {
        match self.backend {
            Some(Backend::Mysql) => format!("IFNULL(CAST({} AS NCHAR),0x20)", expression),
            Some(Backend::Postgresql) => format!("COALESCE(CAST({} AS VARCHAR(10000))::text,' ')", expression),
            Some(Backend::Mssql) => format!("ISNULL(CAST({} AS NVARCHAR(4000)),' ')", expression),
            Some(Backend::Oracle) => format!("NVL(CAST({} AS NVARCHAR2(4000)),' ')", expression),
            None => format!("COALESCE(CAST({} AS VARCHAR(4000)),' ')", expression),
        }
    }
}

/// Quote a value as a SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
