use std::sync::LazyLock;

use regex::Regex;

use crate::dialect::Backend;

/// Error text fragments that betray the backend engine.
static ERROR_FINGERPRINTS: LazyLock<Vec<(Backend, Regex)>> = LazyLock::new(|| {
    let table: [(Backend, &[&str]); 4] = [
        (Backend::Mysql, &[
            r"SQL syntax.*?MySQL",
            r"Warning.*?\Wmysqli?_",
            r"MySQLSyntaxErrorException",
            r"valid MySQL result",
            r"check the manual that (corresponds|fits) to your (MySQL|MariaDB) server version",
            r"Unknown column '[^ ]+' in 'field list'",
            r"com\.mysql\.jdbc",
        ]),
        (Backend::Postgresql, &[
            r"PostgreSQL.*?ERROR",
            r"Warning.*?\Wpg_",
            r"valid PostgreSQL result",
            r"Npgsql\.",
            r"PG::SyntaxError:",
            r"org\.postgresql\.util\.PSQLException",
            r"ERROR:\s+syntax error at or near",
            r"unterminated quoted string at or near",
        ]),
        (Backend::Mssql, &[
            r"Driver.*? SQL[\-_ ]*Server",
            r"OLE DB.*? SQL Server",
            r"\bSQL Server[^<\x22]+Driver",
            r"Warning.*?\W(mssql|sqlsrv)_",
            r"System\.Data\.SqlClient\.",
            r"Unclosed quotation mark after the character string",
            r"Microsoft SQL Native Client error '[0-9a-fA-F]{8}",
        ]),
        (Backend::Oracle, &[
            r"\bORA-\d{5}",
            r"Oracle error",
            r"Oracle.*?Driver",
            r"Warning.*?\W(oci|ora)_",
            r"quoted string not properly terminated",
            r"SQL command not properly ended",
        ]),
    ];
    table
        .iter()
        .flat_map(|(backend, patterns)| {
            patterns
                .iter()
                .map(move |p| (*backend, Regex::new(&format!("(?i){}", p)).expect("static regex")))
        })
        .collect()
});

/// First backend whose error fingerprint appears in `body`.
pub fn detect_backend(body: &str) -> Option<Backend> {
    ERROR_FINGERPRINTS
        .iter()
        .find(|(_, re)| re.is_match(body))
        .map(|(backend, _)| *backend)
}
