//! Well-known metadata expressions used by the high-level extraction API.
//!
//! Every expression evaluates to a single scalar: either a text value (already
//! cast and NULL-safe) or, for the `*_count` family, an integer.

use super::{quote_literal, Backend, Dialect};
use crate::models::Charset;

impl Dialect {
    pub fn banner(&self) -> String {
        let raw = match self.backend {
            Some(Backend::Mssql) => "@@VERSION",
            Some(Backend::Oracle) => "(SELECT banner FROM v$version WHERE ROWNUM=1)",
            _ => "VERSION()",
        };
        self.as_text(raw)
    }

    pub fn current_user(&self) -> String {
        let raw = match self.backend {
            Some(Backend::Mysql) => "CURRENT_USER()",
            Some(Backend::Mssql) => "SYSTEM_USER",
            Some(Backend::Oracle) => "USER",
            _ => "CURRENT_USER",
        };
        self.as_text(raw)
    }

    pub fn current_db(&self) -> String {
        let raw = match self.backend {
            Some(Backend::Mysql) => "DATABASE()",
            Some(Backend::Mssql) => "DB_NAME()",
            Some(Backend::Oracle) => "(SELECT SYS.DATABASE_NAME FROM DUAL)",
            _ => "CURRENT_SCHEMA()",
        };
        self.as_text(raw)
    }

    pub fn hostname(&self) -> String {
        let raw = match self.backend {
            Some(Backend::Mysql) => "@@HOSTNAME",
            Some(Backend::Postgresql) => "INET_SERVER_ADDR()",
            Some(Backend::Mssql) => "@@SERVERNAME",
            Some(Backend::Oracle) => "(SELECT UTL_INADDR.GET_HOST_NAME FROM DUAL)",
            None => "@@HOSTNAME",
        };
        self.as_text(raw)
    }

    /// PostgreSQL reports the server address, so its characters are known.
    pub fn hostname_charset(&self) -> Charset {
        match self.backend {
            Some(Backend::Postgresql) => Charset::Custom("./0123456789:abcdef".into()),
            _ => Charset::Printable,
        }
    }

    pub fn dbs_count(&self) -> String {
        match self.backend {
            Some(Backend::Postgresql) => "(SELECT COUNT(DISTINCT(schemaname)) FROM pg_tables)".into(),
            Some(Backend::Mssql) => "(SELECT COUNT(name) FROM master..sysdatabases)".into(),
            Some(Backend::Oracle) => "(SELECT COUNT(DISTINCT(OWNER)) FROM SYS.ALL_TABLES)".into(),
            _ => "(SELECT COUNT(*) FROM INFORMATION_SCHEMA.SCHEMATA)".into(),
        }
    }

    pub fn db_at(&self, index: usize) -> String {
        match self.backend {
            Some(Backend::Mysql) => format!(
                "(SELECT {} FROM INFORMATION_SCHEMA.SCHEMATA LIMIT {},1)",
                self.as_text("schema_name"), index
            ),
            Some(Backend::Postgresql) => format!(
                "(SELECT DISTINCT(schemaname) FROM pg_tables ORDER BY schemaname OFFSET {} LIMIT 1)",
                index
            ),
            Some(Backend::Mssql) => self.mssql_nth("name", "master..sysdatabases", None, index),
            Some(Backend::Oracle) => self.oracle_nth(
                "OWNER",
                "(SELECT DISTINCT(OWNER) FROM SYS.ALL_TABLES)",
                index,
            ),
            None => format!(
                "(SELECT {} FROM INFORMATION_SCHEMA.SCHEMATA LIMIT 1 OFFSET {})",
                self.as_text("schema_name"), index
            ),
        }
    }

    pub fn tables_count(&self, db: &str) -> String {
        let db = quote_literal(db);
        match self.backend {
            Some(Backend::Postgresql) => format!("(SELECT COUNT(*) FROM pg_tables WHERE schemaname={})", db),
            Some(Backend::Mssql) => format!(
                "(SELECT COUNT(name) FROM {}..sysobjects WHERE xtype='U')",
                unquote(&db)
            ),
            Some(Backend::Oracle) => format!(
                "(SELECT COUNT(TABLE_NAME) FROM SYS.ALL_TABLES WHERE OWNER={})",
                db.to_uppercase()
            ),
            _ => format!("(SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE table_schema={})", db),
        }
    }

    pub fn table_at(&self, db: &str, index: usize) -> String {
        let literal = quote_literal(db);
        match self.backend {
            Some(Backend::Mysql) => format!(
                "(SELECT {} FROM INFORMATION_SCHEMA.TABLES WHERE table_schema={} LIMIT {},1)",
                self.as_text("table_name"), literal, index
            ),
            Some(Backend::Postgresql) => format!(
                "(SELECT tablename FROM pg_tables WHERE schemaname={} ORDER BY tablename OFFSET {} LIMIT 1)",
                literal, index
            ),
            Some(Backend::Mssql) => self.mssql_nth(
                "name",
                &format!("{}..sysobjects", db),
                Some("xtype='U'"),
                index,
            ),
            Some(Backend::Oracle) => self.oracle_nth(
                "TABLE_NAME",
                &format!("(SELECT TABLE_NAME FROM SYS.ALL_TABLES WHERE OWNER={})", literal.to_uppercase()),
                index,
            ),
            None => format!(
                "(SELECT {} FROM INFORMATION_SCHEMA.TABLES WHERE table_schema={} LIMIT 1 OFFSET {})",
                self.as_text("table_name"), literal, index
            ),
        }
    }

    pub fn columns_count(&self, db: &str, table: &str) -> String {
        let (db_lit, table_lit) = (quote_literal(db), quote_literal(table));
        match self.backend {
            Some(Backend::Mssql) => format!(
                "(SELECT COUNT(name) FROM {}..syscolumns WHERE id=(SELECT id FROM {}..sysobjects WHERE name={}))",
                db, db, table_lit
            ),
            Some(Backend::Oracle) => format!(
                "(SELECT COUNT(COLUMN_NAME) FROM SYS.ALL_TAB_COLUMNS WHERE TABLE_NAME={} AND OWNER={})",
                table_lit.to_uppercase(), db_lit.to_uppercase()
            ),
            _ => format!(
                "(SELECT COUNT(*) FROM INFORMATION_SCHEMA.COLUMNS WHERE table_schema={} AND table_name={})",
                db_lit, table_lit
            ),
        }
    }

    pub fn column_at(&self, db: &str, table: &str, index: usize) -> String {
        let (db_lit, table_lit) = (quote_literal(db), quote_literal(table));
        match self.backend {
            Some(Backend::Mysql) => format!(
                "(SELECT {} FROM INFORMATION_SCHEMA.COLUMNS WHERE table_schema={} AND table_name={} LIMIT {},1)",
                self.as_text("column_name"), db_lit, table_lit, index
            ),
            Some(Backend::Mssql) => self.mssql_nth(
                "name",
                &format!("{}..syscolumns", db),
                Some(&format!("id=(SELECT id FROM {}..sysobjects WHERE name={})", db, table_lit)),
                index,
            ),
            Some(Backend::Oracle) => self.oracle_nth(
                "COLUMN_NAME",
                &format!(
                    "(SELECT COLUMN_NAME FROM SYS.ALL_TAB_COLUMNS WHERE TABLE_NAME={} AND OWNER={})",
                    table_lit.to_uppercase(), db_lit.to_uppercase()
                ),
                index,
            ),
            _ => format!(
                "(SELECT {} FROM INFORMATION_SCHEMA.COLUMNS WHERE table_schema={} AND table_name={} LIMIT 1 OFFSET {})",
                self.as_text("column_name"), db_lit, table_lit, index
            ),
        }
    }

    pub fn records_count(&self, db: &str, table: &str) -> String {
        match self.backend {
            Some(Backend::Mssql) => format!("(SELECT COUNT(*) FROM {}..{})", db, table),
            _ => format!("(SELECT COUNT(*) FROM {}.{})", db, table),
        }
    }

    pub fn record_at(&self, db: &str, table: &str, column: &str, index: usize) -> String {
        match self.backend {
            Some(Backend::Mysql) => format!(
                "(SELECT {} FROM {}.{} LIMIT {},1)",
                self.as_text(column), db, table, index
            ),
            Some(Backend::Mssql) => format!(
                "(SELECT v FROM (SELECT ROW_NUMBER() OVER (ORDER BY (SELECT 1)) AS rn,{} AS v FROM {}..{}) x WHERE rn={})",
                self.as_text(column), db, table, index + 1
            ),
            Some(Backend::Oracle) => format!(
                "(SELECT v FROM (SELECT ROWNUM AS rn,{} AS v FROM {}.{}) WHERE rn={})",
                self.as_text(column), db, table, index + 1
            ),
            _ => format!(
                "(SELECT {} FROM {}.{} LIMIT 1 OFFSET {})",
                self.as_text(column), db, table, index
            ),
        }
    }

    fn mssql_nth(&self, column: &str, source: &str, filter: Option<&str>, index: usize) -> String {
        let filter = filter.map(|f| format!(" AND {}", f)).unwrap_or_default();
        format!(
            "(SELECT TOP 1 {col} FROM {src} WHERE {col} NOT IN (SELECT TOP {n} {col} FROM {src} WHERE 1=1{f} ORDER BY {col}){f} ORDER BY {col})",
            col = column, src = source, n = index, f = filter
        )
    }

    fn oracle_nth(&self, column: &str, source: &str, index: usize) -> String {
        format!(
            "(SELECT {col} FROM (SELECT {col},ROWNUM AS rn FROM {src}) WHERE rn={n})",
            col = column, src = source, n = index + 1
        )
    }
}

fn unquote(literal: &str) -> &str {
    literal.trim_matches('\'')
}
