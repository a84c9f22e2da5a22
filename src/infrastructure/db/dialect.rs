//! Concrete `Dialect` implementations. Three of the four engines
//! (SQLite, PostgreSQL, MariaDB/MySQL) share one `sqlx::AnyPool`-backed
//! type parameterized by `Engine`; SQL Server has no driver in this
//! stack, so `SqlServerDialect` implements the pure SQL-generation half
//! of the trait and fails connect/query/execute with a structured error.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::{AnyPool, Row as SqlxRow};
use tokio::sync::RwLock;

use crate::domain::error::OinoError;
use crate::domain::field::{Cell, Field, FieldKind};
use crate::domain::ports::{Dialect, IntrospectedColumn, RawRow, SelectParts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Sqlite,
    Postgres,
    Mysql,
    Mariadb,
}

impl Engine {
    fn tag(&self) -> &'static str {
        match self {
            Engine::Sqlite => "sqlite",
            Engine::Postgres => "postgres",
            Engine::Mysql => "mysql",
            Engine::Mariadb => "mariadb",
        }
    }

    fn quote_identifier(&self, name: &str) -> String {
        match self {
            Engine::Sqlite => format!("[{name}]"),
            Engine::Postgres => format!("\"{}\"", name.to_ascii_lowercase()),
            Engine::Mysql | Engine::Mariadb => format!("`{name}`"),
        }
    }

    fn map_sql_type(&self, sql_type: &str, numeric_precision: Option<(u32, u32)>) -> (FieldKind, usize) {
        let lower = sql_type.to_ascii_lowercase();
        if let Some((p, s)) = numeric_precision {
            if lower.contains("decimal") || lower.contains("numeric") {
                return (FieldKind::String, (p + s + 1) as usize);
            }
        }
        match lower.as_str() {
            "integer" | "int" | "int4" | "int8" | "bigint" | "smallint" | "tinyint" | "serial" | "bigserial" | "real" | "double" | "double precision" | "float" | "numeric" | "decimal" => {
                (FieldKind::Number, 0)
            }
            "boolean" | "bool" | "bit" => (FieldKind::Boolean, 0),
            "blob" | "bytea" | "varbinary" | "binary" | "longblob" => (FieldKind::Blob, 0),
            "date" | "datetime" | "datetime2" | "timestamp" | "timestamptz" | "timestamp with time zone" => (FieldKind::Datetime, 0),
            "text" | "varchar" | "nvarchar" | "char" | "character varying" | "clob" => (FieldKind::String, 0),
            _ => (FieldKind::String, 0),
        }
    }
}

pub struct AnySqlDialect {
    engine: Engine,
    url: String,
    pool: RwLock<Option<AnyPool>>,
    connected: AtomicBool,
    validated: AtomicBool,
}

impl AnySqlDialect {
    pub fn new(engine: Engine, url: impl Into<String>) -> Self {
        AnySqlDialect { engine, url: url.into(), pool: RwLock::new(None), connected: AtomicBool::new(false), validated: AtomicBool::new(false) }
    }

    pub fn sqlite(url: impl Into<String>) -> Self {
        Self::new(Engine::Sqlite, url)
    }

    pub fn postgres(url: impl Into<String>) -> Self {
        Self::new(Engine::Postgres, url)
    }

    pub fn mysql(url: impl Into<String>) -> Self {
        Self::new(Engine::Mysql, url)
    }

    pub fn mariadb(url: impl Into<String>) -> Self {
        Self::new(Engine::Mariadb, url)
    }

    async fn require_pool(&self) -> Result<AnyPool, OinoError> {
        if !self.validated.load(Ordering::SeqCst) {
            return Err(OinoError::backend("dialect not validated"));
        }
        self.pool.read().await.clone().ok_or_else(|| OinoError::backend("dialect not connected"))
    }
}

#[async_trait]
impl Dialect for AnySqlDialect {
    fn engine_tag(&self) -> &str {
        self.engine.tag()
    }

    async fn connect(&self) -> Result<(), OinoError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        let options: AnyConnectOptions = self.url.parse().map_err(|e| OinoError::backend(format!("invalid connection url: {e}")))?;
        let pool = AnyPoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| OinoError::backend(format!("connect failed: {e}")))?;
        *self.pool.write().await = Some(pool);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn validate(&self) -> Result<(), OinoError> {
        let pool = self.pool.read().await.clone().ok_or_else(|| OinoError::backend("not connected"))?;
        let count: (i64,) = match self.engine {
            Engine::Sqlite => sqlx::query_as("SELECT count(*) FROM sqlite_master WHERE type='table'"),
            Engine::Postgres => sqlx::query_as("SELECT count(*) FROM information_schema.columns"),
            Engine::Mysql | Engine::Mariadb => sqlx::query_as("SELECT count(*) FROM information_schema.columns"),
        }
        .fetch_one(&pool)
        .await
        .map_err(|e| OinoError::backend(format!("validation query failed: {e}")))?;

        if count.0 > 0 {
            self.validated.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(OinoError::backend("validation query returned no rows"))
        }
    }

    async fn disconnect(&self) -> Result<(), OinoError> {
        *self.pool.write().await = None;
        self.connected.store(false, Ordering::SeqCst);
        self.validated.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_validated(&self) -> bool {
        self.validated.load(Ordering::SeqCst)
    }

    #[tracing::instrument(skip(self), fields(engine = self.engine.tag()))]
    async fn query(&self, sql: &str) -> Result<Vec<RawRow>, OinoError> {
        tracing::debug!(sql, "executing query");
        let pool = self.require_pool().await?;
        let rows = sqlx::query(sql).fetch_all(&pool).await.map_err(|e| OinoError::backend(format!("query failed: {e}")))?;
        Ok(rows
            .iter()
            .map(|row| (0..row.columns().len()).map(|i| row.try_get::<Option<String>, _>(i).unwrap_or(None)).collect())
            .collect())
    }

    #[tracing::instrument(skip(self), fields(engine = self.engine.tag()))]
    async fn execute(&self, sql: &str) -> Result<u64, OinoError> {
        tracing::debug!(sql, "executing statement");
        let pool = self.require_pool().await?;
        let result = sqlx::query(sql).execute(&pool).await.map_err(|e| OinoError::backend(format!("execute failed: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn introspect_table(&self, table_name: &str) -> Result<Vec<IntrospectedColumn>, OinoError> {
        let pool = self.require_pool().await?;
        match self.engine {
            Engine::Sqlite => introspect_sqlite(&pool, table_name).await,
            Engine::Postgres => introspect_information_schema(&pool, table_name, "public").await,
            Engine::Mysql | Engine::Mariadb => introspect_information_schema(&pool, table_name, "").await,
        }
        .map(|cols| {
            cols.into_iter()
                .map(|mut c| {
                    let (_, derived_len) = self.engine.map_sql_type(&c.sql_type, None);
                    if c.max_length == 0 {
                        c.max_length = derived_len;
                    }
                    c
                })
                .collect()
        })
    }

    fn map_field_kind(&self, sql_type: &str) -> FieldKind {
        self.engine.map_sql_type(sql_type, None).0
    }

    fn print_identifier(&self, name: &str) -> String {
        self.engine.quote_identifier(name)
    }

    fn print_string(&self, text: &str) -> String {
        format!("'{}'", text.replace('\'', "''"))
    }

    fn print_literal(&self, cell: &Cell, _field: &Field) -> Result<String, OinoError> {
        match cell {
            Cell::Absent => Err(OinoError::backend("absent cell reached printLiteral — row assembler must filter absent cells first")),
            Cell::Null => Ok("NULL".to_string()),
            Cell::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            Cell::Number(n) => Ok(n.clone()),
            Cell::Text(s) => Ok(self.print_string(s)),
            Cell::Blob(bytes) => Ok(match self.engine {
                Engine::Sqlite | Engine::Mariadb | Engine::Mysql => format!("X'{}'", hex_encode(bytes)),
                Engine::Postgres => format!("'\\x{}'", hex_encode(bytes)),
            }),
            Cell::DateTime(dt) => Ok(self.print_string(&dt.to_rfc3339())),
        }
    }

    fn parse_result_cell(&self, raw: Option<&str>, field: &Field) -> Result<Cell, OinoError> {
        let Some(raw) = raw else { return Ok(Cell::Null) };
        match field.kind() {
            FieldKind::Boolean => Ok(Cell::Bool(raw == "1" || raw.eq_ignore_ascii_case("true"))),
            FieldKind::Number => Ok(Cell::Number(raw.to_string())),
            FieldKind::String => Ok(Cell::Text(raw.to_string())),
            FieldKind::Blob => Ok(Cell::Blob(raw.as_bytes().to_vec())),
            FieldKind::Datetime => chrono::DateTime::parse_from_rfc3339(raw)
                .map(|dt| Cell::DateTime(dt.with_timezone(&chrono::Utc)))
                .map_err(|e| OinoError::backend(format!("could not parse datetime column: {e}"))),
        }
    }

    fn assemble_select(&self, parts: &SelectParts) -> String {
        let mut sql = format!("SELECT {} FROM {}", parts.columns, parts.table);
        if let Some(w) = &parts.where_clause {
            sql.push_str(&format!(" WHERE {w}"));
        }
        if let Some(g) = &parts.group_by {
            sql.push_str(&format!(" GROUP BY {g}"));
        }
        if let Some(o) = &parts.order_by {
            sql.push_str(&format!(" ORDER BY {o}"));
        }
        if let Some(limit) = parts.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = parts.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }
        sql
    }
}

async fn introspect_sqlite(pool: &AnyPool, table_name: &str) -> Result<Vec<IntrospectedColumn>, OinoError> {
    let sql = format!("PRAGMA table_info({table_name})");
    let rows = sqlx::query(&sql).fetch_all(pool).await.map_err(|e| OinoError::backend(format!("introspection failed: {e}")))?;
    Ok(rows
        .iter()
        .map(|row| {
            let name: String = row.try_get("name").unwrap_or_default();
            let sql_type: String = row.try_get("type").unwrap_or_default();
            let not_null: i64 = row.try_get("notnull").unwrap_or(0);
            let pk: i64 = row.try_get("pk").unwrap_or(0);
            IntrospectedColumn { name, sql_type, max_length: 0, primary_key: pk > 0, foreign_key: false, not_null: not_null != 0, auto_inc: pk > 0 }
        })
        .collect())
}

async fn introspect_information_schema(pool: &AnyPool, table_name: &str, _schema: &str) -> Result<Vec<IntrospectedColumn>, OinoError> {
    let sql = format!(
        "SELECT column_name, data_type, is_nullable, character_maximum_length FROM information_schema.columns WHERE table_name = '{table_name}' ORDER BY ordinal_position"
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await.map_err(|e| OinoError::backend(format!("introspection failed: {e}")))?;
    Ok(rows
        .iter()
        .map(|row| {
            let name: String = row.try_get("column_name").unwrap_or_default();
            let sql_type: String = row.try_get("data_type").unwrap_or_default();
            let is_nullable: String = row.try_get("is_nullable").unwrap_or_else(|_| "YES".to_string());
            let max_length: Option<i64> = row.try_get("character_maximum_length").ok();
            IntrospectedColumn {
                name,
                sql_type,
                max_length: max_length.unwrap_or(0).max(0) as usize,
                primary_key: false,
                foreign_key: false,
                not_null: is_nullable == "NO",
                auto_inc: false,
            }
        })
        .collect())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// SQL Server's `Dialect`: identifier quoting, literal formatting, type
/// mapping, and `TOP`/`OFFSET..FETCH` assembly are fully implemented and
/// tested; live connectivity is out of scope for this driver stack (see
/// `DESIGN.md`).
pub struct SqlServerDialect {
    url: String,
}

impl SqlServerDialect {
    pub fn new(url: impl Into<String>) -> Self {
        SqlServerDialect { url: url.into() }
    }

    fn map_sql_type(sql_type: &str) -> FieldKind {
        match sql_type.to_ascii_lowercase().as_str() {
            "int" | "bigint" | "smallint" | "tinyint" | "float" | "real" | "decimal" | "numeric" | "money" => FieldKind::Number,
            "bit" => FieldKind::Boolean,
            "varbinary" | "binary" | "image" => FieldKind::Blob,
            "date" | "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" => FieldKind::Datetime,
            _ => FieldKind::String,
        }
    }
}

#[async_trait]
impl Dialect for SqlServerDialect {
    fn engine_tag(&self) -> &str {
        "sqlserver"
    }

    async fn connect(&self) -> Result<(), OinoError> {
        let _ = &self.url;
        Err(OinoError::backend("SQL Server connectivity is out of scope for this driver stack"))
    }

    async fn validate(&self) -> Result<(), OinoError> {
        Err(OinoError::backend("SQL Server connectivity is out of scope for this driver stack"))
    }

    async fn disconnect(&self) -> Result<(), OinoError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn is_validated(&self) -> bool {
        false
    }

    async fn query(&self, _sql: &str) -> Result<Vec<RawRow>, OinoError> {
        Err(OinoError::backend("SQL Server connectivity is out of scope for this driver stack"))
    }

    async fn execute(&self, _sql: &str) -> Result<u64, OinoError> {
        Err(OinoError::backend("SQL Server connectivity is out of scope for this driver stack"))
    }

    async fn introspect_table(&self, _table_name: &str) -> Result<Vec<IntrospectedColumn>, OinoError> {
        Err(OinoError::backend("SQL Server connectivity is out of scope for this driver stack"))
    }

    fn map_field_kind(&self, sql_type: &str) -> FieldKind {
        Self::map_sql_type(sql_type)
    }

    fn print_identifier(&self, name: &str) -> String {
        format!("[{name}]")
    }

    fn print_string(&self, text: &str) -> String {
        format!("'{}'", text.replace('\'', "''"))
    }

    fn print_literal(&self, cell: &Cell, field: &Field) -> Result<String, OinoError> {
        let _ = field;
        match cell {
            Cell::Absent => Err(OinoError::backend("absent cell reached printLiteral — row assembler must filter absent cells first")),
            Cell::Null => Ok("NULL".to_string()),
            Cell::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            Cell::Number(n) => Ok(n.clone()),
            Cell::Text(s) => Ok(self.print_string(s)),
            Cell::Blob(bytes) => Ok(format!("0x{}", hex_encode(bytes))),
            Cell::DateTime(dt) => Ok(self.print_string(&dt.to_rfc3339())),
        }
    }

    fn parse_result_cell(&self, raw: Option<&str>, field: &Field) -> Result<Cell, OinoError> {
        let Some(raw) = raw else { return Ok(Cell::Null) };
        match field.kind() {
            FieldKind::Boolean => Ok(Cell::Bool(raw == "1")),
            FieldKind::Number => Ok(Cell::Number(raw.to_string())),
            FieldKind::String => Ok(Cell::Text(raw.to_string())),
            FieldKind::Blob => Ok(Cell::Blob(raw.as_bytes().to_vec())),
            FieldKind::Datetime => chrono::DateTime::parse_from_rfc3339(raw)
                .map(|dt| Cell::DateTime(dt.with_timezone(&chrono::Utc)))
                .map_err(|e| OinoError::backend(format!("could not parse datetime column: {e}"))),
        }
    }

    fn assemble_select(&self, parts: &SelectParts) -> String {
        let mut sql = String::from("SELECT ");
        if let (Some(limit), None) = (parts.limit, parts.offset) {
            sql.push_str(&format!("TOP {limit} "));
        }
        sql.push_str(&parts.columns);
        sql.push_str(&format!(" FROM {}", parts.table));
        if let Some(w) = &parts.where_clause {
            sql.push_str(&format!(" WHERE {w}"));
        }
        if let Some(g) = &parts.group_by {
            sql.push_str(&format!(" GROUP BY {g}"));
        }
        if let Some(o) = &parts.order_by {
            sql.push_str(&format!(" ORDER BY {o}"));
        }
        if let (Some(limit), Some(offset)) = (parts.limit, parts.offset) {
            if parts.order_by.is_none() {
                sql.push_str(" ORDER BY (SELECT NULL)");
            }
            sql.push_str(&format!(" OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY"));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field::FieldFlags;

    #[test]
    fn sqlite_quotes_with_brackets() {
        let d = AnySqlDialect::sqlite("sqlite::memory:");
        assert_eq!(d.print_identifier("name"), "[name]");
    }

    #[test]
    fn postgres_quotes_and_lowercases() {
        let d = AnySqlDialect::postgres("postgres://localhost/db");
        assert_eq!(d.print_identifier("Name"), "\"name\"");
    }

    #[test]
    fn mariadb_uses_backticks() {
        let d = AnySqlDialect::mariadb("mysql://localhost/db");
        assert_eq!(d.print_identifier("name"), "`name`");
    }

    #[test]
    fn null_literal_is_unquoted_keyword() {
        let d = AnySqlDialect::sqlite("sqlite::memory:");
        let field = Field::new("x", FieldKind::String, "text", 0, FieldFlags::default());
        assert_eq!(d.print_literal(&Cell::Null, &field).unwrap(), "NULL");
    }

    #[test]
    fn string_literal_escapes_quotes() {
        let d = AnySqlDialect::sqlite("sqlite::memory:");
        let field = Field::new("x", FieldKind::String, "text", 0, FieldFlags::default());
        assert_eq!(d.print_literal(&Cell::Text("o'brien".to_string()), &field).unwrap(), "'o''brien'");
    }

    #[test]
    fn absent_cell_is_a_programmer_error() {
        let d = AnySqlDialect::sqlite("sqlite::memory:");
        let field = Field::new("x", FieldKind::String, "text", 0, FieldFlags::default());
        assert!(d.print_literal(&Cell::Absent, &field).is_err());
    }

    #[test]
    fn sqlserver_uses_top_when_no_offset() {
        let d = SqlServerDialect::new("unused");
        let parts = SelectParts { table: "[t]".to_string(), columns: "[a]".to_string(), limit: Some(10), ..Default::default() };
        assert!(d.assemble_select(&parts).starts_with("SELECT TOP 10 "));
    }

    #[test]
    fn sqlserver_uses_offset_fetch_when_paging() {
        let d = SqlServerDialect::new("unused");
        let parts = SelectParts { table: "[t]".to_string(), columns: "[a]".to_string(), limit: Some(10), offset: Some(21), ..Default::default() };
        let sql = d.assemble_select(&parts);
        assert!(sql.contains("OFFSET 21 ROWS FETCH NEXT 10 ROWS ONLY"));
    }

    #[tokio::test]
    async fn sqlserver_connect_fails_with_structured_error() {
        let d = SqlServerDialect::new("unused");
        let err = d.connect().await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
