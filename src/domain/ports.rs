//! The `Dialect` port — the one seam every SQL engine-specific
//! implementation sits behind. Everything above this trait (DataModel,
//! SqlParams, Api) is engine-agnostic; everything below it
//! (`infrastructure::db::dialect`) knows about Postgres/MySQL/SQLite/MSSQL
//! quoting and wire types.

use async_trait::async_trait;

use crate::domain::error::OinoError;
use crate::domain::field::{Cell, Field};

/// Per-exposed-table policy knobs. One instance per `Api`.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub table_name: String,
    pub api_name: String,
    pub fail_on_oversized_values: bool,
    pub fail_on_update_on_autoinc: bool,
    pub fail_on_insert_without_key: bool,
    pub use_dates_as_string: bool,
    pub hashid_key: Option<String>,
    pub hashid_length: usize,
    pub hashid_static_ids: bool,
    pub cache_modified_field: Option<String>,
    pub excluded_fields: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            table_name: String::new(),
            api_name: String::new(),
            fail_on_oversized_values: false,
            fail_on_update_on_autoinc: false,
            fail_on_insert_without_key: false,
            use_dates_as_string: false,
            hashid_key: None,
            hashid_length: 12,
            hashid_static_ids: true,
            cache_modified_field: None,
            excluded_fields: Vec::new(),
        }
    }
}

/// One native row of query results, as returned by the engine driver before
/// it is mapped into `Cell`s by `Dialect::parse_result_cell`.
pub type RawRow = Vec<Option<String>>;

/// A single raw column descriptor discovered by `introspect_table`, before
/// it is turned into a `Field`.
#[derive(Debug, Clone)]
pub struct IntrospectedColumn {
    pub name: String,
    pub sql_type: String,
    pub max_length: usize,
    pub primary_key: bool,
    pub foreign_key: bool,
    pub not_null: bool,
    pub auto_inc: bool,
}

/// A fully assembled SELECT's structural pieces, handed to
/// `assemble_select` so each engine can place `TOP`/`LIMIT`/`OFFSET FETCH`
/// in its own syntax.
#[derive(Debug, Clone, Default)]
pub struct SelectParts {
    pub table: String,
    pub columns: String,
    pub where_clause: Option<String>,
    pub group_by: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// The capability interface every SQL engine implements. Connection state
/// (`connected`/`validated`) is owned by the implementor; `query`/`execute`
/// MUST fail with a backend error if called before `validate` has
/// succeeded.
#[async_trait]
pub trait Dialect: Send + Sync {
    fn engine_tag(&self) -> &str;

    async fn connect(&self) -> Result<(), OinoError>;
    async fn validate(&self) -> Result<(), OinoError>;
    async fn disconnect(&self) -> Result<(), OinoError>;

    fn is_connected(&self) -> bool;
    fn is_validated(&self) -> bool;

    async fn query(&self, sql: &str) -> Result<Vec<RawRow>, OinoError>;
    async fn execute(&self, sql: &str) -> Result<u64, OinoError>;

    async fn introspect_table(&self, table_name: &str) -> Result<Vec<IntrospectedColumn>, OinoError>;

    /// Map an engine-native SQL type tag (as returned in
    /// `IntrospectedColumn::sql_type`) onto the gateway's logical
    /// `FieldKind`, the step `DataModel` construction needs before it can
    /// build a `Field` out of an `IntrospectedColumn`.
    fn map_field_kind(&self, sql_type: &str) -> crate::domain::field::FieldKind;

    fn print_identifier(&self, name: &str) -> String;
    fn print_string(&self, text: &str) -> String;
    fn print_literal(&self, cell: &Cell, field: &Field) -> Result<String, OinoError>;
    fn parse_result_cell(&self, raw: Option<&str>, field: &Field) -> Result<Cell, OinoError>;

    fn assemble_select(&self, parts: &SelectParts) -> String;
}
