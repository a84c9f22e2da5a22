//! Api — orchestrates one request end to end: parse body, validate rows
//! against the DataModel, build SQL, run it through the Dialect, wrap
//! results for serialization. The single entry point a host routing layer
//! calls into.

use std::sync::Arc;

use tracing::instrument;

use crate::application::api_result::ApiResult;
use crate::application::modelset::{InMemoryDataSet, ModelSet};
use crate::application::parser::{self, ParsedRows};
use crate::domain::datamodel::{DataModel, Row};
use crate::domain::error::{Message, OinoError};
use crate::domain::field::{Cell, Field, FieldFlags};
use crate::domain::hashid::Hashid;
use crate::domain::oino_id;
use crate::domain::ports::{ApiConfig, Dialect};
use crate::domain::sql_params::SqlParams;
use crate::infrastructure::codec::ContentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

pub struct Request<'a> {
    pub method: Method,
    /// Present for PUT/DELETE, absent for POST, optional for GET (a
    /// missing id means "collection").
    pub row_id: Option<&'a str>,
    pub body: &'a [u8],
    pub content_type: ContentType,
    pub response_type: ContentType,
    pub multipart_boundary: Option<&'a str>,
    pub query_params: std::collections::HashMap<String, String>,
}

/// Orchestrates one exposed table. Immutable after construction — built
/// once from a successful `Dialect::introspect_table` call and shared
/// freely across concurrent requests via `Arc`.
pub struct Api {
    dialect: Arc<dyn Dialect>,
    model: DataModel,
    config: ApiConfig,
}

impl Api {
    /// Connect, validate, introspect `config.table_name`, and build the
    /// `DataModel` the Api will use for every subsequent request.
    #[instrument(skip(dialect, config), fields(table = %config.table_name))]
    pub async fn new(dialect: Arc<dyn Dialect>, config: ApiConfig) -> Result<Self, OinoError> {
        dialect.connect().await?;
        dialect.validate().await?;

        let columns = dialect.introspect_table(&config.table_name).await?;
        let hashid = config
            .hashid_key
            .as_ref()
            .map(|key| Hashid::new(key, &config.table_name, config.hashid_length, crate::domain::hashid::HashidMode::from_static_flag(config.hashid_static_ids)))
            .transpose()?;

        let mut model = DataModel::new(oino_id::DEFAULT_FIELD_NAME, oino_id::DEFAULT_SEPARATOR, hashid);
        for column in columns {
            if config.excluded_fields.iter().any(|excluded| &column.name == excluded) {
                continue;
            }
            let kind = dialect.map_field_kind(&column.sql_type);
            let flags = FieldFlags {
                primary_key: column.primary_key,
                foreign_key: column.foreign_key,
                not_null: column.not_null,
                auto_inc: column.auto_inc,
            };
            model.add_field(Field::new(column.name, kind, column.sql_type, column.max_length, flags));
        }

        if model.primary_key_fields().is_empty() {
            tracing::warn!(table = %config.table_name, "introspected table has no primary key; updates and deletes will fail");
        }

        Ok(Api { dialect, model, config })
    }

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    #[instrument(skip(self, request), fields(table = %self.config.table_name, method = ?request.method))]
    pub async fn run(&self, request: Request<'_>) -> ApiResult<'_> {
        match self.dispatch(request).await {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!(error = %err, "request failed");
                ApiResult::from_error(&err)
            }
        }
    }

    async fn dispatch(&self, request: Request<'_>) -> Result<ApiResult<'_>, OinoError> {
        match request.method {
            Method::Get => self.run_get(request).await,
            Method::Post => self.run_post(request).await,
            Method::Put => self.run_put(request).await,
            Method::Delete => self.run_delete(request).await,
        }
    }

    async fn run_get(&self, request: Request<'_>) -> Result<ApiResult<'_>, OinoError> {
        let params = SqlParams::from_query_params(&request.query_params)?;
        let (sql, placeholder_mask) = self.model.print_sql_select(&self.config.table_name, request.row_id, &params, self.dialect.as_ref())?;
        let raw_rows = self.run_query(&sql).await?;
        let rows = self.map_raw_rows(&raw_rows, &placeholder_mask)?;
        let dataset = Box::new(InMemoryDataSet::new(rows));
        let model_set = ModelSet::new(&self.model, dataset);
        Ok(ApiResult::ok(Some(model_set), Vec::new()))
    }

    async fn run_post(&self, request: Request<'_>) -> Result<ApiResult<'_>, OinoError> {
        if request.row_id.is_some() {
            return Err(OinoError::request_shape("POST does not take a row id"));
        }
        let parsed = self.parse_body(&request)?;
        if parsed.rows.is_empty() {
            return Err(OinoError::request_shape("POST body did not contain any rows"));
        }

        let mut messages = parsed.messages;
        let mut statements = Vec::new();
        for row in &parsed.rows {
            match self.validate_for_insert(row) {
                Ok(()) => statements.push(self.model.print_sql_insert(row, self.dialect.as_ref())?),
                Err(err) => messages.push(Message::from(&err)),
            }
        }
        if statements.is_empty() {
            return Err(OinoError::validation("no row in the POST body passed validation"));
        }

        let table = self.dialect.print_identifier(&self.config.table_name);
        let sql = statements.iter().map(|values| format!("INSERT INTO {table} {values};")).collect::<Vec<_>>().join(" ");
        self.run_execute(&sql).await?;

        Ok(ApiResult::ok_with_status(200, "OK", messages))
    }

    async fn run_put(&self, request: Request<'_>) -> Result<ApiResult<'_>, OinoError> {
        let id = request.row_id.ok_or_else(|| OinoError::request_shape("PUT requires a row id"))?;
        let parsed = self.parse_body(&request)?;
        if parsed.rows.len() != 1 {
            return Err(OinoError::request_shape(format!("PUT requires exactly one row, got {}", parsed.rows.len())));
        }
        let row = &parsed.rows[0];
        self.validate_for_update(row)?;

        let set_where = self.model.print_sql_update(id, row, self.dialect.as_ref())?;
        let table = self.dialect.print_identifier(&self.config.table_name);
        let sql = format!("UPDATE {table} {set_where}");
        self.run_execute(&sql).await?;

        Ok(ApiResult::ok_with_status(200, "OK", parsed.messages))
    }

    async fn run_delete(&self, request: Request<'_>) -> Result<ApiResult<'_>, OinoError> {
        let id = request.row_id.ok_or_else(|| OinoError::request_shape("DELETE requires a row id"))?;
        let where_clause = self.model.print_sql_delete(id, self.dialect.as_ref())?;
        let table = self.dialect.print_identifier(&self.config.table_name);
        let sql = format!("DELETE FROM {table} {where_clause}");
        self.run_execute(&sql).await?;
        Ok(ApiResult::ok_with_status(200, "OK", Vec::new()))
    }

    /// Separate entry point for multi-row updates driven entirely by the
    /// request body (not part of RESTful GET/POST/PUT/DELETE semantics) —
    /// same validation pipeline as `run`, no id argument.
    #[instrument(skip(self, body))]
    pub async fn run_batch_update(&self, body: &[u8], content_type: ContentType, boundary: Option<&str>) -> ApiResult<'_> {
        match self.run_batch_update_inner(body, content_type, boundary).await {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!(error = %err, "batch update failed");
                ApiResult::from_error(&err)
            }
        }
    }

    async fn run_batch_update_inner(&self, body: &[u8], content_type: ContentType, boundary: Option<&str>) -> Result<ApiResult<'_>, OinoError> {
        let parsed = parser::parse(body, content_type, &self.model, boundary)?;
        if parsed.rows.is_empty() {
            return Err(OinoError::request_shape("batch update body did not contain any rows"));
        }

        let mut messages = parsed.messages;
        let mut statements = Vec::new();
        let table = self.dialect.print_identifier(&self.config.table_name);
        for row in &parsed.rows {
            let id = self.model.row_oinoid(row)?;
            match self.validate_for_update(row) {
                Ok(()) => {
                    let set_where = self.model.print_sql_update(&id, row, self.dialect.as_ref())?;
                    statements.push(format!("UPDATE {table} {set_where};"));
                }
                Err(err) => messages.push(Message::from(&err)),
            }
        }
        if statements.is_empty() {
            return Err(OinoError::validation("no row in the batch update passed validation"));
        }

        self.run_execute(&statements.join(" ")).await?;
        Ok(ApiResult::ok_with_status(200, "OK", messages))
    }

    fn parse_body(&self, request: &Request<'_>) -> Result<ParsedRows, OinoError> {
        parser::parse(request.body, request.content_type, &self.model, request.multipart_boundary)
    }

    fn validate_for_insert(&self, row: &Row) -> Result<(), OinoError> {
        for (idx, field) in self.model.fields().iter().enumerate() {
            let cell = &row[idx];
            if field.flags().primary_key && cell.is_absent() && !field.flags().auto_inc && self.config.fail_on_insert_without_key {
                return Err(OinoError::validation(format!("field '{}': primary key is required on insert", field.name())));
            }
            self.validate_cell(field, cell)?;
        }
        Ok(())
    }

    fn validate_for_update(&self, row: &Row) -> Result<(), OinoError> {
        for (idx, field) in self.model.fields().iter().enumerate() {
            let cell = &row[idx];
            if field.flags().auto_inc && !cell.is_absent() && self.config.fail_on_update_on_autoinc {
                return Err(OinoError::validation(format!("field '{}': writing to an autoincrement column is not allowed", field.name())));
            }
            self.validate_cell(field, cell)?;
        }
        Ok(())
    }

    fn validate_cell(&self, field: &Field, cell: &Cell) -> Result<(), OinoError> {
        if cell.is_null() && field.flags().not_null {
            return Err(OinoError::validation(format!("field '{}': null is not allowed", field.name())));
        }
        if field.max_length() > 0 {
            if let Some(text) = field.canonical_text(cell) {
                if text.len() > field.max_length() {
                    if self.config.fail_on_oversized_values {
                        return Err(OinoError::validation(format!("field '{}': value exceeds max length {}", field.name(), field.max_length())));
                    }
                    tracing::warn!(field = field.name(), "value exceeds max length {}", field.max_length());
                }
            }
        }
        Ok(())
    }

    /// `placeholder_mask` is aligned 1:1 with `self.model.fields()`; a
    /// masked position holds a constant placeholder the query emitted to
    /// keep row shape invariant under `oinosqlselect`/`oinosqlaggregate`
    /// narrowing, not the field's real value, so it is decoded as
    /// `Cell::Null` rather than through the field's normal type parse.
    fn map_raw_rows(&self, raw_rows: &[Vec<Option<String>>], placeholder_mask: &[bool]) -> Result<Vec<Row>, OinoError> {
        raw_rows
            .iter()
            .map(|raw| {
                raw.iter()
                    .zip(self.model.fields())
                    .zip(placeholder_mask)
                    .map(|((value, field), &is_placeholder)| {
                        if is_placeholder {
                            Ok(Cell::Null)
                        } else {
                            self.dialect.parse_result_cell(value.as_deref(), field)
                        }
                    })
                    .collect::<Result<Row, OinoError>>()
            })
            .collect()
    }

    async fn run_query(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>, OinoError> {
        self.dialect.query(sql).await.map_err(|err| {
            tracing::debug!(sql, error = %err, "query failed");
            err
        })
    }

    async fn run_execute(&self, sql: &str) -> Result<u64, OinoError> {
        self.dialect.execute(sql).await.map_err(|err| {
            tracing::debug!(sql, error = %err, "execute failed");
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field::FieldKind;
    use crate::domain::ports::{IntrospectedColumn, SelectParts};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeDialect {
        columns: Vec<IntrospectedColumn>,
        rows: Mutex<Vec<Vec<Option<String>>>>,
        last_sql: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Dialect for FakeDialect {
        fn engine_tag(&self) -> &str {
            "fake"
        }

        async fn connect(&self) -> Result<(), OinoError> {
            Ok(())
        }

        async fn validate(&self) -> Result<(), OinoError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), OinoError> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn is_validated(&self) -> bool {
            true
        }

        async fn query(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>, OinoError> {
            *self.last_sql.lock().unwrap() = Some(sql.to_string());
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn execute(&self, sql: &str) -> Result<u64, OinoError> {
            *self.last_sql.lock().unwrap() = Some(sql.to_string());
            Ok(1)
        }

        async fn introspect_table(&self, _table_name: &str) -> Result<Vec<IntrospectedColumn>, OinoError> {
            Ok(self.columns.clone())
        }

        fn map_field_kind(&self, sql_type: &str) -> FieldKind {
            match sql_type {
                "integer" => FieldKind::Number,
                _ => FieldKind::String,
            }
        }

        fn print_identifier(&self, name: &str) -> String {
            format!("\"{name}\"")
        }

        fn print_string(&self, text: &str) -> String {
            format!("'{}'", text.replace('\'', "''"))
        }

        fn print_literal(&self, cell: &Cell, _field: &Field) -> Result<String, OinoError> {
            match cell {
                Cell::Null => Ok("NULL".to_string()),
                Cell::Number(n) => Ok(n.clone()),
                Cell::Text(s) => Ok(self.print_string(s)),
                _ => Ok("NULL".to_string()),
            }
        }

        fn parse_result_cell(&self, raw: Option<&str>, field: &Field) -> Result<Cell, OinoError> {
            let Some(raw) = raw else { return Ok(Cell::Null) };
            match field.kind() {
                FieldKind::Number => Ok(Cell::Number(raw.to_string())),
                _ => Ok(Cell::Text(raw.to_string())),
            }
        }

        fn assemble_select(&self, parts: &SelectParts) -> String {
            format!("SELECT {} FROM {}", parts.columns, parts.table)
        }
    }

    fn fake_columns() -> Vec<IntrospectedColumn> {
        vec![
            IntrospectedColumn { name: "id".to_string(), sql_type: "integer".to_string(), max_length: 0, primary_key: true, foreign_key: false, not_null: true, auto_inc: true },
            IntrospectedColumn { name: "name".to_string(), sql_type: "text".to_string(), max_length: 32, primary_key: false, foreign_key: false, not_null: false, auto_inc: false },
        ]
    }

    async fn build_api(rows: Vec<Vec<Option<String>>>) -> Api {
        build_api_with(rows, |_| {}).await
    }

    async fn build_api_with(rows: Vec<Vec<Option<String>>>, configure: impl FnOnce(&mut ApiConfig)) -> Api {
        let dialect = Arc::new(FakeDialect { columns: fake_columns(), rows: Mutex::new(rows), last_sql: Mutex::new(None) });
        let mut config = ApiConfig { table_name: "things".to_string(), api_name: "things".to_string(), ..Default::default() };
        configure(&mut config);
        Api::new(dialect, config).await.unwrap()
    }

    fn empty_request(method: Method) -> Request<'static> {
        Request {
            method,
            row_id: None,
            body: b"",
            content_type: ContentType::Json,
            response_type: ContentType::Json,
            multipart_boundary: None,
            query_params: std::collections::HashMap::new(),
        }
    }

    #[tokio::test]
    async fn get_returns_rows_wrapped_in_a_model_set() {
        let api = build_api(vec![vec![Some("1".to_string()), Some("bob".to_string())]]).await;
        let result = api.run(empty_request(Method::Get)).await;
        assert!(result.success);
        assert!(result.model_set.is_some());
    }

    #[tokio::test]
    async fn post_requires_at_least_one_row() {
        let api = build_api(vec![]).await;
        let mut req = empty_request(Method::Post);
        req.body = b"[]";
        let result = api.run(req).await;
        assert!(!result.success);
        assert_eq!(result.status_code, 400);
    }

    #[tokio::test]
    async fn post_inserts_a_valid_row() {
        let api = build_api(vec![]).await;
        let mut req = empty_request(Method::Post);
        req.body = br#"{"id": 1, "name": "bob"}"#;
        let result = api.run(req).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn put_requires_a_row_id() {
        let api = build_api(vec![]).await;
        let mut req = empty_request(Method::Put);
        req.body = br#"{"name": "bob"}"#;
        let result = api.run(req).await;
        assert!(!result.success);
        assert_eq!(result.status_code, 400);
    }

    #[tokio::test]
    async fn put_with_autoinc_write_is_rejected_under_strict_policy() {
        let api = build_api_with(vec![], |c| c.fail_on_update_on_autoinc = true).await;
        let mut req = empty_request(Method::Put);
        req.row_id = Some("1");
        req.body = br#"{"id": 2, "name": "bob"}"#;
        let result = api.run(req).await;
        assert!(!result.success);
        assert_eq!(result.status_code, 405);
    }

    #[tokio::test]
    async fn delete_requires_a_row_id() {
        let api = build_api(vec![]).await;
        let result = api.run(empty_request(Method::Delete)).await;
        assert!(!result.success);
        assert_eq!(result.status_code, 400);
    }

    #[tokio::test]
    async fn delete_with_id_succeeds() {
        let api = build_api(vec![]).await;
        let mut req = empty_request(Method::Delete);
        req.row_id = Some("1");
        let result = api.run(req).await;
        assert!(result.success);
    }
}
