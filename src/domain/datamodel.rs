//! DataModel — the in-memory column model built once from
//! `Dialect::introspect_table` and shared read-only for the lifetime of an
//! `Api`. Every SQL string the gateway emits is assembled here; nothing
//! outside this file concatenates raw user text into a query.

use std::collections::HashMap;

use crate::domain::error::OinoError;
use crate::domain::field::{Cell, Field, FieldKind};
use crate::domain::hashid::Hashid;
use crate::domain::oino_id;
use crate::domain::ports::{Dialect, SelectParts};
use crate::domain::sql_params::SqlParams;

/// One row's cells, aligned by position to `DataModel::fields()`.
pub type Row = Vec<Cell>;

pub struct DataModel {
    fields: Vec<Field>,
    name_index: HashMap<String, usize>,
    oinoid_field_name: String,
    oinoid_separator: char,
    hashid: Option<Hashid>,
}

impl DataModel {
    pub fn new(oinoid_field_name: impl Into<String>, oinoid_separator: char, hashid: Option<Hashid>) -> Self {
        DataModel {
            fields: Vec::new(),
            name_index: HashMap::new(),
            oinoid_field_name: oinoid_field_name.into(),
            oinoid_separator,
            hashid,
        }
    }

    pub fn add_field(&mut self, field: Field) {
        self.name_index.insert(field.name().to_string(), self.fields.len());
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn oinoid_field_name(&self) -> &str {
        &self.oinoid_field_name
    }

    pub fn find_field_by_name(&self, name: &str) -> Option<&Field> {
        self.name_index.get(name).map(|&i| &self.fields[i])
    }

    pub fn find_field_index_by_name(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    pub fn filter_fields<P: Fn(&Field) -> bool>(&self, predicate: P) -> Vec<&Field> {
        self.fields.iter().filter(|f| predicate(f)).collect()
    }

    pub fn primary_key_fields(&self) -> Vec<&Field> {
        self.filter_fields(|f| f.flags().primary_key)
    }

    /// Percent-decoded, hashid-decoded (where applicable) primary-key
    /// values for `row`, in model order. Fails if any primary-key cell is
    /// absent or null — a row cannot be addressed without its full key.
    pub fn get_row_primarykey_values(&self, row: &Row, apply_hashid: bool) -> Result<Vec<String>, OinoError> {
        let mut values = Vec::new();
        for field in self.primary_key_fields() {
            let idx = self.find_field_index_by_name(field.name()).expect("field came from this model");
            let cell = row.get(idx).ok_or_else(|| OinoError::backend(format!("row missing column '{}'", field.name())))?;
            let raw = field
                .canonical_text(cell)
                .ok_or_else(|| OinoError::request_shape(format!("primary key '{}' is absent or null", field.name())))?;

            let value = if apply_hashid && field.kind() == FieldKind::Number {
                if let Some(hashid) = &self.hashid {
                    let seed = pk_hashid_seed(field.name(), &values);
                    hashid.encode(&raw, &seed)?
                } else {
                    raw
                }
            } else {
                raw
            };
            values.push(value);
        }
        Ok(values)
    }

    /// The full OinoId token for `row` (hashid-encoded where configured).
    pub fn row_oinoid(&self, row: &Row) -> Result<String, OinoError> {
        let values = self.get_row_primarykey_values(row, true)?;
        Ok(oino_id::encode(&values, self.oinoid_separator))
    }

    fn id_condition_sql(&self, id: &str, dialect: &dyn Dialect) -> Result<String, OinoError> {
        let pk_fields = self.primary_key_fields();
        let segments = oino_id::decode(id, self.oinoid_separator)?;
        if segments.len() != pk_fields.len() {
            return Err(OinoError::request_shape(format!(
                "id has {} segment(s), expected {}",
                segments.len(),
                pk_fields.len()
            )));
        }

        let mut raw_so_far = Vec::new();
        let mut conditions = Vec::with_capacity(pk_fields.len());
        for (field, segment) in pk_fields.iter().zip(segments.iter()) {
            let raw = if field.kind() == FieldKind::Number {
                if let Some(hashid) = &self.hashid {
                    let seed = pk_hashid_seed(field.name(), &raw_so_far);
                    hashid.decode(segment, &seed)?
                } else {
                    segment.clone()
                }
            } else {
                segment.clone()
            };

            let cell = field.deserialize_cell(Some(&raw), crate::infrastructure::codec::ContentType::UrlEncode)?;
            let literal = dialect.print_literal(&cell, field)?;
            if literal.is_empty() {
                return Err(OinoError::request_shape("id segment rendered an empty SQL literal"));
            }
            conditions.push(format!("{} = {}", dialect.print_identifier(field.name()), literal));
            raw_so_far.push(raw);
        }

        Ok(conditions.join(" AND "))
    }

    /// Builds the SELECT statement plus a placeholder mask aligned 1:1 with
    /// `self.fields()`: `mask[i]` is true when column `i` of the statement
    /// is a constant placeholder rather than the field's real value. A
    /// caller mapping raw result rows back to `Row`s MUST treat a masked
    /// position as `Cell::Null` rather than feeding its raw text through
    /// the field's normal decode path — the placeholder text has no
    /// relation to the field's declared kind. This keeps "row length ==
    /// number of fields in the DataModel" true regardless of
    /// `oinosqlselect`/`oinosqlaggregate` narrowing or reordering the
    /// emitted columns.
    pub fn print_sql_select(&self, table_name: &str, id: Option<&str>, params: &SqlParams, dialect: &dyn Dialect) -> Result<(String, Vec<bool>), OinoError> {
        // Validate the requested field names up front; `is_selected` below
        // decides, per model field and in model order, whether it is real.
        let explicit: Option<Vec<&Field>> = match &params.select {
            Some(select) if !select.is_all() => {
                let mut out = Vec::new();
                for name in &select.fields {
                    let f = self
                        .find_field_by_name(name)
                        .ok_or_else(|| OinoError::request_shape(format!("unknown field in select: '{name}'")))?;
                    out.push(f);
                }
                Some(out)
            }
            _ => None,
        };
        let is_selected = |field: &Field| match &explicit {
            None => true,
            Some(list) => field.flags().primary_key || list.iter().any(|f| f.name() == field.name()),
        };

        let aggregate = params.aggregate.as_ref();
        let aggregate_exprs: HashMap<&str, String> = match aggregate {
            Some(aggregate) => aggregate.items.iter().map(|(_, name)| name.as_str()).zip(aggregate.column_sql(self, dialect)?).collect(),
            None => HashMap::new(),
        };

        let placeholder = dialect.print_string("OINO_UNSELECTED");
        let mut columns = Vec::with_capacity(self.fields.len());
        let mut group_by_cols = Vec::new();
        let mut mask = Vec::with_capacity(self.fields.len());

        for field in &self.fields {
            let ident = dialect.print_identifier(field.name());
            if let Some(expr) = aggregate_exprs.get(field.name()) {
                columns.push(expr.clone());
                mask.push(false);
            } else if aggregate.is_some() {
                if is_selected(field) {
                    columns.push(ident.clone());
                    group_by_cols.push(ident);
                    mask.push(false);
                } else {
                    columns.push(format!("MIN({placeholder}) AS {ident}"));
                    mask.push(true);
                }
            } else if is_selected(field) {
                columns.push(ident);
                mask.push(false);
            } else {
                columns.push(format!("{placeholder} AS {ident}"));
                mask.push(true);
            }
        }

        let mut where_parts = Vec::new();
        if let Some(id) = id {
            where_parts.push(self.id_condition_sql(id, dialect)?);
        }
        if let Some(filter) = &params.filter {
            where_parts.push(filter.to_sql(self, dialect)?);
        }
        let where_clause = if where_parts.is_empty() { None } else { Some(where_parts.join(" AND ")) };

        let group_by = if group_by_cols.is_empty() { None } else { Some(group_by_cols.join(", ")) };

        let order_by = params.order.as_ref().map(|o| o.to_sql(self, dialect)).transpose()?;
        let (limit, offset) = params.limit.as_ref().map(|l| l.to_limit_offset()).map(|(l, o)| (Some(l), o)).unwrap_or((None, None));

        let parts = SelectParts {
            table: dialect.print_identifier(table_name),
            columns: columns.join(", "),
            where_clause,
            group_by,
            order_by,
            limit,
            offset,
        };
        Ok((dialect.assemble_select(&parts), mask))
    }

    pub fn print_sql_insert(&self, row: &Row, dialect: &dyn Dialect) -> Result<String, OinoError> {
        let mut cols = Vec::new();
        let mut literals = Vec::new();
        for (idx, field) in self.fields.iter().enumerate() {
            let cell = &row[idx];
            if cell.is_absent() {
                continue;
            }
            let literal = dialect.print_literal(cell, field)?;
            cols.push(dialect.print_identifier(field.name()));
            literals.push(literal);
        }
        Ok(format!("({}) VALUES ({})", cols.join(", "), literals.join(", ")))
    }

    pub fn print_sql_update(&self, id: &str, row: &Row, dialect: &dyn Dialect) -> Result<String, OinoError> {
        let mut assignments = Vec::new();
        for (idx, field) in self.fields.iter().enumerate() {
            if field.flags().primary_key {
                continue;
            }
            let cell = &row[idx];
            if cell.is_absent() {
                continue;
            }
            let literal = dialect.print_literal(cell, field)?;
            assignments.push(format!("{} = {}", dialect.print_identifier(field.name()), literal));
        }
        let where_clause = self.id_condition_sql(id, dialect)?;
        Ok(format!("SET {} WHERE {}", assignments.join(", "), where_clause))
    }

    pub fn print_sql_delete(&self, id: &str, dialect: &dyn Dialect) -> Result<String, OinoError> {
        Ok(format!("WHERE {}", self.id_condition_sql(id, dialect)?))
    }
}

/// The seed fed to `Hashid::encode`/`decode` for one primary-key field:
/// the field name plus the raw (un-hashided) values of the primary-key
/// fields preceding it in model order. Single-key tables get
/// `"{field_name} "` — deterministic and independent of the value being
/// encoded, avoiding the circular dependency a seed built from the field's
/// own value would create.
fn pk_hashid_seed(field_name: &str, prior_raw_values: &[String]) -> String {
    format!("{field_name} {}", prior_raw_values.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field::FieldFlags;

    fn model_with_single_pk() -> DataModel {
        let mut model = DataModel::new("_OINOID_", '_', None);
        model.add_field(Field::new(
            "id",
            FieldKind::Number,
            "integer",
            0,
            FieldFlags { primary_key: true, ..Default::default() },
        ));
        model.add_field(Field::new("name", FieldKind::String, "varchar", 64, FieldFlags::default()));
        model
    }

    #[test]
    fn find_field_by_name_works() {
        let model = model_with_single_pk();
        assert!(model.find_field_by_name("id").is_some());
        assert!(model.find_field_by_name("missing").is_none());
    }

    #[test]
    fn primary_key_values_round_trip_without_hashid() {
        let model = model_with_single_pk();
        let row: Row = vec![Cell::Number("42".to_string()), Cell::Text("bob".to_string())];
        let values = model.get_row_primarykey_values(&row, true).unwrap();
        assert_eq!(values, vec!["42".to_string()]);
        let id = model.row_oinoid(&row).unwrap();
        assert_eq!(id, "42");
    }

    #[test]
    fn primary_key_missing_is_rejected() {
        let model = model_with_single_pk();
        let row: Row = vec![Cell::Null, Cell::Text("bob".to_string())];
        assert!(model.get_row_primarykey_values(&row, true).is_err());
    }

    struct TestDialect;

    #[async_trait::async_trait]
    impl Dialect for TestDialect {
        fn engine_tag(&self) -> &str {
            "test"
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
        async fn query(&self, _sql: &str) -> Result<Vec<crate::domain::ports::RawRow>, OinoError> {
            Ok(Vec::new())
        }
        async fn execute(&self, _sql: &str) -> Result<u64, OinoError> {
            Ok(0)
        }
        async fn introspect_table(&self, _table_name: &str) -> Result<Vec<crate::domain::ports::IntrospectedColumn>, OinoError> {
            Ok(Vec::new())
        }
        fn map_field_kind(&self, _sql_type: &str) -> FieldKind {
            FieldKind::String
        }
        fn print_identifier(&self, name: &str) -> String {
            format!("\"{name}\"")
        }
        fn print_string(&self, text: &str) -> String {
            format!("'{}'", text.replace('\'', "''"))
        }
        fn print_literal(&self, cell: &Cell, field: &Field) -> Result<String, OinoError> {
            match cell {
                Cell::Number(n) => Ok(n.clone()),
                Cell::Text(s) => Ok(self.print_string(s)),
                _ => Ok("NULL".to_string()),
            }
            .map(|l| {
                let _ = field;
                l
            })
        }
        fn parse_result_cell(&self, raw: Option<&str>, _field: &Field) -> Result<Cell, OinoError> {
            Ok(raw.map(|r| Cell::Text(r.to_string())).unwrap_or(Cell::Null))
        }
        fn assemble_select(&self, parts: &SelectParts) -> String {
            format!("SELECT {} FROM {}", parts.columns, parts.table)
        }
    }

    fn model_with_three_fields() -> DataModel {
        let mut model = DataModel::new("_OINOID_", '_', None);
        model.add_field(Field::new("id", FieldKind::Number, "integer", 0, FieldFlags { primary_key: true, ..Default::default() }));
        model.add_field(Field::new("name", FieldKind::String, "varchar", 64, FieldFlags::default()));
        model.add_field(Field::new("age", FieldKind::Number, "integer", 0, FieldFlags::default()));
        model
    }

    #[test]
    fn select_default_emits_one_real_column_per_field_in_model_order() {
        let model = model_with_three_fields();
        let dialect = TestDialect;
        let (sql, mask) = model.print_sql_select("things", None, &SqlParams::default(), &dialect).unwrap();
        assert_eq!(mask, vec![false, false, false]);
        assert_eq!(sql, r#"SELECT "id", "name", "age" FROM "things""#);
    }

    #[test]
    fn select_narrowing_keeps_full_field_count_with_placeholders() {
        let model = model_with_three_fields();
        let dialect = TestDialect;
        let params = SqlParams { select: Some(crate::domain::sql_params::Select { fields: vec!["name".to_string()] }), ..Default::default() };
        let (sql, mask) = model.print_sql_select("things", None, &params, &dialect).unwrap();
        // "id" is forced in as a real column (needed to address the row later) even though unselected.
        assert_eq!(mask, vec![false, false, true]);
        assert_eq!(sql, r#"SELECT "id", "name", 'OINO_UNSELECTED' AS "age" FROM "things""#);
    }

    #[test]
    fn select_reordered_request_still_emits_columns_in_model_order() {
        let model = model_with_three_fields();
        let dialect = TestDialect;
        let params = SqlParams {
            select: Some(crate::domain::sql_params::Select { fields: vec!["age".to_string(), "name".to_string()] }),
            ..Default::default()
        };
        let (sql, mask) = model.print_sql_select("things", None, &params, &dialect).unwrap();
        assert_eq!(mask, vec![false, false, false]);
        assert_eq!(sql, r#"SELECT "id", "name", "age" FROM "things""#);
    }

    #[test]
    fn aggregate_marks_non_group_non_aggregated_fields_as_placeholder() {
        let model = model_with_three_fields();
        let dialect = TestDialect;
        let params = SqlParams {
            aggregate: Some(crate::domain::sql_params::Aggregate::parse("avg(age)").unwrap()),
            select: Some(crate::domain::sql_params::Select { fields: vec!["name".to_string()] }),
            ..Default::default()
        };
        let (sql, mask) = model.print_sql_select("things", None, &params, &dialect).unwrap();
        // id: forced-selected group-by field; name: selected group-by field; age: aggregated.
        assert_eq!(mask, vec![false, false, false]);
        assert_eq!(sql, r#"SELECT "id", "name", AVG("age") AS "age" FROM "things" GROUP BY "id", "name""#);
    }

    #[test]
    fn aggregate_with_fully_excluded_field_uses_min_placeholder() {
        let mut model = model_with_three_fields();
        model.add_field(Field::new("note", FieldKind::String, "varchar", 64, FieldFlags::default()));
        let dialect = TestDialect;
        let params = SqlParams {
            aggregate: Some(crate::domain::sql_params::Aggregate::parse("avg(age)").unwrap()),
            select: Some(crate::domain::sql_params::Select { fields: vec!["name".to_string()] }),
            ..Default::default()
        };
        let (sql, mask) = model.print_sql_select("things", None, &params, &dialect).unwrap();
        assert_eq!(mask, vec![false, false, false, true]);
        assert!(sql.contains(r#"MIN('OINO_UNSELECTED') AS "note""#));
    }

    #[test]
    fn unknown_select_field_is_rejected() {
        let model = model_with_three_fields();
        let dialect = TestDialect;
        let params = SqlParams { select: Some(crate::domain::sql_params::Select { fields: vec!["bogus".to_string()] }), ..Default::default() };
        assert!(model.print_sql_select("things", None, &params, &dialect).is_err());
    }
}
