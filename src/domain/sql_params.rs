//! The SqlParams sublanguage — Filter/Order/Limit/Aggregate/Select
//! expressions taken from HTTP query-string parameters. Parsing never
//! touches the model; compiling to SQL (`to_sql`) always does, so an
//! unknown field is caught exactly once, at compile time, rather than
//! silently passing through.

use regex::Regex;
use std::sync::OnceLock;

use crate::domain::datamodel::DataModel;
use crate::domain::error::OinoError;
use crate::domain::field::Cell;
use crate::domain::ports::Dialect;
use crate::infrastructure::codec::{split_by_brackets, ContentType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Like,
}

impl CompareOp {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "lt" => Some(CompareOp::Lt),
            "le" => Some(CompareOp::Le),
            "eq" => Some(CompareOp::Eq),
            "ge" => Some(CompareOp::Ge),
            "gt" => Some(CompareOp::Gt),
            "like" => Some(CompareOp::Like),
            _ => None,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "=",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Like => "LIKE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare { field: String, op: CompareOp, value: String },
    Not(Box<Filter>),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
}

fn comparison_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\(([^()]+)\)-(lt|le|eq|ge|gt|like)\((.*)\)$").unwrap())
}

fn negation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-not\((.*)\)$").unwrap())
}

impl Filter {
    pub fn parse(s: &str) -> Result<Filter, OinoError> {
        let s = s.trim();

        if let Some(caps) = comparison_re().captures(s) {
            let field = caps[1].to_string();
            let op = CompareOp::from_token(&caps[2]).expect("regex restricts to known ops");
            let value = caps[3].to_string();
            return Ok(Filter::Compare { field, op, value });
        }

        if let Some(caps) = negation_re().captures(s) {
            let inner = Filter::parse(&caps[1])?;
            return Ok(Filter::Not(Box::new(inner)));
        }

        let parts = split_by_brackets(s, true, false, '(', ')');
        if parts.len() == 3 {
            let (left, conj, right) = (&parts[0], parts[1].trim(), &parts[2]);
            let is_and = conj == "-and";
            let is_or = conj == "-or";
            if is_and || is_or {
                let left = Filter::parse(&format!("({left})"))?;
                let right = Filter::parse(&format!("({right})"))?;
                return Ok(if is_and {
                    Filter::And(Box::new(left), Box::new(right))
                } else {
                    Filter::Or(Box::new(left), Box::new(right))
                });
            }
        }

        Err(OinoError::request_shape(format!("unparseable filter expression: '{s}'")))
    }

    pub fn to_sql(&self, model: &DataModel, dialect: &dyn Dialect) -> Result<String, OinoError> {
        match self {
            Filter::Compare { field, op, value } => {
                let f = model
                    .find_field_by_name(field)
                    .ok_or_else(|| OinoError::request_shape(format!("unknown field in filter: '{field}'")))?;
                let cell = f
                    .deserialize_cell(Some(value), ContentType::UrlEncode)
                    .unwrap_or_else(|_| Cell::Text(value.clone()));
                let literal = dialect.print_literal(&cell, f)?;
                if literal.is_empty() {
                    return Err(OinoError::request_shape("filter literal rendered empty"));
                }
                Ok(format!("{} {} {}", dialect.print_identifier(f.name()), op.sql(), literal))
            }
            Filter::Not(inner) => Ok(format!("NOT ({})", inner.to_sql(model, dialect)?)),
            Filter::And(l, r) => Ok(format!("({}) AND ({})", l.to_sql(model, dialect)?, r.to_sql(model, dialect)?)),
            Filter::Or(l, r) => Ok(format!("({}) OR ({})", l.to_sql(model, dialect)?, r.to_sql(model, dialect)?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub items: Vec<(String, bool)>,
}

impl Order {
    pub fn parse(s: &str) -> Result<Order, OinoError> {
        let mut items = Vec::new();
        for raw in s.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let mut tokens = raw.split_whitespace();
            let field = tokens
                .next()
                .ok_or_else(|| OinoError::request_shape("empty order item"))?
                .to_string();
            let descending = match tokens.next() {
                None => false,
                Some("ASC") | Some("asc") | Some("+") => false,
                Some("DESC") | Some("desc") | Some("-") => true,
                Some(other) => return Err(OinoError::request_shape(format!("invalid order direction: '{other}'"))),
            };
            items.push((field, descending));
        }
        if items.is_empty() {
            return Err(OinoError::request_shape("order expression has no items"));
        }
        Ok(Order { items })
    }

    pub fn to_sql(&self, model: &DataModel, dialect: &dyn Dialect) -> Result<String, OinoError> {
        let mut parts = Vec::with_capacity(self.items.len());
        for (field, descending) in &self.items {
            let f = model
                .find_field_by_name(field)
                .ok_or_else(|| OinoError::request_shape(format!("unknown field in order: '{field}'")))?;
            parts.push(format!("{} {}", dialect.print_identifier(f.name()), if *descending { "DESC" } else { "ASC" }));
        }
        Ok(parts.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub count: u64,
    pub page: Option<u64>,
}

impl Limit {
    pub fn parse(s: &str) -> Result<Limit, OinoError> {
        let s = s.trim();
        let mut tokens = s.split_whitespace();
        let count = tokens
            .next()
            .ok_or_else(|| OinoError::request_shape("empty limit expression"))?
            .parse::<u64>()
            .map_err(|_| OinoError::request_shape(format!("invalid limit count in '{s}'")))?;

        match (tokens.next(), tokens.next()) {
            (None, None) => Ok(Limit { count, page: None }),
            (Some("page"), Some(page_tok)) => {
                let page = page_tok
                    .parse::<u64>()
                    .map_err(|_| OinoError::request_shape(format!("invalid limit page in '{s}'")))?;
                Ok(Limit { count, page: Some(page) })
            }
            _ => Err(OinoError::request_shape(format!("malformed limit expression: '{s}'"))),
        }
    }

    /// `(limit, offset)` honoring the `LIMIT N OFFSET (N*(M-1)+1)` paging
    /// form; the Dialect's `assemble_select` renders it in engine syntax.
    pub fn to_limit_offset(&self) -> (u64, Option<u64>) {
        match self.page {
            None => (self.count, None),
            Some(page) => (self.count, Some(self.count.saturating_mul(page.saturating_sub(1)) + 1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFn {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "count" => Some(AggFn::Count),
            "sum" => Some(AggFn::Sum),
            "avg" => Some(AggFn::Avg),
            "min" => Some(AggFn::Min),
            "max" => Some(AggFn::Max),
            _ => None,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            AggFn::Count => "COUNT",
            AggFn::Sum => "SUM",
            AggFn::Avg => "AVG",
            AggFn::Min => "MIN",
            AggFn::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub items: Vec<(AggFn, String)>,
}

fn aggregate_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(count|sum|avg|min|max)\(([^()]+)\)$").unwrap())
}

impl Aggregate {
    pub fn parse(s: &str) -> Result<Aggregate, OinoError> {
        let mut items = Vec::new();
        for raw in s.split(',') {
            let raw = raw.trim();
            let caps = aggregate_item_re()
                .captures(raw)
                .ok_or_else(|| OinoError::request_shape(format!("invalid aggregate item: '{raw}'")))?;
            let agg_fn = AggFn::from_token(&caps[1]).expect("regex restricts to known functions");
            items.push((agg_fn, caps[2].to_string()));
        }
        if items.is_empty() {
            return Err(OinoError::request_shape("aggregate expression has no items"));
        }
        Ok(Aggregate { items })
    }

    pub fn aggregated_fields(&self) -> Vec<&str> {
        self.items.iter().map(|(_, f)| f.as_str()).collect()
    }

    pub fn column_sql(&self, model: &DataModel, dialect: &dyn Dialect) -> Result<Vec<String>, OinoError> {
        self.items
            .iter()
            .map(|(agg_fn, field)| {
                let f = model
                    .find_field_by_name(field)
                    .ok_or_else(|| OinoError::request_shape(format!("unknown field in aggregate: '{field}'")))?;
                let ident = dialect.print_identifier(f.name());
                Ok(format!("{}({}) AS {}", agg_fn.sql(), ident, ident))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Select {
    pub fields: Vec<String>,
}

impl Select {
    pub fn parse(s: &str) -> Result<Select, OinoError> {
        let fields: Vec<String> = s.split(',').map(|f| f.trim().to_string()).filter(|f| !f.is_empty()).collect();
        Ok(Select { fields })
    }

    pub fn is_all(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SqlParams {
    pub filter: Option<Filter>,
    pub order: Option<Order>,
    pub limit: Option<Limit>,
    pub aggregate: Option<Aggregate>,
    pub select: Option<Select>,
}

pub const PARAM_FILTER: &str = "oinosqlfilter";
pub const PARAM_ORDER: &str = "oinosqlorder";
pub const PARAM_LIMIT: &str = "oinosqllimit";
pub const PARAM_AGGREGATE: &str = "oinosqlaggregate";
pub const PARAM_SELECT: &str = "oinosqlselect";

impl SqlParams {
    /// Build a `SqlParams` from the recognized `oinosql*` query parameters.
    /// Unrecognized keys are ignored — the host routing layer may pass
    /// through other query params untouched.
    pub fn from_query_params(params: &std::collections::HashMap<String, String>) -> Result<SqlParams, crate::domain::error::OinoError> {
        Ok(SqlParams {
            filter: params.get(PARAM_FILTER).map(|v| Filter::parse(v)).transpose()?,
            order: params.get(PARAM_ORDER).map(|v| Order::parse(v)).transpose()?,
            limit: params.get(PARAM_LIMIT).map(|v| Limit::parse(v)).transpose()?,
            aggregate: params.get(PARAM_AGGREGATE).map(|v| Aggregate::parse(v)).transpose()?,
            select: params.get(PARAM_SELECT).map(|v| Select::parse(v)).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_comparison() {
        let f = Filter::parse("(age)-ge(30)").unwrap();
        assert_eq!(f, Filter::Compare { field: "age".to_string(), op: CompareOp::Ge, value: "30".to_string() });
    }

    #[test]
    fn parses_negation() {
        let f = Filter::parse("-not((age)-eq(30))").unwrap();
        assert!(matches!(f, Filter::Not(_)));
    }

    #[test]
    fn parses_conjunction() {
        let f = Filter::parse("((age)-ge(30))-and((name)-eq(bob))").unwrap();
        assert!(matches!(f, Filter::And(_, _)));
    }

    #[test]
    fn parses_disjunction() {
        let f = Filter::parse("((age)-ge(30))-or((name)-eq(bob))").unwrap();
        assert!(matches!(f, Filter::Or(_, _)));
    }

    #[test]
    fn rejects_malformed_filter() {
        assert!(Filter::parse("age ge 30").is_err());
    }

    #[test]
    fn order_parses_direction_tokens() {
        let o = Order::parse("name, age DESC, id +").unwrap();
        assert_eq!(o.items, vec![("name".to_string(), false), ("age".to_string(), true), ("id".to_string(), false)]);
    }

    #[test]
    fn limit_parses_plain_count() {
        let l = Limit::parse("10").unwrap();
        assert_eq!(l.to_limit_offset(), (10, None));
    }

    #[test]
    fn limit_parses_paged_form() {
        let l = Limit::parse("10 page 3").unwrap();
        assert_eq!(l.to_limit_offset(), (10, Some(21)));
    }

    #[test]
    fn aggregate_parses_multiple_items() {
        let a = Aggregate::parse("count(id), avg(price)").unwrap();
        assert_eq!(a.items, vec![(AggFn::Count, "id".to_string()), (AggFn::Avg, "price".to_string())]);
    }

    #[test]
    fn select_empty_means_all() {
        assert!(Select::parse("").unwrap().is_all());
    }

    #[test]
    fn select_lists_fields() {
        let s = Select::parse("id, name").unwrap();
        assert_eq!(s.fields, vec!["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn from_query_params_parses_recognized_keys_only() {
        let mut map = std::collections::HashMap::new();
        map.insert(PARAM_FILTER.to_string(), "(age)-ge(30)".to_string());
        map.insert("unrelated".to_string(), "ignored".to_string());
        let params = SqlParams::from_query_params(&map).unwrap();
        assert!(params.filter.is_some());
        assert!(params.order.is_none());
    }
}
