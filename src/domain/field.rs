use chrono::{DateTime, SecondsFormat, Utc};

use crate::domain::error::OinoError;
use crate::infrastructure::codec::{self, ContentType};

/// One cell of a row.
///
/// `Absent` and `Null` are deliberately distinct variants (not
/// `Option<Option<T>>` buried in a single `Value` kind) — partial PUT/POST
/// payloads rely on telling "not provided" apart from "set to NULL" at
/// every layer, all the way down to the emitted SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// No value was provided by the client. Must not be written.
    Absent,
    /// SQL NULL.
    Null,
    Bool(bool),
    /// Canonical decimal text — kept as a string rather than f64/i64 so a
    /// value round-trips byte-for-byte through parse/serialize/SQL without
    /// floating-point rounding.
    Number(String),
    Text(String),
    Blob(Vec<u8>),
    DateTime(DateTime<Utc>),
}

impl Cell {
    pub fn is_absent(&self) -> bool {
        matches!(self, Cell::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

/// The logical type of a column. Immutable once a `Field` is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Boolean,
    Number,
    String,
    Blob,
    Datetime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldFlags {
    pub primary_key: bool,
    pub foreign_key: bool,
    pub not_null: bool,
    pub auto_inc: bool,
}

/// One column descriptor.
///
/// Owned by its `DataModel` for the lifetime of the `Api` — created once
/// during schema introspection and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    /// Opaque, dialect-specific SQL type tag (e.g. "varchar", "int4",
    /// "datetime2"). Used only by the owning `Dialect` to format literals —
    /// never branched on outside that boundary.
    sql_type: String,
    /// 0 = unbounded.
    max_length: usize,
    flags: FieldFlags,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind, sql_type: impl Into<String>, max_length: usize, flags: FieldFlags) -> Self {
        Field { name: name.into(), kind, sql_type: sql_type.into(), max_length, flags }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn sql_type(&self) -> &str {
        &self.sql_type
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn flags(&self) -> FieldFlags {
        self.flags
    }

    /// The cell's content-type-independent textual form: the same string
    /// `serialize_cell` would hand to the codec before content-type
    /// quoting. `None` for `Absent`/`Null` — callers that need a value
    /// (primary-key seeds, OinoId segments) must reject those first.
    pub fn canonical_text(&self, cell: &Cell) -> Option<String> {
        match cell {
            Cell::Absent | Cell::Null => None,
            Cell::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
            Cell::Number(n) => Some(n.clone()),
            Cell::Text(s) => Some(s.clone()),
            Cell::Blob(bytes) => Some(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)),
            Cell::DateTime(dt) => Some(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }

    /// Convert a cell into its canonical textual form for `content_type`.
    /// Returns `None` for `Absent`; `Some(None)` would be ambiguous with
    /// "empty string" so null is represented as the literal token the
    /// codec defines for that content type (e.g. the unquoted `null` word
    /// for CSV, JSON `null`).
    pub fn serialize_cell(&self, cell: &Cell, content_type: ContentType) -> Result<Option<String>, OinoError> {
        match cell {
            Cell::Absent => Ok(None),
            Cell::Null => Ok(Some(codec::encode_null(content_type))),
            _ => Ok(self.canonical_text(cell).map(|text| codec::encode(&text, content_type, self.kind))),
        }
    }

    /// Inverse of `serialize_cell`. `text == None` means the property/column
    /// was absent from the payload — this is the only way a caller can
    /// produce `Cell::Absent`.
    pub fn deserialize_cell(&self, text: Option<&str>, content_type: ContentType) -> Result<Cell, OinoError> {
        let Some(raw) = text else {
            return Ok(Cell::Absent);
        };
        if codec::is_null_token(raw, content_type) {
            return Ok(Cell::Null);
        }
        self.deserialize_cell_value(raw, content_type)
    }

    /// Like `deserialize_cell`, but skips the unquoted-`null`-token check —
    /// for callers (the Parser's JSON/CSV scanners) that already know from
    /// framing context whether a value is the null keyword or literal text
    /// that merely reads `null`.
    pub fn deserialize_cell_value(&self, raw: &str, content_type: ContentType) -> Result<Cell, OinoError> {
        let decoded = codec::decode(raw, content_type)?;
        match self.kind {
            FieldKind::Boolean => match decoded.as_str() {
                "true" | "1" => Ok(Cell::Bool(true)),
                "false" | "0" => Ok(Cell::Bool(false)),
                other => Err(OinoError::request_shape(format!(
                    "field '{}': '{}' is not a valid boolean",
                    self.name, other
                ))),
            },
            FieldKind::Number => {
                decoded.parse::<f64>().map_err(|_| {
                    OinoError::request_shape(format!("field '{}': '{}' is not a valid number", self.name, decoded))
                })?;
                if decoded.to_ascii_lowercase().contains("nan") || decoded.to_ascii_lowercase().contains("inf") {
                    return Err(OinoError::request_shape(format!("field '{}': NaN/Infinity is not a valid number", self.name)));
                }
                Ok(Cell::Number(decoded))
            }
            FieldKind::String => Ok(Cell::Text(decoded)),
            FieldKind::Blob => {
                let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, decoded.as_bytes())
                    .map_err(|e| OinoError::request_shape(format!("field '{}': invalid base64: {e}", self.name)))?;
                Ok(Cell::Blob(bytes))
            }
            FieldKind::Datetime => {
                let dt = DateTime::parse_from_rfc3339(&decoded)
                    .map(|dt| dt.with_timezone(&Utc))
                    .or_else(|_| {
                        chrono::NaiveDate::parse_from_str(&decoded, "%Y-%m-%d")
                            .map(|d| DateTime::<Utc>::from_naive_utc_and_offset(d.and_hms_opt(0, 0, 0).unwrap(), Utc))
                    })
                    .map_err(|_| OinoError::request_shape(format!("field '{}': '{}' is not a valid datetime", self.name, decoded)))?;
                Ok(Cell::DateTime(dt))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_field(name: &str) -> Field {
        Field::new(name, FieldKind::String, "varchar", 64, FieldFlags::default())
    }

    fn number_field(name: &str) -> Field {
        Field::new(name, FieldKind::Number, "integer", 0, FieldFlags::default())
    }

    #[test]
    fn quoted_null_text_is_distinct_from_null_keyword() {
        let f = string_field("name");
        assert_eq!(f.deserialize_cell(Some("null"), ContentType::Json).unwrap(), Cell::Null);
        assert_eq!(f.deserialize_cell_value("null", ContentType::Json).unwrap(), Cell::Text("null".to_string()));
    }

    #[test]
    fn absent_round_trips() {
        let f = string_field("name");
        assert_eq!(f.serialize_cell(&Cell::Absent, ContentType::Json).unwrap(), None);
        assert_eq!(f.deserialize_cell(None, ContentType::Json).unwrap(), Cell::Absent);
    }

    #[test]
    fn null_is_distinct_from_absent() {
        let f = string_field("name");
        let serialized = f.serialize_cell(&Cell::Null, ContentType::Json).unwrap();
        assert_eq!(serialized, Some("null".to_string()));
        let back = f.deserialize_cell(serialized.as_deref(), ContentType::Json).unwrap();
        assert_eq!(back, Cell::Null);
    }

    #[test]
    fn number_round_trips_as_decimal_text() {
        let f = number_field("qty");
        let cell = Cell::Number("12.99".to_string());
        let serialized = f.serialize_cell(&cell, ContentType::Json).unwrap().unwrap();
        assert_eq!(serialized, "12.99");
        let back = f.deserialize_cell(Some(&serialized), ContentType::Json).unwrap();
        assert_eq!(back, cell);
    }

    #[test]
    fn nan_is_rejected() {
        let f = number_field("qty");
        let err = f.deserialize_cell(Some("NaN"), ContentType::Json).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn blob_round_trips_base64() {
        let f = Field::new("payload", FieldKind::Blob, "blob", 0, FieldFlags::default());
        let cell = Cell::Blob(vec![0xde, 0xad, 0xbe, 0xef]);
        let serialized = f.serialize_cell(&cell, ContentType::Json).unwrap().unwrap();
        let back = f.deserialize_cell(Some(&serialized), ContentType::Json).unwrap();
        assert_eq!(back, cell);
    }

    #[test]
    fn datetime_round_trips_iso8601() {
        let f = Field::new("created_at", FieldKind::Datetime, "datetime", 0, FieldFlags::default());
        let dt = DateTime::parse_from_rfc3339("2024-03-01T12:30:00.000Z").unwrap().with_timezone(&Utc);
        let cell = Cell::DateTime(dt);
        let serialized = f.serialize_cell(&cell, ContentType::Json).unwrap().unwrap();
        let back = f.deserialize_cell(Some(&serialized), ContentType::Json).unwrap();
        assert_eq!(back, cell);
    }
}
