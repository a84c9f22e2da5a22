//! Parser — turns request bytes of a known content type into rows aligned
//! to a `DataModel`. Never touches SQL; every value still passes through
//! `Field::deserialize_cell`/`deserialize_cell_value` before it becomes a
//! `Cell`.

use regex::Regex;
use std::sync::OnceLock;

use crate::domain::datamodel::{DataModel, Row};
use crate::domain::error::{Message, OinoError};
use crate::domain::field::{Cell, Field};
use crate::infrastructure::codec::{self, ContentType};

pub struct ParsedRows {
    pub rows: Vec<Row>,
    pub messages: Vec<Message>,
}

pub fn parse(bytes: &[u8], content_type: ContentType, model: &DataModel, boundary: Option<&str>) -> Result<ParsedRows, OinoError> {
    match content_type {
        ContentType::Json => parse_json(bytes, model),
        ContentType::Csv => parse_csv(bytes, model),
        ContentType::FormData => {
            let boundary = boundary.ok_or_else(|| OinoError::request_shape("multipart/form-data requires a boundary"))?;
            parse_multipart(bytes, boundary, model)
        }
        ContentType::UrlEncode => parse_urlencode(bytes, model),
        ContentType::Html => Err(OinoError::request_shape("html is output-only and cannot be parsed as a request body")),
    }
}

fn empty_row(model: &DataModel) -> Row {
    vec![Cell::Absent; model.fields().len()]
}

fn is_row_empty(row: &Row) -> bool {
    row.iter().all(Cell::is_absent)
}

// ── JSON ─────────────────────────────────────────────────────────────────

fn parse_json(bytes: &[u8], model: &DataModel) -> Result<ParsedRows, OinoError> {
    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| OinoError::request_shape(format!("invalid JSON body: {e}")))?;

    let objects: Vec<&serde_json::Map<String, serde_json::Value>> = match &value {
        serde_json::Value::Object(obj) => vec![obj],
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| v.as_object().ok_or_else(|| OinoError::request_shape("array elements must be JSON objects")))
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(OinoError::request_shape("JSON body must be an object or an array of objects")),
    };

    let mut rows = Vec::new();
    let mut messages = Vec::new();
    for obj in objects {
        let mut row = empty_row(model);
        for (key, val) in obj {
            let Some(idx) = model.find_field_index_by_name(key) else { continue };
            row[idx] = cell_from_json_value(&model.fields()[idx], val)?;
        }
        if is_row_empty(&row) {
            messages.push(Message::warning("skipped an empty row"));
            continue;
        }
        rows.push(row);
    }
    Ok(ParsedRows { rows, messages })
}

fn cell_from_json_value(field: &Field, value: &serde_json::Value) -> Result<Cell, OinoError> {
    match value {
        serde_json::Value::Null => Ok(Cell::Null),
        serde_json::Value::Bool(b) => field.deserialize_cell_value(if *b { "true" } else { "false" }, ContentType::Json),
        serde_json::Value::Number(n) => field.deserialize_cell_value(&n.to_string(), ContentType::Json),
        serde_json::Value::String(s) => field.deserialize_cell_value(s, ContentType::Json),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Ok(Cell::Text(value.to_string())),
    }
}

// ── CSV ──────────────────────────────────────────────────────────────────

struct CsvToken {
    text: String,
    quoted: bool,
}

fn scan_csv(text: &str) -> Vec<Vec<CsvToken>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_was_quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                field_was_quoted = true;
            }
            ',' => {
                row.push(CsvToken { text: std::mem::take(&mut field), quoted: field_was_quoted });
                field_was_quoted = false;
            }
            '\r' => {}
            '\n' => {
                row.push(CsvToken { text: std::mem::take(&mut field), quoted: field_was_quoted });
                field_was_quoted = false;
                rows.push(std::mem::take(&mut row));
            }
            c => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(CsvToken { text: field, quoted: field_was_quoted });
        rows.push(row);
    }
    rows
}

fn parse_csv(bytes: &[u8], model: &DataModel) -> Result<ParsedRows, OinoError> {
    let text = String::from_utf8_lossy(bytes);
    let mut rows_raw = scan_csv(&text);
    if rows_raw.is_empty() {
        return Ok(ParsedRows { rows: Vec::new(), messages: Vec::new() });
    }
    let header: Vec<String> = rows_raw.remove(0).into_iter().map(|t| t.text).collect();
    let column_fields: Vec<Option<usize>> = header.iter().map(|name| model.find_field_index_by_name(name)).collect();

    let mut rows = Vec::new();
    let mut messages = Vec::new();
    for raw_row in rows_raw {
        let mut row = empty_row(model);
        for (i, token) in raw_row.into_iter().enumerate() {
            let Some(Some(idx)) = column_fields.get(i) else { continue };
            let field = &model.fields()[*idx];
            row[*idx] = if !token.quoted && token.text.is_empty() {
                Cell::Absent
            } else if !token.quoted && token.text == "null" {
                Cell::Null
            } else {
                field.deserialize_cell_value(&token.text, ContentType::Csv)?
            };
        }
        if is_row_empty(&row) {
            messages.push(Message::warning("skipped an empty row"));
            continue;
        }
        rows.push(row);
    }
    Ok(ParsedRows { rows, messages })
}

// ── multipart/form-data ──────────────────────────────────────────────────

fn disposition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"name="([^"]+)"(?:;\s*filename="([^"]*)")?"#).unwrap())
}

fn parse_multipart(bytes: &[u8], boundary: &str, model: &DataModel) -> Result<ParsedRows, OinoError> {
    let text = String::from_utf8_lossy(bytes);
    let delimiter = format!("--{boundary}");
    let mut row = empty_row(model);

    for part in text.split(&delimiter) {
        let part = part.trim_start_matches("\r\n").trim_end_matches("\r\n");
        if part.is_empty() || part == "--" {
            continue;
        }
        let Some(header_end) = part.find("\r\n\r\n") else { continue };
        let (headers_block, body) = part.split_at(header_end);
        let body = body.trim_start_matches("\r\n\r\n").trim_end_matches("\r\n");

        let mut name = None;
        let mut transfer_encoding = None;
        for header_line in headers_block.split("\r\n") {
            let Some((key, val)) = header_line.split_once(':') else { continue };
            let key = key.trim().to_ascii_lowercase();
            let val = val.trim();
            match key.as_str() {
                "content-disposition" => {
                    if let Some(caps) = disposition_re().captures(val) {
                        name = Some(caps[1].to_string());
                    }
                }
                "content-transfer-encoding" => transfer_encoding = Some(val.to_ascii_uppercase()),
                "content-type" if val.eq_ignore_ascii_case("multipart/mixed") => {
                    return Err(OinoError::request_shape("multipart/mixed parts are not supported"));
                }
                _ => {}
            }
        }

        if let Some(encoding) = &transfer_encoding {
            if encoding != "BASE64" {
                return Err(OinoError::request_shape(format!("unsupported content-transfer-encoding '{encoding}'")));
            }
        }

        let Some(name) = name else { continue };
        let Some(idx) = model.find_field_index_by_name(&name) else { continue };
        let field = &model.fields()[idx];

        // A declared BASE64 transfer encoding just confirms the body text is
        // already the base64 form `deserialize_cell_value` expects for blob
        // fields; no separate decode step is needed here.
        if body.is_empty() {
            continue;
        }
        row[idx] = field.deserialize_cell_value(body, ContentType::FormData)?;
    }

    let mut messages = Vec::new();
    let rows = if is_row_empty(&row) {
        messages.push(Message::warning("skipped an empty row"));
        Vec::new()
    } else {
        vec![row]
    };
    Ok(ParsedRows { rows, messages })
}

// ── urlencoded ───────────────────────────────────────────────────────────

fn parse_urlencode(bytes: &[u8], model: &DataModel) -> Result<ParsedRows, OinoError> {
    let text = String::from_utf8_lossy(bytes);
    let mut row = empty_row(model);

    for pair in text.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (raw_name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = codec::decode(raw_name, ContentType::UrlEncode)?;
        let Some(idx) = model.find_field_index_by_name(&name) else { continue };
        if raw_value.is_empty() {
            continue;
        }
        let field = &model.fields()[idx];
        row[idx] = field.deserialize_cell_value(raw_value, ContentType::UrlEncode)?;
    }

    let mut messages = Vec::new();
    let rows = if is_row_empty(&row) {
        messages.push(Message::warning("skipped an empty row"));
        Vec::new()
    } else {
        vec![row]
    };
    Ok(ParsedRows { rows, messages })
}
