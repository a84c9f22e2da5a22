//! StringCodec — content-type-aware encode/decode of scalar cell text, plus
//! the bracket-aware splitters the sql_params sublanguage parser is built
//! on. Pure functions only; no I/O.

use crate::domain::error::OinoError;
use crate::domain::field::FieldKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Csv,
    FormData,
    UrlEncode,
    Html,
}

impl ContentType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        let base = mime.split(';').next().unwrap_or("").trim();
        match base {
            "application/json" => Some(ContentType::Json),
            "text/csv" => Some(ContentType::Csv),
            "multipart/form-data" => Some(ContentType::FormData),
            "application/x-www-form-urlencoded" => Some(ContentType::UrlEncode),
            "text/html" => Some(ContentType::Html),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Csv => "text/csv",
            ContentType::FormData => "multipart/form-data",
            ContentType::UrlEncode => "application/x-www-form-urlencoded",
            ContentType::Html => "text/html",
        }
    }
}

/// The token representing SQL NULL in each content type's wire format.
pub fn encode_null(content_type: ContentType) -> String {
    match content_type {
        ContentType::Json => "null".to_string(),
        ContentType::Csv => "null".to_string(),
        ContentType::FormData | ContentType::UrlEncode => String::new(),
        ContentType::Html => "null".to_string(),
    }
}

/// Whether `raw` (already unquoted/unescaped at the framing layer) is the
/// content-type's null token. CSV and JSON use the unquoted bareword
/// `null`; an empty unquoted token means "absent", not "null" — the caller
/// (the Parser) is responsible for distinguishing "field missing" (absent,
/// `text == None`) from "field present but empty" before calling this.
pub fn is_null_token(raw: &str, content_type: ContentType) -> bool {
    match content_type {
        ContentType::Json | ContentType::Csv | ContentType::Html => raw == "null",
        ContentType::FormData | ContentType::UrlEncode => false,
    }
}

/// Encode a cell's canonical-form payload (already stringified by the
/// `Field`) into the wire representation for `content_type`. `kind` picks
/// the per-variant quoting rule (e.g. booleans/numbers unquoted in JSON).
pub fn encode(value: &str, content_type: ContentType, kind: FieldKind) -> String {
    match content_type {
        ContentType::Json => encode_json(value, kind),
        ContentType::Csv => encode_csv(value),
        ContentType::FormData | ContentType::UrlEncode => encode_urlencode(value),
        ContentType::Html => encode_html(value),
    }
}

fn encode_json(value: &str, kind: FieldKind) -> String {
    match kind {
        FieldKind::Boolean | FieldKind::Number => value.to_string(),
        _ => json_quote(value),
    }
}

fn json_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn encode_csv(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn encode_urlencode(value: &str) -> String {
    use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string().replace("%20", "+")
}

fn encode_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Decode a single wire-format textual value (framing/quoting already
/// stripped by the caller) back into the cell's canonical text.
pub fn decode(raw: &str, content_type: ContentType) -> Result<String, OinoError> {
    match content_type {
        ContentType::Json => Ok(json_unescape(raw)),
        ContentType::Csv => Ok(raw.to_string()),
        ContentType::FormData | ContentType::UrlEncode => decode_urlencode(raw),
        ContentType::Html => Err(OinoError::request_shape("html is output-only and cannot be decoded")),
    }
}

fn json_unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Ok(code) = u32::from_str_radix(&hex, 16) {
                    if let Some(c) = char::from_u32(code) {
                        out.push(c);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn decode_urlencode(raw: &str) -> Result<String, OinoError> {
    let plus_replaced = raw.replace('+', " ");
    percent_encoding::percent_decode_str(&plus_replaced)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| OinoError::request_shape(format!("invalid percent-encoding: {e}")))
}

// ── Bracket-aware splitters ─────────────────────────────────────────────

/// Split `s` into the top-level blocks delimited by `open`/`close`
/// (bracket-depth accurate, not regex). When `keep_between` is set, the
/// unbracketed text between blocks is also returned as its own segment.
/// When `keep_trailing_open` is set, a final unterminated block (depth
/// never returns to zero) is returned as its own trailing segment instead
/// of being silently dropped.
pub fn split_by_brackets(s: &str, keep_between: bool, keep_trailing_open: bool, open: char, close: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth: i32 = 0;
    let mut current = String::new();
    let mut between = String::new();
    let mut in_block = false;

    for c in s.chars() {
        if c == open {
            if depth == 0 {
                if keep_between && !between.is_empty() {
                    out.push(between.clone());
                    between.clear();
                }
                in_block = true;
                current.clear();
            } else {
                current.push(c);
            }
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                out.push(current.clone());
                current.clear();
                in_block = false;
            } else if depth > 0 {
                current.push(c);
            } else {
                // unbalanced closer; treat as literal text
                depth = 0;
                current.push(c);
            }
        } else if in_block {
            current.push(c);
        } else if keep_between {
            between.push(c);
        }
    }

    if keep_trailing_open && in_block {
        out.push(current);
    } else if keep_between && !between.is_empty() {
        out.push(between);
    }

    out
}

/// Split `s` on `delim` but only where bracket depth (tracked via
/// `open`/`close`) is zero.
pub fn split_excluding_brackets(s: &str, delim: &str, open: char, close: char) -> Vec<String> {
    if delim.is_empty() {
        return vec![s.to_string()];
    }
    let mut out = Vec::new();
    let mut depth: i32 = 0;
    let mut current = String::new();
    let chars: Vec<char> = s.chars().collect();
    let delim_chars: Vec<char> = delim.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == open {
            depth += 1;
            current.push(c);
            i += 1;
            continue;
        }
        if c == close {
            depth = (depth - 1).max(0);
            current.push(c);
            i += 1;
            continue;
        }
        if depth == 0 && chars[i..].starts_with(&delim_chars[..]) {
            out.push(current.clone());
            current.clear();
            i += delim_chars.len();
            continue;
        }
        current.push(c);
        i += 1;
    }
    out.push(current);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_bool_and_number_unquoted() {
        assert_eq!(encode("true", ContentType::Json, FieldKind::Boolean), "true");
        assert_eq!(encode("12.5", ContentType::Json, FieldKind::Number), "12.5");
    }

    #[test]
    fn json_string_quoted_with_escapes() {
        assert_eq!(encode("a\"b", ContentType::Json, FieldKind::String), "\"a\\\"b\"");
    }

    #[test]
    fn csv_doubles_internal_quotes() {
        assert_eq!(encode_csv("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn csv_null_is_unquoted_bareword() {
        assert!(is_null_token("null", ContentType::Csv));
        assert!(!is_null_token("\"null\"", ContentType::Csv));
    }

    #[test]
    fn urlencode_uses_plus_for_space() {
        assert_eq!(encode_urlencode("a b"), "a+b");
    }

    #[test]
    fn urlencode_round_trips() {
        let encoded = encode_urlencode("a b&c=d");
        let decoded = decode_urlencode(&encoded).unwrap();
        assert_eq!(decoded, "a b&c=d");
    }

    #[test]
    fn html_escapes_five_entities() {
        assert_eq!(encode_html("&<>\"'"), "&amp;&lt;&gt;&quot;&#39;");
    }

    #[test]
    fn split_by_brackets_basic() {
        let blocks = split_by_brackets("(a)(b)(c)", false, false, '(', ')');
        assert_eq!(blocks, vec!["a", "b", "c"]);
    }

    #[test]
    fn split_by_brackets_nested() {
        let blocks = split_by_brackets("(a(b)c)", false, false, '(', ')');
        assert_eq!(blocks, vec!["a(b)c"]);
    }

    #[test]
    fn split_by_brackets_keep_between() {
        let blocks = split_by_brackets("(a)-and-(b)", true, false, '(', ')');
        assert_eq!(blocks, vec!["a", "-and-", "b"]);
    }

    #[test]
    fn split_by_brackets_trailing_open() {
        let blocks = split_by_brackets("(a)(unterminated", false, true, '(', ')');
        assert_eq!(blocks, vec!["a", "unterminated"]);
    }

    #[test]
    fn split_excluding_brackets_respects_depth() {
        let parts = split_excluding_brackets("(a)-and-(b-or-c)", "-and-", '(', ')');
        assert_eq!(parts, vec!["(a)", "(b-or-c)"]);
    }

    #[test]
    fn split_excluding_brackets_no_match_returns_whole() {
        let parts = split_excluding_brackets("(a-and-b)", "-and-", '(', ')');
        assert_eq!(parts, vec!["(a-and-b)"]);
    }
}
