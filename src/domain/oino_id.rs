//! OinoId — the synthetic composite primary-key token prepended to every
//! serialized row. Built from percent-encoded key segments so it survives
//! being embedded in a URL path, and round-trips exactly back to the
//! original segment values.

use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};

use crate::domain::error::OinoError;

pub const DEFAULT_FIELD_NAME: &str = "_OINOID_";
pub const DEFAULT_SEPARATOR: char = '_';

/// Join primary-key segments (already stringified, in model order) into one
/// OinoId token. Any literal occurrence of `separator` inside a segment is
/// escaped to its percent-encoded form so splitting on `separator` later is
/// unambiguous.
pub fn encode(segments: &[String], separator: char) -> String {
    segments
        .iter()
        .map(|s| encode_segment(s, separator))
        .collect::<Vec<_>>()
        .join(&separator.to_string())
}

fn encode_segment(segment: &str, separator: char) -> String {
    let escaped = utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string();
    // NON_ALPHANUMERIC already escapes any non-alphanumeric byte, including
    // `separator` when it isn't alphanumeric itself. Cover the case where a
    // caller configures an alphanumeric separator too.
    if separator.is_ascii_alphanumeric() {
        let sep_escaped = percent_escape_char(separator);
        escaped.replace(separator, &sep_escaped)
    } else {
        escaped
    }
}

fn percent_escape_char(c: char) -> String {
    let mut buf = [0u8; 4];
    let bytes = c.encode_utf8(&mut buf).as_bytes();
    bytes.iter().map(|b| format!("%{:02X}", b)).collect()
}

/// Split `token` back into its percent-decoded segments. Fails with a
/// request-shape error on invalid percent-encoding — callers must never
/// silently recover a partially-decoded id.
pub fn decode(token: &str, separator: char) -> Result<Vec<String>, OinoError> {
    token
        .split(separator)
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8()
                .map(|s| s.into_owned())
                .map_err(|e| OinoError::request_shape(format!("malformed OinoId segment: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_segment_round_trips() {
        let encoded = encode(&["42".to_string()], DEFAULT_SEPARATOR);
        assert_eq!(decode(&encoded, DEFAULT_SEPARATOR).unwrap(), vec!["42".to_string()]);
    }

    #[test]
    fn composite_key_round_trips() {
        let segments = vec!["acme".to_string(), "2024".to_string()];
        let encoded = encode(&segments, DEFAULT_SEPARATOR);
        assert_eq!(encoded, "acme_2024");
        assert_eq!(decode(&encoded, DEFAULT_SEPARATOR).unwrap(), segments);
    }

    #[test]
    fn literal_separator_inside_segment_is_escaped() {
        let segments = vec!["a_b".to_string(), "c".to_string()];
        let encoded = encode(&segments, DEFAULT_SEPARATOR);
        assert_eq!(encoded, "a%5Fb_c");
        assert_eq!(decode(&encoded, DEFAULT_SEPARATOR).unwrap(), segments);
    }

    #[test]
    fn configurable_separator_is_honored() {
        let segments = vec!["x".to_string(), "y".to_string()];
        let encoded = encode(&segments, '-');
        assert_eq!(encoded, "x-y");
        assert_eq!(decode(&encoded, '-').unwrap(), segments);
    }

    #[test]
    fn invalid_utf8_after_percent_decode_is_rejected() {
        assert!(decode("%ff", DEFAULT_SEPARATOR).is_err());
    }
}
