use thiserror::Error;

/// The HTTP-aligned error taxonomy shared by every layer of the gateway.
///
/// Every public entry point returns `Result<_, OinoError>` so the
/// orchestration layer (`Api::run`) can translate a failure directly into
/// a status code without re-classifying it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OinoError {
    /// 400 — malformed request: missing/extra id, wrong row count, an
    /// unparseable filter/order/limit/aggregate/select expression, or an
    /// id segment that does not decode.
    #[error("{0}")]
    RequestShape(String),

    /// 405 — the request was well-formed but violates a column constraint:
    /// null where forbidden, missing required primary key, an autoinc
    /// write the policy forbids, or an oversized value under a strict
    /// policy.
    #[error("{0}")]
    Validation(String),

    /// 500 — a dialect/backend failure: not connected, not validated,
    /// a native driver error, or any other unexpected failure.
    #[error("{0}")]
    Backend(String),
}

impl OinoError {
    pub fn status_code(&self) -> u16 {
        match self {
            OinoError::RequestShape(_) => 400,
            OinoError::Validation(_) => 405,
            OinoError::Backend(_) => 500,
        }
    }

    pub fn request_shape(msg: impl Into<String>) -> Self {
        OinoError::RequestShape(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        OinoError::Validation(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        OinoError::Backend(msg.into())
    }
}

/// Classified log/result message, carrying one of the four fixed prefixes
/// the host uses to route messages to `X-OINO-MESSAGE-N` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageClass {
    Error,
    Warning,
    Info,
    Debug,
}

impl MessageClass {
    fn prefix(&self) -> &'static str {
        match self {
            MessageClass::Error => "OINO ERROR:",
            MessageClass::Warning => "OINO WARNING:",
            MessageClass::Info => "OINO INFO:",
            MessageClass::Debug => "OINO DEBUG:",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub class: MessageClass,
    pub text: String,
}

impl Message {
    pub fn error(text: impl Into<String>) -> Self {
        Message { class: MessageClass::Error, text: text.into() }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Message { class: MessageClass::Warning, text: text.into() }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Message { class: MessageClass::Info, text: text.into() }
    }

    pub fn debug(text: impl Into<String>) -> Self {
        Message { class: MessageClass::Debug, text: text.into() }
    }

    /// Render with the fixed class prefix, as handed to the host for
    /// `X-OINO-MESSAGE-N` headers.
    pub fn rendered(&self) -> String {
        format!("{} {}", self.class.prefix(), self.text)
    }
}

impl From<&OinoError> for Message {
    fn from(err: &OinoError) -> Self {
        match err {
            OinoError::RequestShape(m) | OinoError::Validation(m) | OinoError::Backend(m) => {
                Message::error(m.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(OinoError::request_shape("bad id").status_code(), 400);
        assert_eq!(OinoError::validation("null not allowed").status_code(), 405);
        assert_eq!(OinoError::backend("not connected").status_code(), 500);
    }

    #[test]
    fn message_prefixes_are_fixed() {
        assert_eq!(Message::error("x").rendered(), "OINO ERROR: x");
        assert_eq!(Message::warning("x").rendered(), "OINO WARNING: x");
        assert_eq!(Message::info("x").rendered(), "OINO INFO: x");
        assert_eq!(Message::debug("x").rendered(), "OINO DEBUG: x");
    }
}
