//! ApiResult — the single outcome type returned by every `Api::run` call,
//! GET through DELETE alike.

use crate::application::modelset::ModelSet;
use crate::domain::error::{Message, OinoError};

pub struct ApiResult<'a> {
    pub success: bool,
    pub status_code: u16,
    pub status_message: String,
    pub model_set: Option<ModelSet<'a>>,
    pub messages: Vec<Message>,
}

impl<'a> ApiResult<'a> {
    pub fn ok(model_set: Option<ModelSet<'a>>, messages: Vec<Message>) -> Self {
        ApiResult { success: true, status_code: 200, status_message: "OK".to_string(), model_set, messages }
    }

    pub fn ok_with_status(status_code: u16, status_message: impl Into<String>, messages: Vec<Message>) -> Self {
        ApiResult { success: true, status_code, status_message: status_message.into(), model_set: None, messages }
    }

    pub fn from_error(err: &OinoError) -> Self {
        ApiResult {
            success: false,
            status_code: err.status_code(),
            status_message: err.to_string(),
            model_set: None,
            messages: vec![Message::from(err)],
        }
    }
}
