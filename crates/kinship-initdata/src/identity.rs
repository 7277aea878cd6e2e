use serde::{Deserialize, Serialize};

use crate::error::InitDataError;

/// The platform user embedded in init-data. All fields are untrusted display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_premium: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allows_write_to_pm: Option<bool>,
}

pub fn parse_user(decoded: Option<&str>) -> Result<TelegramUser, InitDataError> {
    let json = decoded.ok_or(InitDataError::InvalidUserPayload)?;
    serde_json::from_str(json).map_err(|_| InitDataError::InvalidUserPayload)
}
