//! Development bypass: a sentinel hash that skips signature and freshness checks.
//!
//! Only honoured by an [`crate::InitDataVerifier`] built with
//! `allow_insecure_test_bypass = true`. Otherwise the sentinel is an ordinary wrong hash.

use crate::identity::{TelegramUser, parse_user};
use crate::params::{InitDataParams, USER_KEY};

pub const DEV_BYPASS_HASH: &str = "dev_bypass_insecure_test_hash";

pub fn is_bypass_hash(hash: &str) -> bool {
    hash == DEV_BYPASS_HASH
}

/// Identity used when a bypass payload carries no usable `user`.
pub fn dev_fallback_user() -> TelegramUser {
    TelegramUser {
        id: 100_000_001,
        first_name: "Dev".to_string(),
        last_name: Some("User".to_string()),
        username: Some("kinship_dev".to_string()),
        photo_url: None,
        language_code: Some("en".to_string()),
        is_premium: Some(false),
        allows_write_to_pm: Some(true),
    }
}

pub(crate) fn bypass_identity(params: &InitDataParams) -> TelegramUser {
    parse_user(params.decoded(USER_KEY)).unwrap_or_else(|_| dev_fallback_user())
}
