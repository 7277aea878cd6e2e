use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;

use crate::canonical::data_check_string;
use crate::error::InitDataError;

pub const HASH_KEY: &str = "hash";
pub const AUTH_DATE_KEY: &str = "auth_date";
pub const QUERY_ID_KEY: &str = "query_id";
pub const USER_KEY: &str = "user";

/// Parameters whose decoded form is ever interpreted.
const DECODED_KEYS: [&str; 3] = [AUTH_DATE_KEY, QUERY_ID_KEY, USER_KEY];

/// A parsed init-data payload.
///
/// Raw values are kept exactly as received (still percent-encoded) because the signature is
/// computed over them. Decoded values exist only for the keys the pipeline interprets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitDataParams {
    raw: BTreeMap<String, String>,
    decoded: BTreeMap<&'static str, String>,
}

impl InitDataParams {
    /// Parse a query-string shaped payload. Never fails; a repeated key keeps its last value.
    pub fn parse(init_data: &str) -> Self {
        let query = init_data.strip_prefix('?').unwrap_or(init_data);

        let mut raw = BTreeMap::new();
        for segment in query.split('&') {
            if segment.is_empty() {
                continue;
            }
            // Only the first `=` separates; values may contain more.
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            raw.insert(key.to_string(), value.to_string());
        }

        let decoded = DECODED_KEYS
            .iter()
            .filter_map(|key| {
                raw.get(*key)
                    .map(|value: &String| (*key, decode_component_or_raw(value)))
            })
            .collect();

        Self { raw, decoded }
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.raw.get(key).map(String::as_str)
    }

    /// Decoded value for `auth_date`, `query_id` or `user`; `None` for any other key.
    pub fn decoded(&self, key: &str) -> Option<&str> {
        self.decoded.get(key).map(String::as_str)
    }

    /// The declared signature, taken from the raw mapping.
    pub fn hash(&self) -> Result<&str, InitDataError> {
        self.raw(HASH_KEY).ok_or(InitDataError::MissingHash)
    }

    /// Every raw pair except `hash`, in key order.
    pub fn signed_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.raw
            .iter()
            .filter(|(k, _)| k.as_str() != HASH_KEY)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn data_check_string(&self) -> String {
        data_check_string(self.signed_pairs())
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// `decodeURIComponent` semantics: `+` stays `+`, and a malformed escape or invalid UTF-8
/// leaves the value untouched.
fn decode_component_or_raw(value: &str) -> String {
    if !has_well_formed_escapes(value) {
        return value.to_string();
    }
    match percent_decode_str(value).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => value.to_string(),
    }
}

fn has_well_formed_escapes(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit);
            let lo = bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
            if !(hi && lo) {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_equals_only() {
        let p = InitDataParams::parse("a=b=c&hash=ff");
        assert_eq!(p.raw("a"), Some("b=c"));
        assert_eq!(p.hash(), Ok("ff"));
    }

    #[test]
    fn leading_question_mark_is_ignored() {
        let p = InitDataParams::parse("?auth_date=1&hash=00");
        assert_eq!(p.raw("auth_date"), Some("1"));
        assert_eq!(p.raw("?auth_date"), None);
    }

    #[test]
    fn segment_without_equals_has_empty_value() {
        let p = InitDataParams::parse("flag&hash=00");
        assert_eq!(p.raw("flag"), Some(""));
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn repeated_key_keeps_last_value() {
        let p = InitDataParams::parse("query_id=a&query_id=b&hash=00");
        assert_eq!(p.raw("query_id"), Some("b"));
        assert_eq!(p.decoded("query_id"), Some("b"));
    }

    #[test]
    fn decodes_only_allow_listed_keys() {
        let p = InitDataParams::parse("user=%7B%7D&chat_type=%73ender&hash=00");
        assert_eq!(p.decoded("user"), Some("{}"));
        assert_eq!(p.raw("user"), Some("%7B%7D"));
        assert_eq!(p.decoded("chat_type"), None);
        assert_eq!(p.raw("chat_type"), Some("%73ender"));
    }

    #[test]
    fn plus_is_not_a_space() {
        let p = InitDataParams::parse("query_id=a+b&hash=00");
        assert_eq!(p.decoded("query_id"), Some("a+b"));
    }

    #[test]
    fn malformed_escape_falls_back_to_raw() {
        let p = InitDataParams::parse("user=%7B%zz&query_id=%FF%FE&hash=00");
        assert_eq!(p.decoded("user"), Some("%7B%zz"));
        // Well-formed escapes that are not UTF-8.
        assert_eq!(p.decoded("query_id"), Some("%FF%FE"));
    }

    #[test]
    fn missing_hash_is_reported() {
        let p = InitDataParams::parse("auth_date=1&user=%7B%7D");
        assert_eq!(p.hash(), Err(InitDataError::MissingHash));

        let empty = InitDataParams::parse("");
        assert!(empty.is_empty());
        assert_eq!(empty.hash(), Err(InitDataError::MissingHash));
    }

    #[test]
    fn signed_pairs_exclude_hash() {
        let p = InitDataParams::parse("b=2&hash=00&a=1");
        let pairs: Vec<_> = p.signed_pairs().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "2")]);
    }
}
