use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::canonical::data_check_string;
use crate::credential::BotCredential;
use crate::params::HASH_KEY;
use crate::signature::SignatureVerifier;

/// Characters `encodeURIComponent` escapes: everything but `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Produce a signed init-data payload the way the platform does.
///
/// Values are given decoded and are percent-encoded here; keys are used as-is. A `hash` entry
/// in `pairs` is ignored. Pairs keep their input order in the output, `hash` comes last.
pub fn sign_init_data<'a, I>(credential: &BotCredential, pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let encoded: Vec<(&str, String)> = pairs
        .into_iter()
        .filter(|(k, _)| *k != HASH_KEY)
        .map(|(k, v)| (k, encode_component(v)))
        .collect();

    let dcs = data_check_string(encoded.iter().map(|(k, v)| (*k, v.as_str())));
    let hash = SignatureVerifier::new(credential).compute_hash(&dcs);

    let mut out = String::new();
    for (k, v) in &encoded {
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push('&');
    }
    out.push_str(HASH_KEY);
    out.push('=');
    out.push_str(&hash);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_like_encode_uri_component() {
        assert_eq!(
            encode_component(r#"{"id":1,"first_name":"A"}"#),
            "%7B%22id%22%3A1%2C%22first_name%22%3A%22A%22%7D"
        );
        assert_eq!(encode_component("a b+c/d"), "a%20b%2Bc%2Fd");
        assert_eq!(encode_component("-_.!~*'()"), "-_.!~*'()");
        assert_eq!(encode_component("é"), "%C3%A9");
    }

    #[test]
    fn produces_reference_payload() {
        let c = BotCredential::parse("123456:ABC-DEF").unwrap();
        let payload = sign_init_data(
            &c,
            [
                ("auth_date", "1700000000"),
                ("user", r#"{"id":1,"first_name":"A"}"#),
            ],
        );
        assert_eq!(
            payload,
            "auth_date=1700000000\
             &user=%7B%22id%22%3A1%2C%22first_name%22%3A%22A%22%7D\
             &hash=8907cfcdbebb5b9f9d8b9c6809a8741ce2c296327bcfcef5575daba2e47f0e07"
        );
    }

    #[test]
    fn caller_supplied_hash_is_replaced() {
        let c = BotCredential::parse("1:x").unwrap();
        let payload = sign_init_data(&c, [("hash", "ff"), ("a", "1")]);
        assert!(payload.starts_with("a=1&hash="));
        assert_eq!(payload.matches("hash=").count(), 1);
    }
}
