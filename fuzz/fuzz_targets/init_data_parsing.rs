#![no_main]

use std::sync::OnceLock;

use kinship_initdata::{BotCredential, InitDataParams, InitDataVerifier, VerifierConfig};
use libfuzzer_sys::fuzz_target;

fn verifier() -> Option<&'static InitDataVerifier> {
    static VERIFIER: OnceLock<Option<InitDataVerifier>> = OnceLock::new();
    VERIFIER
        .get_or_init(|| {
            let credential = BotCredential::parse("123456:ABC-DEF").ok()?;
            Some(InitDataVerifier::new(VerifierConfig::new(credential)))
        })
        .as_ref()
}

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);

    let params = InitDataParams::parse(&s);
    let _ = params.data_check_string();
    let _ = params.hash();

    if let Some(v) = verifier() {
        let _ = v.verify(&s, 1_700_000_000);
        let _ = v.diagnose(&s);
    }
});
