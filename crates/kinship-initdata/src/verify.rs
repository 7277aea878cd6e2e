use crate::bypass::{bypass_identity, is_bypass_hash};
use crate::credential::BotCredential;
use crate::error::InitDataError;
use crate::freshness::{FreshnessPolicy, parse_auth_date};
use crate::identity::{TelegramUser, parse_user};
use crate::params::{AUTH_DATE_KEY, InitDataParams, QUERY_ID_KEY, USER_KEY};
use crate::signature::{SignatureDiagnostics, SignatureVerifier};

/// Everything the verifier needs, built once at startup.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub credential: BotCredential,
    pub freshness: FreshnessPolicy,
    /// Accept [`crate::DEV_BYPASS_HASH`] in place of a signature. Never enable in production.
    pub allow_insecure_test_bypass: bool,
}

impl VerifierConfig {
    pub fn new(credential: BotCredential) -> Self {
        Self {
            credential,
            freshness: FreshnessPolicy::default(),
            allow_insecure_test_bypass: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedInitData {
    pub user: TelegramUser,
    /// Absent only when the bypass produced this result.
    pub auth_date: Option<i64>,
    pub query_id: Option<String>,
    pub via_bypass: bool,
}

/// Verifies init-data payloads. Holds no mutable state and is safe to share between tasks.
#[derive(Debug, Clone)]
pub struct InitDataVerifier {
    signature: SignatureVerifier,
    freshness: FreshnessPolicy,
    allow_insecure_test_bypass: bool,
}

impl InitDataVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            signature: SignatureVerifier::new(&config.credential),
            freshness: config.freshness,
            allow_insecure_test_bypass: config.allow_insecure_test_bypass,
        }
    }

    pub fn bypass_enabled(&self) -> bool {
        self.allow_insecure_test_bypass
    }

    pub fn freshness(&self) -> &FreshnessPolicy {
        &self.freshness
    }

    pub fn verify(&self, init_data: &str, now_unix: i64) -> Result<VerifiedInitData, InitDataError> {
        let params = InitDataParams::parse(init_data);
        self.verify_params(&params, now_unix)
    }

    pub fn verify_params(
        &self,
        params: &InitDataParams,
        now_unix: i64,
    ) -> Result<VerifiedInitData, InitDataError> {
        let hash = params.hash()?;
        let query_id = params.decoded(QUERY_ID_KEY).map(str::to_string);

        if self.allow_insecure_test_bypass && is_bypass_hash(hash) {
            return Ok(VerifiedInitData {
                user: bypass_identity(params),
                auth_date: parse_auth_date(params.decoded(AUTH_DATE_KEY)).ok(),
                query_id,
                via_bypass: true,
            });
        }

        self.signature.verify(&params.data_check_string(), hash)?;

        let auth_date = parse_auth_date(params.decoded(AUTH_DATE_KEY))?;
        self.freshness.check(auth_date, now_unix)?;

        let user = parse_user(params.decoded(USER_KEY))?;

        Ok(VerifiedInitData {
            user,
            auth_date: Some(auth_date),
            query_id,
            via_bypass: false,
        })
    }

    /// Recompute the expected signature for local debug logging. `None` if the payload has no
    /// hash to compare against.
    pub fn diagnose(&self, init_data: &str) -> Option<SignatureDiagnostics> {
        let params = InitDataParams::parse(init_data);
        params.hash().ok()?;
        Some(self.signature.diagnose(&params))
    }
}
