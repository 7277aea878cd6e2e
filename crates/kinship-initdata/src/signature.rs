use hmac::{Hmac, Mac};
use sha2::{Digest as _, Sha256};
use subtle::ConstantTimeEq as _;
use zeroize::Zeroizing;

use crate::credential::BotCredential;
use crate::error::InitDataError;
use crate::params::InitDataParams;

type HmacSha256 = Hmac<Sha256>;

/// Constant prepended to the credential before hashing it into the signing key.
pub const SECRET_KEY_PREFIX: &[u8] = b"WebAppData";

/// `SHA-256("WebAppData" || credential)`, raw bytes.
pub fn derive_secret_key(credential: &BotCredential) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(SECRET_KEY_PREFIX);
    hasher.update(credential.expose().as_bytes());
    hasher.finalize().into()
}

/// Computes and checks init-data signatures with a key derived once from the credential.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret_key: Zeroizing<[u8; 32]>,
}

/// Everything needed to debug a signature mismatch locally. Never send this to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDiagnostics {
    pub data_check_string: String,
    pub expected_hash: String,
    pub received_hash: Option<String>,
}

impl SignatureVerifier {
    pub fn new(credential: &BotCredential) -> Self {
        Self {
            secret_key: Zeroizing::new(derive_secret_key(credential)),
        }
    }

    /// Lowercase hex `HMAC-SHA256(secret_key, data_check_string)`.
    pub fn compute_hash(&self, data_check_string: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_slice())
            .expect("hmac accepts keys of any length");
        mac.update(data_check_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn verify(&self, data_check_string: &str, candidate: &str) -> Result<(), InitDataError> {
        let expected = self.compute_hash(data_check_string);
        if expected.as_bytes().ct_eq(candidate.as_bytes()).into() {
            Ok(())
        } else {
            Err(InitDataError::InvalidSignature)
        }
    }

    pub fn diagnose(&self, params: &InitDataParams) -> SignatureDiagnostics {
        let data_check_string = params.data_check_string();
        let expected_hash = self.compute_hash(&data_check_string);
        SignatureDiagnostics {
            data_check_string,
            expected_hash,
            received_hash: params.hash().ok().map(str::to_string),
        }
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}
