//! Verification of the signed launch payload ("init-data") that the chat platform hands to
//! an embedded mini-app.
//!
//! The crate is pure: no I/O, no logging, no environment access. Callers construct an
//! [`InitDataVerifier`] once from a [`VerifierConfig`] and share it across requests.

pub mod bypass;
pub mod canonical;
pub mod credential;
pub mod error;
pub mod freshness;
pub mod identity;
pub mod params;
pub mod sign;
pub mod signature;
pub mod verify;

pub use bypass::{DEV_BYPASS_HASH, dev_fallback_user};
pub use canonical::data_check_string;
pub use credential::BotCredential;
pub use error::{InitDataError, RejectionKind};
pub use freshness::FreshnessPolicy;
pub use identity::TelegramUser;
pub use params::InitDataParams;
pub use sign::{encode_component, sign_init_data};
pub use signature::{SignatureDiagnostics, SignatureVerifier};
pub use verify::{InitDataVerifier, VerifiedInitData, VerifierConfig};
