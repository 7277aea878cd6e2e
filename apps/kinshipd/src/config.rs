use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use kinship_initdata::freshness::DEFAULT_MAX_FUTURE_SKEW_SECS;
use kinship_initdata::{BotCredential, FreshnessPolicy, VerifierConfig};

const DEFAULT_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;
const MIN_SESSION_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DeployEnv {
    Production,
    Development,
}

#[derive(Clone, Parser)]
#[command(
    name = "kinshipd",
    version,
    about = "Kinship mini-app login daemon"
)]
pub struct Args {
    /// Address to bind.
    #[arg(long, env = "KINSHIP_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: SocketAddr,

    /// Directory for runtime state (sqlite db). Defaults to the platform data dir.
    #[arg(long, env = "KINSHIP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Bot credential issued by the platform, `<digits>:<token>`.
    #[arg(long, env = "KINSHIP_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,

    /// HMAC secret for session tokens (at least 32 bytes).
    #[arg(long, env = "KINSHIP_SESSION_SECRET", hide_env_values = true)]
    pub session_secret: String,

    #[arg(long, env = "KINSHIP_SESSION_TTL_SECS", default_value_t = DEFAULT_SESSION_TTL_SECS)]
    pub session_ttl_secs: i64,

    #[arg(long, env = "KINSHIP_ENV", value_enum, default_value_t = DeployEnv::Production)]
    pub env: DeployEnv,

    /// Log signature diagnostics (data-check-string, expected and received hash) at debug level.
    #[arg(long, env = "KINSHIP_DEBUG_AUTH", default_value_t = false)]
    pub debug_auth: bool,

    /// Accept init-data of any age. Refused in production.
    #[arg(long, env = "KINSHIP_SKIP_FRESHNESS_CHECK", default_value_t = false)]
    pub skip_freshness_check: bool,

    /// Accept the development bypass hash instead of a signature. Refused in production.
    #[arg(long, env = "KINSHIP_ALLOW_INSECURE_TEST_BYPASS", default_value_t = false)]
    pub allow_insecure_test_bypass: bool,

    /// How far in the future `auth_date` may be. `0` disables the check.
    #[arg(long, env = "KINSHIP_MAX_FUTURE_SKEW_SECS", default_value_t = DEFAULT_MAX_FUTURE_SKEW_SECS)]
    pub max_future_skew_secs: i64,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("addr", &self.addr)
            .field("data_dir", &self.data_dir)
            .field("env", &self.env)
            .field("debug_auth", &self.debug_auth)
            .field("skip_freshness_check", &self.skip_freshness_check)
            .field("allow_insecure_test_bypass", &self.allow_insecure_test_bypass)
            .finish_non_exhaustive()
    }
}

/// Validated runtime configuration, built once at startup.
#[derive(Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub data_dir: Option<PathBuf>,
    pub env: DeployEnv,
    pub debug_auth: bool,
    pub verifier: VerifierConfig,
    pub session_secret: Vec<u8>,
    pub session_ttl: chrono::Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("data_dir", &self.data_dir)
            .field("env", &self.env)
            .field("debug_auth", &self.debug_auth)
            .field("verifier", &self.verifier)
            .field("session_ttl", &self.session_ttl)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        let credential = BotCredential::parse(&args.bot_token)
            .context("KINSHIP_BOT_TOKEN must look like <digits>:<token>")?;

        if args.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            anyhow::bail!(
                "KINSHIP_SESSION_SECRET must be at least {MIN_SESSION_SECRET_BYTES} bytes"
            );
        }
        if args.session_ttl_secs <= 0 {
            anyhow::bail!("KINSHIP_SESSION_TTL_SECS must be positive");
        }
        if args.max_future_skew_secs < 0 {
            anyhow::bail!("KINSHIP_MAX_FUTURE_SKEW_SECS must not be negative");
        }

        if args.env == DeployEnv::Production {
            if args.allow_insecure_test_bypass {
                anyhow::bail!("KINSHIP_ALLOW_INSECURE_TEST_BYPASS is refused in production");
            }
            if args.skip_freshness_check {
                anyhow::bail!("KINSHIP_SKIP_FRESHNESS_CHECK is refused in production");
            }
        }

        let freshness = FreshnessPolicy {
            max_future_skew_secs: (args.max_future_skew_secs > 0)
                .then_some(args.max_future_skew_secs),
            skip: args.skip_freshness_check,
            ..FreshnessPolicy::default()
        };

        Ok(Self {
            addr: args.addr,
            data_dir: args.data_dir,
            env: args.env,
            debug_auth: args.debug_auth,
            verifier: VerifierConfig {
                credential,
                freshness,
                allow_insecure_test_bypass: args.allow_insecure_test_bypass,
            },
            session_secret: args.session_secret.into_bytes(),
            session_ttl: chrono::Duration::seconds(args.session_ttl_secs),
        })
    }
}
