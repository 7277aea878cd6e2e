use std::io::Read as _;

use anyhow::Context as _;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use kinship_api::KinshipClient;
use kinship_initdata::{
    BotCredential, FreshnessPolicy, InitDataParams, InitDataVerifier, TelegramUser,
    VerifierConfig, sign_init_data,
};
use rand::RngCore as _;

#[derive(Debug, Parser)]
#[command(name = "kinship", version, about = "Kinship mini-app login tooling")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Produce a signed init-data payload, as the platform would hand it to the mini-app.
    Sign {
        #[arg(long, env = "KINSHIP_BOT_TOKEN", hide_env_values = true)]
        bot_token: String,
        /// User object as JSON, e.g. '{"id":1,"first_name":"A"}'.
        #[arg(long)]
        user: String,
        /// Unix seconds. Defaults to now.
        #[arg(long)]
        auth_date: Option<i64>,
        #[arg(long)]
        query_id: Option<String>,
    },
    /// Verify an init-data payload offline and print the outcome as JSON.
    Verify {
        #[arg(long, env = "KINSHIP_BOT_TOKEN", hide_env_values = true)]
        bot_token: String,
        /// The payload; `-` reads it from stdin.
        init_data: String,
        #[arg(long, default_value_t = false)]
        skip_freshness_check: bool,
        /// Include the data-check-string and both hashes on a signature mismatch.
        #[arg(long, default_value_t = false)]
        explain: bool,
    },
    /// Exchange init-data for a session token against a running daemon.
    Login {
        #[arg(long, env = "KINSHIP_BASE_URL", default_value = "http://127.0.0.1:8787")]
        base_url: String,
        /// The payload; `-` reads it from stdin.
        init_data: String,
    },
    /// Print a random session secret suitable for `KINSHIP_SESSION_SECRET`.
    GenSecret,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .json()
        .init();

    let args = Args::parse();
    let now = chrono::Utc::now().timestamp();

    match args.cmd {
        Command::Sign {
            bot_token,
            user,
            auth_date,
            query_id,
        } => {
            let credential = BotCredential::parse(&bot_token).context("parse bot token")?;
            let payload = sign_payload(
                &credential,
                &user,
                auth_date.unwrap_or(now),
                query_id.as_deref(),
            )?;
            println!("{payload}");
        }
        Command::Verify {
            bot_token,
            init_data,
            skip_freshness_check,
            explain,
        } => {
            let credential = BotCredential::parse(&bot_token).context("parse bot token")?;
            let init_data = read_payload(init_data)?;
            let report = verify_report(&credential, &init_data, now, skip_freshness_check, explain);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report["ok"] != serde_json::Value::Bool(true) {
                std::process::exit(1);
            }
        }
        Command::Login {
            base_url,
            init_data,
        } => {
            let init_data = read_payload(init_data)?;
            let client = KinshipClient::new(&base_url)?;
            let auth = client.login_with_init_data(&init_data).await?;
            tracing::info!(user_id = %auth.user.id, "logged in");
            let me = client.me(&auth.token).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "token": auth.token,
                    "expiresAt": auth.expires_at,
                    "user": me.user,
                }))?
            );
        }
        Command::GenSecret => {
            let mut bytes = [0u8; 32];
            rand::rng().fill_bytes(&mut bytes);
            println!(
                "{}",
                base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
            );
        }
    }
    Ok(())
}

fn read_payload(arg: String) -> anyhow::Result<String> {
    if arg != "-" {
        return Ok(arg);
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("read init data from stdin")?;
    Ok(buf.trim().to_string())
}

fn sign_payload(
    credential: &BotCredential,
    user_json: &str,
    auth_date: i64,
    query_id: Option<&str>,
) -> anyhow::Result<String> {
    // Reject users the daemon would refuse, and normalize the JSON.
    let user: TelegramUser = serde_json::from_str(user_json).context("parse --user json")?;
    let user = serde_json::to_string(&user)?;
    let auth_date = auth_date.to_string();

    let mut pairs = Vec::new();
    if let Some(q) = query_id {
        pairs.push(("query_id", q));
    }
    pairs.push(("user", user.as_str()));
    pairs.push(("auth_date", auth_date.as_str()));
    Ok(sign_init_data(credential, pairs))
}

fn verify_report(
    credential: &BotCredential,
    init_data: &str,
    now: i64,
    skip_freshness_check: bool,
    explain: bool,
) -> serde_json::Value {
    let mut config = VerifierConfig::new(credential.clone());
    config.freshness = FreshnessPolicy {
        skip: skip_freshness_check,
        ..FreshnessPolicy::default()
    };
    let verifier = InitDataVerifier::new(config);

    match verifier.verify(init_data, now) {
        Ok(v) => serde_json::json!({
            "ok": true,
            "user": v.user,
            "authDate": v.auth_date,
            "queryId": v.query_id,
            "params": InitDataParams::parse(init_data).len(),
        }),
        Err(e) => {
            let mut out = serde_json::json!({
                "ok": false,
                "code": e.code(),
                "error": e.to_string(),
            });
            if explain
                && e == kinship_initdata::InitDataError::InvalidSignature
                && let Some(diag) = verifier.diagnose(init_data)
            {
                out["dataCheckString"] = diag.data_check_string.into();
                out["expectedHash"] = diag.expected_hash.into();
                out["receivedHash"] = diag.received_hash.into();
            }
            out
        }
    }
}
