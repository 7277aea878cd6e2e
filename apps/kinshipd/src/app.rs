use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use kinship_api::types::{
    AuthResponse, ErrorResponse, HealthResponse, MeResponse, TelegramAuthRequest, UserView,
};
use kinship_initdata::{InitDataError, InitDataVerifier, RejectionKind};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::db::{Db, UserRecord};
use crate::middleware::require_session;
use crate::session::{SessionClaims, SessionIssuer};

const REAUTH_MESSAGE: &str = "please re-authenticate";

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub verifier: Arc<InitDataVerifier>,
    pub sessions: Arc<SessionIssuer>,
    /// Log signature diagnostics on mismatch.
    pub debug_auth: bool,
}

impl AppState {
    pub async fn init(
        db_path: &Path,
        verifier: InitDataVerifier,
        sessions: SessionIssuer,
        debug_auth: bool,
    ) -> anyhow::Result<Self> {
        let db = Db::open(db_path).await?;
        db.init().await?;
        Ok(Self {
            db,
            verifier: Arc::new(verifier),
            sessions: Arc::new(sessions),
            debug_auth,
        })
    }
}

pub async fn serve_tcp(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind tcp {addr}"))?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "kinshipd listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve tcp")?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/auth/me", get(me))
        .layer(axum::middleware::from_fn_with_state(
            state.sessions.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/auth/telegram", post(auth_telegram))
        .merge(authed)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                // Bodies carry init-data and headers carry session tokens; keep both out of spans.
                tracing::info_span!(
                    "http.request",
                    http_method = %req.method(),
                    http_path = %req.uri().path(),
                )
            }),
        )
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        ts: Utc::now().to_rfc3339(),
    })
}

async fn auth_telegram(
    State(state): State<AppState>,
    body: Result<Json<TelegramAuthRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Json(req) = body.map_err(|e| {
        warn!(error = %e.body_text(), "login body rejected");
        bad_request("invalid_request")
    })?;

    let verified = state
        .verifier
        .verify(&req.init_data, Utc::now().timestamp())
        .map_err(|e| reject_init_data(&state, &req.init_data, e))?;

    if verified.via_bypass {
        warn!(
            telegram_id = verified.user.id,
            "login accepted via insecure test bypass"
        );
    }

    let user = state
        .db
        .upsert_telegram_user(&verified.user)
        .await
        .map_err(internal_error)?;
    let issued = state.sessions.issue(&user).map_err(internal_error)?;
    info!(user_id = %user.id, telegram_id = user.telegram_id, "session issued");

    Ok(Json(AuthResponse {
        token: issued.token,
        expires_at: issued.expires_at.to_rfc3339(),
        user: user_view(&user),
    }))
}

async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<Json<MeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = state
        .db
        .get_user(&claims.sub)
        .await
        .map_err(internal_error)?;
    let Some(user) = user else {
        warn!(user_id = %claims.sub, "session refers to unknown user");
        return Err(unauthorized("unauthorized"));
    };
    Ok(Json(MeResponse {
        user: user_view(&user),
    }))
}

fn reject_init_data(
    state: &AppState,
    init_data: &str,
    e: InitDataError,
) -> (StatusCode, Json<ErrorResponse>) {
    if state.debug_auth
        && e == InitDataError::InvalidSignature
        && let Some(diag) = state.verifier.diagnose(init_data)
    {
        debug!(
            data_check_string = %diag.data_check_string,
            expected_hash = %diag.expected_hash,
            received_hash = ?diag.received_hash,
            "init data signature mismatch"
        );
    }

    match e.kind() {
        RejectionKind::Malformed => {
            warn!(code = e.code(), "init data rejected");
            bad_request(e.code())
        }
        RejectionKind::Unauthorized => {
            warn!(code = e.code(), "init data rejected");
            unauthorized(e.code())
        }
        RejectionKind::Misconfigured => internal_error(e),
    }
}

fn user_view(user: &UserRecord) -> UserView {
    UserView {
        id: user.id.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
        telegram_id: user.telegram_id.to_string(),
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

fn internal_error<E: std::fmt::Display>(e: E) -> (StatusCode, Json<ErrorResponse>) {
    error!(error = %e, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            code: "internal_error".to_string(),
            message: "internal error".to_string(),
        }),
    )
}

fn bad_request(code: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            code: code.to_string(),
            message: REAUTH_MESSAGE.to_string(),
        }),
    )
}

fn unauthorized(code: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            code: code.to_string(),
            message: REAUTH_MESSAGE.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use kinship_api::{KinshipClient, KinshipClientError};
    use kinship_initdata::{BotCredential, DEV_BYPASS_HASH, VerifierConfig, sign_init_data};
    use tempfile::tempdir;

    const BOT_TOKEN: &str = "123456:ABC-DEF";
    const SESSION_SECRET: &[u8] = b"test-session-secret-0123456789ab";
    const USER_JSON: &str = r#"{"id":279058397,"first_name":"Vladislav","last_name":"K","username":"vdkfrost","language_code":"ru"}"#;

    fn credential() -> anyhow::Result<BotCredential> {
        Ok(BotCredential::parse(BOT_TOKEN)?)
    }

    fn signed(auth_date: i64, user_json: &str) -> anyhow::Result<String> {
        let auth_date = auth_date.to_string();
        Ok(sign_init_data(
            &credential()?,
            [
                ("query_id", "AAHdF6IQAAAAAN0XohDhrOrc"),
                ("user", user_json),
                ("auth_date", auth_date.as_str()),
            ],
        ))
    }

    fn expect_server_error(
        res: Result<impl std::fmt::Debug, KinshipClientError>,
    ) -> anyhow::Result<(u16, String, String)> {
        match res {
            Err(KinshipClientError::Server {
                status,
                code,
                message,
            }) => Ok((status, code, message)),
            other => anyhow::bail!("expected a server error, got {other:?}"),
        }
    }

    async fn start_daemon_with_config(
        config: VerifierConfig,
    ) -> anyhow::Result<(AppState, KinshipClient, tokio::task::JoinHandle<()>)> {
        let dir = tempdir()?;
        let db_path = dir.path().join("kinship.sqlite");
        let state = AppState::init(
            &db_path,
            InitDataVerifier::new(config),
            SessionIssuer::new(SESSION_SECRET, chrono::Duration::hours(1)),
            true,
        )
        .await?;
        let app = router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let client = KinshipClient::new(&format!("http://{addr}"))?;
        client.health().await?;

        // The sqlite file must outlive the test body.
        std::mem::forget(dir);
        Ok((state, client, handle))
    }

    async fn start_daemon() -> anyhow::Result<(AppState, KinshipClient, tokio::task::JoinHandle<()>)>
    {
        start_daemon_with_config(VerifierConfig::new(credential()?)).await
    }

    #[tokio::test]
    async fn login_then_me_round_trip() -> anyhow::Result<()> {
        let (_state, client, handle) = start_daemon().await?;

        let init_data = signed(Utc::now().timestamp(), USER_JSON)?;
        let auth = client.login_with_init_data(&init_data).await?;
        assert!(!auth.token.is_empty());
        assert_eq!(auth.user.first_name, "Vladislav");
        assert_eq!(auth.user.last_name.as_deref(), Some("K"));
        assert_eq!(auth.user.username.as_deref(), Some("vdkfrost"));
        assert_eq!(auth.user.telegram_id, "279058397");
        let expires_at = chrono::DateTime::parse_from_rfc3339(&auth.expires_at)?;
        assert!(expires_at.timestamp() > Utc::now().timestamp());

        let me = client.me(&auth.token).await?;
        assert_eq!(me.user, auth.user);

        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn repeated_login_keeps_the_same_user() -> anyhow::Result<()> {
        let (state, client, handle) = start_daemon().await?;

        let first = client
            .login_with_init_data(&signed(Utc::now().timestamp(), USER_JSON)?)
            .await?;
        let renamed = USER_JSON.replace("Vladislav", "Vlad");
        let second = client
            .login_with_init_data(&signed(Utc::now().timestamp(), &renamed)?)
            .await?;

        assert_eq!(first.user.id, second.user.id);
        assert_eq!(second.user.first_name, "Vlad");
        assert_eq!(state.db.count_users().await?, 1);

        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_first_logins_create_one_user() -> anyhow::Result<()> {
        let (state, client, handle) = start_daemon().await?;
        let init_data = signed(Utc::now().timestamp(), USER_JSON)?;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let client = client.clone();
            let init_data = init_data.clone();
            tasks.push(tokio::spawn(async move {
                client.login_with_init_data(&init_data).await
            }));
        }
        let mut ids = Vec::new();
        for t in tasks {
            ids.push(t.await??.user.id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(state.db.count_users().await?, 1);

        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn malformed_payloads_are_bad_requests() -> anyhow::Result<()> {
        let (_state, client, handle) = start_daemon().await?;
        let now = Utc::now().timestamp().to_string();

        let (status, code, message) =
            expect_server_error(client.login_with_init_data("auth_date=1&user=%7B%7D").await)?;
        assert_eq!((status, code.as_str()), (400, "missing_hash"));
        assert_eq!(message, "please re-authenticate");

        let no_date = sign_init_data(&credential()?, [("user", USER_JSON)]);
        let (status, code, _) = expect_server_error(client.login_with_init_data(&no_date).await)?;
        assert_eq!((status, code.as_str()), (400, "missing_timestamp"));

        let bad_date = sign_init_data(&credential()?, [("auth_date", "soon"), ("user", USER_JSON)]);
        let (status, code, _) = expect_server_error(client.login_with_init_data(&bad_date).await)?;
        assert_eq!((status, code.as_str()), (400, "invalid_timestamp"));

        let no_user = sign_init_data(&credential()?, [("auth_date", now.as_str())]);
        let (status, code, _) = expect_server_error(client.login_with_init_data(&no_user).await)?;
        assert_eq!((status, code.as_str()), (400, "invalid_user_payload"));

        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn untrusted_payloads_are_unauthorized() -> anyhow::Result<()> {
        let (_state, client, handle) = start_daemon().await?;
        let now = Utc::now().timestamp();

        let tampered = signed(now, USER_JSON)?.replace("Vladislav", "Mallory");
        let (status, code, message) =
            expect_server_error(client.login_with_init_data(&tampered).await)?;
        assert_eq!((status, code.as_str()), (401, "invalid_signature"));
        assert_eq!(message, "please re-authenticate");

        let stale = signed(now - 3600, USER_JSON)?;
        let (status, code, _) = expect_server_error(client.login_with_init_data(&stale).await)?;
        assert_eq!((status, code.as_str()), (401, "stale_session"));

        let future = signed(now + 3600, USER_JSON)?;
        let (status, code, _) = expect_server_error(client.login_with_init_data(&future).await)?;
        assert_eq!((status, code.as_str()), (401, "timestamp_in_future"));

        // Bypass sentinel is only a bad signature unless explicitly enabled.
        let bypass = format!("auth_date={now}&hash={DEV_BYPASS_HASH}");
        let (status, code, _) = expect_server_error(client.login_with_init_data(&bypass).await)?;
        assert_eq!((status, code.as_str()), (401, "invalid_signature"));

        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn invalid_json_body_is_a_bad_request() -> anyhow::Result<()> {
        let (_state, client, handle) = start_daemon().await?;
        let url = client.base_url().join("/auth/telegram")?;
        let resp = reqwest::Client::new()
            .post(url)
            .header("content-type", "application/json")
            .body(r#"{"init":"x"}"#)
            .send()
            .await?;
        assert_eq!(resp.status().as_u16(), 400);
        let body: ErrorResponse = resp.json().await?;
        assert_eq!(body.code, "invalid_request");

        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn me_requires_a_token_from_this_daemon() -> anyhow::Result<()> {
        let (state, client, handle) = start_daemon().await?;

        let (status, code, _) = expect_server_error(client.me("garbage").await)?;
        assert_eq!((status, code.as_str()), (401, "unauthorized"));

        let foreign = SessionIssuer::new(
            b"some-other-secret-some-other-sec",
            chrono::Duration::hours(1),
        );
        let user = state
            .db
            .upsert_telegram_user(&kinship_initdata::dev_fallback_user())
            .await?;
        let token = foreign.issue(&user)?.token;
        let (status, _, _) = expect_server_error(client.me(&token).await)?;
        assert_eq!(status, 401);

        // A valid token for a user that no longer exists.
        let mut ghost = user.clone();
        ghost.id = "00000000-0000-4000-8000-000000000000".to_string();
        let token = state.sessions.issue(&ghost)?.token;
        let (status, code, _) = expect_server_error(client.me(&token).await)?;
        assert_eq!((status, code.as_str()), (401, "unauthorized"));

        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn bypass_logs_in_only_when_enabled() -> anyhow::Result<()> {
        let mut config = VerifierConfig::new(credential()?);
        config.allow_insecure_test_bypass = true;
        let (_state, client, handle) = start_daemon_with_config(config).await?;

        let auth = client
            .login_with_init_data(&format!("hash={DEV_BYPASS_HASH}"))
            .await?;
        assert_eq!(auth.user.first_name, "Dev");
        assert_eq!(auth.user.telegram_id, "100000001");

        // Real signatures still work alongside the bypass.
        let auth = client
            .login_with_init_data(&signed(Utc::now().timestamp(), USER_JSON)?)
            .await?;
        assert_eq!(auth.user.telegram_id, "279058397");

        handle.abort();
        Ok(())
    }
}
