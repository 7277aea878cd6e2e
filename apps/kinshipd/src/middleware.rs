use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use crate::session::SessionIssuer;

/// Reject requests without a valid session token. On success the decoded
/// [`crate::session::SessionClaims`] are placed in the request extensions.
pub async fn require_session(
    State(sessions): State<Arc<SessionIssuer>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let claims = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .and_then(|token| match sessions.verify(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!(error = %e, "session token rejected");
                None
            }
        });

    let Some(claims) = claims else {
        return Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"code":"unauthorized","message":"please re-authenticate"}"#,
            ))
            .unwrap_or_else(|_| Response::new(Body::empty()));
    };

    debug!(user_id = %claims.sub, telegram_id = %claims.tid, "session accepted");
    request.extensions_mut().insert(claims);
    next.run(request).await
}
