use anyhow::Context as _;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::types::{AuthResponse, ErrorResponse, HealthResponse, MeResponse, TelegramAuthRequest};

#[derive(Debug, Clone)]
pub struct KinshipClient {
    base_url: Url,
    http: reqwest::Client,
}

#[derive(Debug, Error)]
pub enum KinshipClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server error {status} {code}: {message}")]
    Server {
        status: u16,
        code: String,
        message: String,
    },
    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl KinshipClientError {
    /// The server's error code, if the server answered with one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Server { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl KinshipClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url).context("parse base_url")?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build reqwest client")?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthResponse, KinshipClientError> {
        self.get_json("/health", None).await
    }

    pub async fn login_with_init_data(
        &self,
        init_data: &str,
    ) -> Result<AuthResponse, KinshipClientError> {
        self.post_json(
            "/auth/telegram",
            TelegramAuthRequest {
                init_data: init_data.to_string(),
            },
        )
        .await
    }

    pub async fn me(&self, token: &str) -> Result<MeResponse, KinshipClientError> {
        self.get_json("/auth/me", Some(token)).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, KinshipClientError> {
        let url = self.base_url.join(path).context("join url")?;
        let mut req = self.http.get(url).header("accept", "application/json");
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        let resp = req.send().await?;
        parse_json_response(resp).await
    }

    async fn post_json<Req: Serialize, Res: DeserializeOwned>(
        &self,
        path: &str,
        body: Req,
    ) -> Result<Res, KinshipClientError> {
        let url = self.base_url.join(path).context("join url")?;
        let resp = self
            .http
            .post(url)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await?;
        parse_json_response(resp).await
    }
}

async fn parse_json_response<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, KinshipClientError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    if !status.is_success() {
        if let Ok(err) = serde_json::from_slice::<ErrorResponse>(&bytes) {
            return Err(KinshipClientError::Server {
                status: status.as_u16(),
                code: err.code,
                message: err.message,
            });
        }
        return Err(anyhow::anyhow!(
            "kinshipd http error {status}: {}",
            String::from_utf8_lossy(&bytes)
        )
        .into());
    }
    let out = serde_json::from_slice::<T>(&bytes).context("decode response json")?;
    Ok(out)
}
