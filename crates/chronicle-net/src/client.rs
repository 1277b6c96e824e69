//! Thin REST client: base URL, bot authorization, and 429 handling.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{NetError, Result};

/// 429 responses are waited out at most this many times per call.
const MAX_RATE_LIMIT_WAITS: u32 = 5;
const BODY_PREVIEW_CHARS: usize = 256;

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// Whether a call carries the bot token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Bot,
    /// Webhook executions and CDN downloads authenticate by URL.
    None,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base: String,
    token: String,
}

impl ApiClient {
    pub fn new(base: impl Into<String>, token: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// Execute a request, waiting out rate limits.
    ///
    /// `build` is called once per attempt because multipart bodies cannot be
    /// replayed.
    pub async fn execute<F>(&self, context: &'static str, auth: Auth, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut waits = 0;
        loop {
            let mut request = build(&self.http);
            if auth == Auth::Bot {
                request = request.header(AUTHORIZATION, format!("Bot {}", self.token));
            }
            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if waits >= MAX_RATE_LIMIT_WAITS {
                    return Err(NetError::RateLimited {
                        context,
                        attempts: waits + 1,
                    });
                }
                waits += 1;
                let wait = retry_after(response).await;
                warn!(context, wait_ms = wait.as_millis() as u64, "rate limited");
                tokio::time::sleep(wait).await;
                continue;
            }

            if status.is_success() {
                debug!(context, status = status.as_u16(), "request ok");
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            return Err(NetError::Status {
                context,
                status: status.as_u16(),
                body: body.chars().take(BODY_PREVIEW_CHARS).collect(),
            });
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, context: &'static str, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self
            .execute(context, Auth::Bot, |http| http.get(&url))
            .await?;
        Ok(response.json().await?)
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        context: &'static str,
        method: reqwest::Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = self.url(path);
        let response = self
            .execute(context, Auth::Bot, |http| {
                http.request(method.clone(), &url).json(body)
            })
            .await?;
        Ok(response.json().await?)
    }

    /// Call that answers with an empty body (`204 No Content`).
    pub async fn send_empty(
        &self,
        context: &'static str,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<()> {
        let url = self.url(path);
        self.execute(context, Auth::Bot, |http| {
            let request = http.request(method.clone(), &url);
            match body {
                Some(body) => request.json(body),
                None => request,
            }
        })
        .await?;
        Ok(())
    }
}

async fn retry_after(response: Response) -> Duration {
    let header = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok());
    let body = response
        .json::<RateLimitBody>()
        .await
        .ok()
        .map(|b| b.retry_after);
    let seconds = body.or(header).unwrap_or(1.0).clamp(0.0, 60.0);
    Duration::from_secs_f64(seconds)
}
