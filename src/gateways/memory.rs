//! Memory gateway: best-effort long-term memory service client.
//!
//! `fetch` and `store` never fail from the caller's point of view: transport
//! errors, non-200 responses and unexpected bodies degrade to an empty digest
//! or a log line. Implementors provide the fallible `try_*` calls.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::GatewayError;

const SERVICE: &str = "memory";

/// How many past exchanges the memory service should consider.
const NUM_CHATS: u32 = 10;

#[async_trait]
pub trait MemoryGateway: Send + Sync {
    /// Look up memories relevant to `query`.
    async fn try_fetch(&self, user_id: i64, query: &str) -> Result<String, GatewayError>;

    /// Record one exchange.
    async fn try_store(
        &self,
        user_id: i64,
        user_text: &str,
        reply_text: &str,
    ) -> Result<(), GatewayError>;

    /// Drop everything remembered about the user.
    async fn clear(&self, user_id: i64) -> Result<(), GatewayError>;

    /// Digest for `query`, or empty on any failure.
    async fn fetch(&self, user_id: i64, query: &str) -> String {
        match self.try_fetch(user_id, query).await {
            Ok(digest) => digest,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Memory fetch failed; continuing without memories");
                String::new()
            }
        }
    }

    /// Store an exchange, logging failures.
    async fn store(&self, user_id: i64, user_text: &str, reply_text: &str) {
        match self.try_store(user_id, user_text, reply_text).await {
            Ok(()) => tracing::debug!(user_id, "Memory stored"),
            Err(e) => tracing::warn!(user_id, error = %e, "Memory store failed"),
        }
    }
}

#[derive(Serialize)]
struct AddMemory<'a> {
    user_id: String,
    user_message: &'a str,
    ai_message: &'a str,
}

/// HTTP client for the memory service (`/get`, `/add`, `/clear`).
pub struct HttpMemoryGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMemoryGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

/// Pull the digest out of a `/get` response body.
fn digest_from_body(body: &serde_json::Value) -> Result<String, GatewayError> {
    let object = body.as_object().ok_or_else(|| GatewayError::Malformed {
        service: SERVICE,
        reason: "response is not a JSON object".to_string(),
    })?;
    Ok(match object.get("data") {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    })
}

#[async_trait]
impl MemoryGateway for HttpMemoryGateway {
    async fn try_fetch(&self, user_id: i64, query: &str) -> Result<String, GatewayError> {
        let url = format!("{}/get", self.base_url);
        let user_id = user_id.to_string();
        let num_chats = NUM_CHATS.to_string();
        let body: serde_json::Value = self
            .client
            .get(&url)
            .query(&[
                ("user_id", user_id.as_str()),
                ("msg", query),
                ("num_chats", num_chats.as_str()),
                ("include_chat_history", "false"),
            ])
            .header("accept", "application/json")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?
            .json()
            .await
            .map_err(|e| GatewayError::Malformed {
                service: SERVICE,
                reason: e.to_string(),
            })?;
        digest_from_body(&body)
    }

    async fn try_store(
        &self,
        user_id: i64,
        user_text: &str,
        reply_text: &str,
    ) -> Result<(), GatewayError> {
        let url = format!("{}/add", self.base_url);
        let payload = AddMemory {
            user_id: user_id.to_string(),
            user_message: user_text,
            ai_message: reply_text,
        };

        let resp = self
            .client
            .post(&url)
            .header("accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?;

        // Some deployments only accept form bodies on /add.
        let resp = if resp.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            tracing::debug!(user_id = %payload.user_id, "Memory add rejected JSON; retrying as form data");
            self.client
                .post(&url)
                .header("accept", "application/json")
                .form(&payload)
                .send()
                .await
                .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?
        } else {
            resp
        };

        resp.error_for_status()
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?;
        Ok(())
    }

    async fn clear(&self, user_id: i64) -> Result<(), GatewayError> {
        let url = format!("{}/clear", self.base_url);
        self.client
            .delete(&url)
            .query(&[("user_id", user_id.to_string())])
            .header("accept", "application/json")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?;
        Ok(())
    }
}
