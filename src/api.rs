use crate::config::Config;
use crate::model::{ApiEnvelope, Conversation, Message, SendMessageRequest};
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

/// Failures surfaced by the REST client. Callers decide how to present them.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid API base URL {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The four message endpoints the UI drives
#[async_trait]
pub trait MessageApi: Send + Sync {
    async fn get_conversations(&self) -> Result<Vec<Conversation>, ApiError>;

    async fn get_conversation(&self, wa_id: &str) -> Result<Vec<Message>, ApiError>;

    /// Returns the persisted message when the backend reports success
    async fn send_message(
        &self,
        wa_id: &str,
        message_body: &str,
        contact_name: &str,
    ) -> Result<Option<Message>, ApiError>;

    async fn mark_as_read(&self, wa_id: &str) -> Result<(), ApiError>;
}

/// HTTP client for the messaging backend
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            base_url: config.api_base_url.clone(),
            client,
        })
    }

    /// Liveness payload from `GET /health`, for diagnostics
    pub async fn health_check(&self) -> Result<serde_json::Value, ApiError> {
        let value: Option<serde_json::Value> =
            self.request(Method::GET, &["health"], None::<&()>).await?;
        Ok(value.unwrap_or_default())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Issue one request. An empty or `null` body decodes to `None`.
    async fn request<T, B>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<Option<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        debug!("API Request: {} {}", method, url.path());

        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.inspect_err(|e| {
            error!("API Error: {} {}: {}", method, url.path(), e);
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("API Error: {} {} -> {}: {}", method, url.path(), status, body);
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl MessageApi for ApiClient {
    async fn get_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let envelope: Option<ApiEnvelope<Vec<Conversation>>> = self
            .request(Method::GET, &["messages", "conversations"], None::<&()>)
            .await?;
        let conversations = envelope.map(ApiEnvelope::into_items).unwrap_or_default();
        debug!("Fetched {} conversations", conversations.len());
        Ok(conversations)
    }

    async fn get_conversation(&self, wa_id: &str) -> Result<Vec<Message>, ApiError> {
        let envelope: Option<ApiEnvelope<Vec<Message>>> = self
            .request(Method::GET, &["messages", "conversations", wa_id], None::<&()>)
            .await?;
        Ok(envelope.map(ApiEnvelope::into_items).unwrap_or_default())
    }

    async fn send_message(
        &self,
        wa_id: &str,
        message_body: &str,
        contact_name: &str,
    ) -> Result<Option<Message>, ApiError> {
        let body = SendMessageRequest {
            wa_id,
            message_body,
            contact_name,
        };
        let envelope: Option<ApiEnvelope<Message>> = self
            .request(Method::POST, &["messages", "send"], Some(&body))
            .await?;
        Ok(envelope.filter(|e| e.success).and_then(|e| e.data))
    }

    async fn mark_as_read(&self, wa_id: &str) -> Result<(), ApiError> {
        let _: Option<serde_json::Value> = self
            .request(
                Method::PUT,
                &["messages", "conversations", wa_id, "read"],
                None::<&()>,
            )
            .await?;
        Ok(())
    }
}
