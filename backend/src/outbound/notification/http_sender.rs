//! Reqwest-backed notification sender.
//!
//! This adapter owns transport details only: body serialisation, timeout, and
//! mapping HTTP outcomes onto the sender contract.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use super::dto::NotificationRequestDto;
use crate::domain::ports::{NotificationSender, NotificationSenderError};
use crate::domain::{EmailAddress, NotificationKind};

const DEFAULT_USER_AGENT: &str = "campus-rides-notification-relay/0.1";

/// Outbound identity sent with every request.
pub struct HttpNotificationIdentity {
    pub user_agent: String,
    /// Optional bearer token for the relay.
    pub api_token: Option<String>,
}

impl Default for HttpNotificationIdentity {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            api_token: None,
        }
    }
}

/// Sender that POSTs each notification as JSON to one endpoint.
pub struct HttpNotificationSender {
    client: Client,
    endpoint: Url,
    user_agent: String,
    api_token: Option<String>,
}

impl HttpNotificationSender {
    /// Build a sender using a reqwest client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_identity(endpoint, timeout, HttpNotificationIdentity::default())
    }

    /// Build a sender that presents `identity` on every request.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn with_identity(
        endpoint: Url,
        timeout: Duration,
        identity: HttpNotificationIdentity,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            user_agent: identity.user_agent,
            api_token: identity.api_token,
        })
    }

    fn request(
        &self,
        recipient: &EmailAddress,
        kind: NotificationKind,
        data: &Value,
    ) -> RequestBuilder {
        let body = NotificationRequestDto {
            to: recipient.as_str(),
            template: kind.as_str(),
            data,
        };
        let request = self
            .client
            .post(self.endpoint.clone())
            .header(USER_AGENT, self.user_agent.as_str())
            .json(&body);
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn emit(
        &self,
        recipient: &EmailAddress,
        kind: NotificationKind,
        data: &Value,
    ) -> Result<bool, NotificationSenderError> {
        let response = self
            .request(recipient, kind, data)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }

        let body = response.bytes().await.map_err(map_transport_error)?;
        classify_status(status, body.as_ref())
    }
}

fn map_transport_error(error: reqwest::Error) -> NotificationSenderError {
    NotificationSenderError::connection(error.to_string())
}

/// Map a non-success status onto the sender contract.
///
/// Throttling, timeouts, and server errors are retried. Any other client
/// error means the relay will never take this message.
fn classify_status(status: StatusCode, body: &[u8]) -> Result<bool, NotificationSenderError> {
    let preview = body_preview(body);
    let message = if preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {preview}", status.as_u16())
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            Err(NotificationSenderError::unavailable(message))
        }
        _ if status.is_client_error() => {
            debug!(%message, "notification relay refused message");
            Ok(false)
        }
        _ => Err(NotificationSenderError::unavailable(message)),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
