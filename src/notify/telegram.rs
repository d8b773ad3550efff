//! Telegram Bot API transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::MessageTransport;
use crate::error::{AppError, Result};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends messages through `POST {base}/bot{token}/sendMessage`
pub struct TelegramTransport {
    client: Client,
    base_url: String,
    token: String,
}

impl TelegramTransport {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Notify(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Send a message and return the id Telegram assigned to it
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64> {
        let response = self
            .client
            .post(self.endpoint("sendMessage"))
            .json(&SendMessageRequest {
                chat_id,
                text,
                disable_web_page_preview: true,
            })
            .send()
            .await
            .map_err(|e| AppError::Notify(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Notify(format!(
                "Failed to send message: {} - {}",
                status, text
            )));
        }

        let body: ApiResponse<SentMessage> = response
            .json()
            .await
            .map_err(|e| AppError::Notify(e.to_string()))?;

        match body {
            ApiResponse {
                ok: true,
                result: Some(message),
                ..
            } => Ok(message.message_id),
            ApiResponse { description, .. } => Err(AppError::Notify(format!(
                "Telegram rejected message: {}",
                description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text).await.map(|_| ())
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    pub disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}
