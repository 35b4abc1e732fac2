use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Reply text used when the API answers without a `response` field
pub const NO_RESPONSE: &str = "No response received";

#[derive(Serialize)]
struct ChatbotRequest<'a> {
    query: &'a str,
    key: &'a str,
    user_id: &'a str,
}

#[derive(Deserialize)]
struct ChatbotResponse {
    response: Option<String>,
}

/// Client for the remote chatbot endpoint
#[derive(Clone)]
pub struct ChatbotClient {
    client: Client,
    endpoint: String,
    api_key: String,
    user_id: String,
}

impl ChatbotClient {
    pub fn new(endpoint: &str, api_key: &str, user_id: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            user_id: user_id.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one user message and return the raw, untrimmed reply
    pub async fn query(&self, text: &str) -> Result<String> {
        let request = ChatbotRequest {
            query: text,
            key: &self.api_key,
            user_id: &self.user_id,
        };

        tracing::debug!(endpoint = %self.endpoint, chars = text.len(), "sending chatbot query");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "chatbot request failed");
                e
            })?;

        // Error statuses still carry a `response` the user should see
        let status = response.status();
        let body = response.text().await?;
        let reply: ChatbotResponse = match serde_json::from_str(&body) {
            Ok(reply) => reply,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                tracing::warn!(status = %status, body = %body, "chatbot API error");
                return Err(Error::Api(format!("status {status}: {body}")));
            }
        };
        if !status.is_success() {
            tracing::warn!(status = %status, "chatbot answered with an error status");
        }

        let raw = reply.response.unwrap_or_else(|| NO_RESPONSE.to_string());
        tracing::debug!(chars = raw.len(), "chatbot reply received");
        Ok(raw)
    }
}
