//! Transport adapter for the matching server.
//!
//! Thin JSON-over-HTTP wrapper: every non-2xx response is classified
//! uniformly as [`ApiError::Status`] carrying the status's reason phrase,
//! and every call site handles failure at the point of use. No timeouts
//! are applied — an unresponsive server simply leaves the caller waiting.

use reqwest::{Client, Response};
use serde::Serialize;

use crate::error::ApiError;
use crate::protocol::{
    ConnectionRequest, CreatePersonaRequest, Match, MessageBatch, MessageId, Persona, Profile,
    QuestionList, ReactRequest, SendMessageRequest, TranscribeRequest, TranscribeResponse,
};

/// Client for the matching server's HTTP surface.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

/// Strip trailing slashes so path concatenation stays predictable.
pub fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        ApiClient {
            client: Client::new(),
            base_url: normalize_base_url(base_url),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::Status(
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            ))
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.client.get(self.url(path)).send().await?;
        Ok(Self::check(response)?.json::<T>().await?)
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Ok(Self::check(response)?.json::<T>().await?)
    }

    /// POST with no meaningful response body; the ack payload is discarded.
    async fn post_ack<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::check(response)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    /// Simple-history variant: the whole shared transcript in one batch.
    pub async fn history(&self) -> Result<MessageBatch, ApiError> {
        self.get_json("/api/history").await
    }

    /// Open the one-way history event channel. The caller consumes the
    /// response body as a byte stream; see the stream client.
    pub async fn open_history_stream(&self) -> Result<Response, ApiError> {
        let response = self
            .client
            .get(self.url("/api/history/stream"))
            .send()
            .await?;
        Self::check(response)
    }

    /// Transcript for one conversation room (`human`, `general`, or a topic).
    pub async fn conversation(&self, group: &str) -> Result<MessageBatch, ApiError> {
        self.get_json(&format!("/api/conversations/{}", group)).await
    }

    /// Kick off server-side multi-agent generation for the general room.
    pub async fn generate_general(&self, turns: u32) -> Result<MessageBatch, ApiError> {
        let path = format!("/api/conversations/general/generate?turns={}", turns);
        let response = self.client.post(self.url(&path)).send().await?;
        Ok(Self::check(response)?.json::<MessageBatch>().await?)
    }

    /// Append a human turn; the response carries the refreshed transcript
    /// including the assistant's reply.
    pub async fn send_human(&self, text: &str) -> Result<MessageBatch, ApiError> {
        self.post_json(
            "/api/conversations/human",
            &SendMessageRequest {
                text: text.to_string(),
            },
        )
        .await
    }

    pub async fn clear_human(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url("/api/conversations/human"))
            .send()
            .await?;
        Self::check(response)?;
        Ok(())
    }

    pub async fn react(&self, message_id: MessageId, emoji: &str) -> Result<(), ApiError> {
        self.post_ack(
            "/api/conversations/human/react",
            &ReactRequest {
                message_id,
                emoji: emoji.to_string(),
            },
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Matches and personas
    // -----------------------------------------------------------------------

    /// Ranked match list. A non-array body is a decode failure here; the
    /// match controller treats that the same as any transport failure.
    pub async fn matches(&self) -> Result<Vec<Match>, ApiError> {
        let response = self.client.get(self.url("/api/matches")).send().await?;
        let body = Self::check(response)?.text().await?;
        Ok(serde_json::from_str::<Vec<Match>>(&body)?)
    }

    pub async fn personas(&self) -> Result<Vec<Persona>, ApiError> {
        self.get_json("/api/personas").await
    }

    pub async fn send_connection_request(&self, to: &str) -> Result<(), ApiError> {
        self.post_ack(
            "/api/connection-requests",
            &ConnectionRequest { to: to.to_string() },
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Onboarding
    // -----------------------------------------------------------------------

    pub async fn save_profile(&self, profile: &Profile) -> Result<(), ApiError> {
        self.post_ack("/api/profile", profile).await
    }

    pub async fn questions(&self) -> Result<QuestionList, ApiError> {
        self.get_json("/api/questions").await
    }

    pub async fn transcribe(&self, audio_base64: String) -> Result<TranscribeResponse, ApiError> {
        self.post_json("/api/transcribe", &TranscribeRequest { audio_base64 })
            .await
    }

    pub async fn create_persona(&self, request: &CreatePersonaRequest) -> Result<(), ApiError> {
        self.post_ack("/api/create-persona", request).await
    }
}
