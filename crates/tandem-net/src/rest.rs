//! `reqwest` implementation of [`ChatApi`] and [`Directory`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use tandem_shared::protocol::{
    ConversationRecord, DirectoryRecord, MatchStatusRecord, MessageRecord, ParticipationRecord,
};
use tandem_shared::{classify, ConversationKey, ConversationKind, CorrelationToken};

use crate::api::{ChatApi, Directory, OutgoingAttachment, SessionProvider};
use crate::error::ApiError;

/// REST client for the conversation, match and directory endpoints.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: Url,
    session: Arc<dyn SessionProvider>,
}

impl RestClient {
    /// Build a client rooted at `base_url` with a bounded per-request timeout.
    pub fn new(
        base_url: &str,
        session: Arc<dyn SessionProvider>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base = Url::parse(base_url).map_err(|e| ApiError::Url(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Url(format!("not a base URL: {base_url}")));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tandem/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base,
            session,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        build_endpoint(&self.base, segments)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match self.session.bearer_token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!(url = %url, "GET");
        let resp = self.authorized(self.http.get(url)).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn get_list<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<Vec<T>, ApiError> {
        let values: Vec<serde_json::Value> = self.get_json(url).await?;
        Ok(decode_lenient(values, what))
    }
}

#[async_trait]
impl ChatApi for RestClient {
    async fn list_conversations(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationRecord>, ApiError> {
        let mut url = self.endpoint(&["conversations"])?;
        with_page(&mut url, limit, offset);
        self.get_list(url, "conversation").await
    }

    async fn list_messages(
        &self,
        key: &ConversationKey,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageRecord>, ApiError> {
        let mut url = self.endpoint(&["conversations", key.as_str(), "messages"])?;
        with_page(&mut url, limit, offset);
        self.get_list(url, "message").await
    }

    async fn send_message(
        &self,
        key: &ConversationKey,
        body: &str,
        attachments: Vec<OutgoingAttachment>,
        client_token: CorrelationToken,
    ) -> Result<MessageRecord, ApiError> {
        let url = self.endpoint(&["conversations", key.as_str(), "messages"])?;

        let mut form = Form::new()
            .text("body", body.to_string())
            .text("client_token", client_token.to_string());
        for attachment in attachments {
            let part = Part::bytes(attachment.data.to_vec())
                .file_name(attachment.name)
                .mime_str(&attachment.media_type)?;
            form = form.part("attachments", part);
        }

        debug!(url = %url, token = %client_token, "POST message");
        let resp = self
            .authorized(self.http.post(url))
            .multipart(form)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json::<MessageRecord>().await?)
    }

    async fn match_status(&self, peer: &ConversationKey) -> Result<MatchStatusRecord, ApiError> {
        let url = self.endpoint(&["matches", peer.as_str()])?;
        self.get_json(url).await
    }

    async fn event_participation(
        &self,
        club_id: &str,
        event_id: &str,
    ) -> Result<ParticipationRecord, ApiError> {
        let url = self.endpoint(&["clubs", club_id, "events", event_id, "participation"])?;
        self.get_json(url).await
    }
}

#[async_trait]
impl Directory for RestClient {
    async fn resolve(&self, key: &ConversationKey) -> Result<DirectoryRecord, ApiError> {
        let url = match key.kind() {
            ConversationKind::User => self.endpoint(&["users", key.as_str()])?,
            ConversationKind::ClubEvent => {
                let route = classify(key.as_str())
                    .map_err(|e| ApiError::Url(e.to_string()))?;
                let club = route.club_id.unwrap_or_default();
                self.endpoint(&["clubs", &club])?
            }
        };
        self.get_json(url).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_endpoint(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::Url(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn with_page(url: &mut Url, limit: u32, offset: u32) {
    url.query_pairs_mut()
        .append_pair("limit", &limit.to_string())
        .append_pair("offset", &offset.to_string());
}

async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(error_from_status(status, &body))
}

fn error_from_status(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::FORBIDDEN => ApiError::Forbidden(message),
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNPROCESSABLE_ENTITY => {
            ApiError::Rejected(message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ApiError::Timeout,
        _ => ApiError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

/// Decode each element on its own; an element of the wrong shape is logged
/// and skipped rather than failing the page.
fn decode_lenient<T: DeserializeOwned>(values: Vec<serde_json::Value>, what: &str) -> Vec<T> {
    let total = values.len();
    let decoded: Vec<T> = values
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(kind = what, error = %e, "Skipping undecodable record");
                None
            }
        })
        .collect();
    if decoded.len() < total {
        debug!(kind = what, total, kept = decoded.len(), "Decoded page with skips");
    }
    decoded
}
