//! Gmail REST client: labels, paged message listing, raw fetch, label marking.
mod wire;

use std::collections::HashMap;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use futures::stream::{self, Stream, TryStreamExt};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::types::Label;
pub use wire::ListMessagesResponse;
use wire::{
    CreateLabelRequest, LabelResource, ListLabelsResponse, ModifyMessageRequest,
    RawMessageResponse,
};

/// Upper bound Gmail accepts for `maxResults` on `messages.list`.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Gmail emits base64url, with or without padding depending on the endpoint.
const RAW_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A message as returned by `format=raw`, with the raw bytes decoded.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub snippet: Option<String>,
    pub label_ids: Vec<String>,
    pub raw: Vec<u8>,
}

#[derive(Clone)]
pub struct GmailClient {
    http: Client,
    api_base: String,
    access_token: String,
}

impl GmailClient {
    /// `api_base` points at the user resource, e.g.
    /// `https://gmail.googleapis.com/gmail/v1/users/me`.
    pub fn new(access_token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    pub async fn list_labels(&self) -> AppResult<Vec<Label>> {
        let url = format!("{}/labels", self.api_base);
        let resp: ListLabelsResponse = self.send_json(self.http.get(&url)).await?;
        Ok(resp.labels.into_iter().map(into_label).collect())
    }

    /// Map each requested name to its label, exact and case-sensitive.
    pub async fn resolve_label_ids(&self, names: &[String]) -> AppResult<Vec<Label>> {
        let labels = self.list_labels().await?;
        resolve_labels(&labels, names)
    }

    /// Return the label called `name`, creating it when absent.
    pub async fn ensure_label(&self, name: &str) -> AppResult<Label> {
        if let Some(existing) = find_label(&self.list_labels().await?, name) {
            debug!(label = %name, id = %existing.id, "Tracking label already exists");
            return Ok(existing);
        }

        let url = format!("{}/labels", self.api_base);
        let body = CreateLabelRequest {
            name,
            label_list_visibility: "labelShow",
            message_list_visibility: "show",
        };
        let response = self
            .authorized(self.http.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| AppError::Network(format!("creating label {name}: {e}")))?;

        if response.status() == StatusCode::CONFLICT {
            // Someone else created it between our list and create.
            return find_label(&self.list_labels().await?, name).ok_or_else(|| {
                AppError::Network(format!("label {name} conflicts with an existing label"))
            });
        }

        let created: LabelResource = decode(response).await?;
        info!(label = %name, id = %created.id, "Created tracking label");
        Ok(into_label(created))
    }

    pub async fn add_label_to_message(&self, message_id: &str, label_id: &str) -> AppResult<()> {
        let url = format!("{}/messages/{}/modify", self.api_base, message_id);
        let body = ModifyMessageRequest {
            add_label_ids: &[label_id],
        };
        let _: serde_json::Value = self.send_json(self.http.post(&url).json(&body)).await?;
        Ok(())
    }

    /// One page of `messages.list` for a single label.
    pub async fn list_messages_page(
        &self,
        label_id: &str,
        query: Option<&str>,
        page_token: Option<&str>,
        max_results: u32,
    ) -> AppResult<ListMessagesResponse> {
        let url = format!("{}/messages", self.api_base);
        let mut builder = self
            .http
            .get(&url)
            .query(&[("labelIds", label_id)])
            .query(&[("maxResults", max_results)]);
        if let Some(q) = query {
            builder = builder.query(&[("q", q)]);
        }
        if let Some(token) = page_token {
            builder = builder.query(&[("pageToken", token)]);
        }
        self.send_json(builder).await
    }

    pub fn lister(&self, label_id: &str, query: Option<&str>, max: Option<u32>) -> MessageLister<'_> {
        MessageLister {
            client: self,
            label_id: label_id.to_string(),
            query: query.map(str::to_string),
            remaining: max,
            page_token: None,
            done: false,
        }
    }

    /// Fetch the original RFC 822 bytes of one message.
    pub async fn get_message_raw(&self, message_id: &str) -> AppResult<RawMessage> {
        let url = format!("{}/messages/{}", self.api_base, message_id);
        let resp: RawMessageResponse = self
            .send_json(self.http.get(&url).query(&[("format", "raw")]))
            .await?;
        let payload = resp
            .raw
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| AppError::Network(format!("message {message_id}: response has no raw payload")))?;
        let raw = RAW_ENGINE
            .decode(payload)
            .map_err(|e| AppError::Network(format!("message {message_id}: undecodable raw payload: {e}")))?;
        Ok(RawMessage {
            id: resp.id,
            thread_id: resp.thread_id,
            snippet: resp.snippet,
            label_ids: resp.label_ids,
            raw,
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.access_token)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> AppResult<T> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("gmail request failed: {e}")))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> AppResult<T> {
    let status = response.status();
    let url = response.url().path().to_string();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::Network(format!("reading {url}: {e}")))?;
    if status == StatusCode::UNAUTHORIZED {
        return Err(AppError::Auth(format!("gmail rejected the access token for {url}")));
    }
    if !status.is_success() {
        return Err(AppError::Network(format!("{url} failed with status {status}: {body}")));
    }
    serde_json::from_str(&body).map_err(|e| AppError::Network(format!("decoding {url}: {e}")))
}

fn into_label(res: LabelResource) -> Label {
    Label {
        id: res.id,
        name: res.name,
    }
}

fn find_label(labels: &[Label], name: &str) -> Option<Label> {
    labels.iter().find(|l| l.name == name).cloned()
}

/// Pure half of label resolution. Every unresolved name is reported at once.
pub fn resolve_labels(labels: &[Label], names: &[String]) -> AppResult<Vec<Label>> {
    let by_name: HashMap<&str, &Label> = labels.iter().map(|l| (l.name.as_str(), l)).collect();
    let mut resolved = Vec::new();
    let mut missing = Vec::new();
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        match by_name.get(name) {
            Some(label) => resolved.push((*label).clone()),
            None => missing.push(name.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(AppError::LabelNotFound(missing));
    }
    Ok(resolved)
}

/// Combine the user's query with an exclusion of the tracking label so
/// already-marked messages are not listed again.
pub fn build_query(user_query: Option<&str>, tracking_label: Option<&str>) -> Option<String> {
    let user_query = user_query.map(str::trim).filter(|q| !q.is_empty());
    let exclusion = tracking_label.map(|name| {
        if name.chars().any(char::is_whitespace) {
            format!("-label:\"{name}\"")
        } else {
            format!("-label:{name}")
        }
    });
    match (user_query, exclusion) {
        (Some(q), Some(ex)) => Some(format!("{q} {ex}")),
        (Some(q), None) => Some(q.to_string()),
        (None, ex) => ex,
    }
}

/// Lazily pages message ids for one label. Stops on the last page or once
/// `max` ids have been yielded; provider order is kept.
pub struct MessageLister<'a> {
    client: &'a GmailClient,
    label_id: String,
    query: Option<String>,
    remaining: Option<u32>,
    page_token: Option<String>,
    done: bool,
}

impl<'a> MessageLister<'a> {
    /// Next page of ids, or `None` once the listing is exhausted.
    pub async fn next_page(&mut self) -> AppResult<Option<Vec<String>>> {
        if self.done || self.remaining == Some(0) {
            self.done = true;
            return Ok(None);
        }

        let page_size = self
            .remaining
            .map(|r| r.min(MAX_PAGE_SIZE))
            .unwrap_or(MAX_PAGE_SIZE);
        let page = self
            .client
            .list_messages_page(
                &self.label_id,
                self.query.as_deref(),
                self.page_token.as_deref(),
                page_size,
            )
            .await?;

        let mut ids: Vec<String> = page.messages.into_iter().map(|m| m.id).collect();
        if let Some(remaining) = self.remaining.as_mut() {
            ids.truncate(*remaining as usize);
            *remaining -= ids.len() as u32;
        }

        self.page_token = page.next_page_token;
        if self.page_token.is_none() || self.remaining == Some(0) {
            self.done = true;
        }
        debug!(label = %self.label_id, count = ids.len(), more = !self.done, "Listed message page");
        Ok(Some(ids))
    }

    pub fn into_stream(self) -> impl Stream<Item = AppResult<String>> + 'a {
        stream::try_unfold(self, |mut lister| async move {
            let page = lister.next_page().await?;
            Ok::<_, AppError>(
                page.map(|ids| (stream::iter(ids.into_iter().map(Ok::<_, AppError>)), lister)),
            )
        })
        .try_flatten()
    }
}
