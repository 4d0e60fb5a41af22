//! Headless CMS client: track lookup by title and the uploaded media listing.
//! Responses are parsed leniently from `serde_json::Value` so both flattened
//! and `data`/`attributes`-wrapped payload shapes are accepted.

use crate::api::models::*;
use crate::api::HTTP_CLIENT;
use crate::db::PlaybackSettings;
use futures_util::future::LocalBoxFuture;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentApiError {
    #[error("content API base URL is not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(String),
    #[error("content API returned HTTP {0}")]
    Status(u16),
    #[error("could not decode content API response: {0}")]
    Decode(String),
    #[error("content API request timed out")]
    Timeout,
}

impl From<crate::platform::Elapsed> for ContentApiError {
    fn from(_: crate::platform::Elapsed) -> Self {
        Self::Timeout
    }
}

/// Content-API contract consumed by the media resolver.
pub trait ContentApi {
    /// Tracks whose title matches `title` (the CMS may return fuzzy matches).
    fn tracks_by_title<'a>(
        &'a self,
        title: &'a str,
    ) -> LocalBoxFuture<'a, Result<Vec<TrackMetadata>, ContentApiError>>;

    /// Every uploaded media file.
    fn list_audio_assets(&self) -> LocalBoxFuture<'_, Result<Vec<AssetMetadata>, ContentApiError>>;
}

/// Choose one track from a title query: exact case-insensitive title first,
/// otherwise the first result.
pub fn pick_track<'a>(tracks: &'a [TrackMetadata], title: &str) -> Option<&'a TrackMetadata> {
    let wanted = title.trim().to_lowercase();
    tracks
        .iter()
        .find(|track| track.title.trim().to_lowercase() == wanted)
        .or_else(|| tracks.first())
}

pub struct CmsClient {
    base_url: String,
    token: Option<String>,
}

impl CmsClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn from_settings(settings: &PlaybackSettings) -> Self {
        Self::new(
            settings.content_api_base.clone(),
            settings.content_api_token.clone(),
        )
    }

    fn tracks_url(&self, title: &str) -> String {
        format!(
            "{}/api/tracks?filters[title][$containsi]={}&populate[stems][populate]=*",
            self.base_url,
            urlencoding::encode(title.trim())
        )
    }

    fn assets_url(&self) -> String {
        format!("{}/api/upload/files", self.base_url)
    }

    async fn get_json(&self, url: &str) -> Result<Value, ContentApiError> {
        if self.base_url.is_empty() {
            return Err(ContentApiError::NotConfigured);
        }

        let mut request = HTTP_CLIENT.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ContentApiError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ContentApiError::Status(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ContentApiError::Decode(e.to_string()))
    }

    pub async fn fetch_tracks_by_title(
        &self,
        title: &str,
    ) -> Result<Vec<TrackMetadata>, ContentApiError> {
        let value = self.get_json(&self.tracks_url(title)).await?;
        Ok(parse_tracks(&value))
    }

    pub async fn fetch_audio_assets(&self) -> Result<Vec<AssetMetadata>, ContentApiError> {
        let value = self.get_json(&self.assets_url()).await?;
        Ok(parse_assets(&value))
    }
}

impl ContentApi for CmsClient {
    fn tracks_by_title<'a>(
        &'a self,
        title: &'a str,
    ) -> LocalBoxFuture<'a, Result<Vec<TrackMetadata>, ContentApiError>> {
        Box::pin(self.fetch_tracks_by_title(title))
    }

    fn list_audio_assets(&self) -> LocalBoxFuture<'_, Result<Vec<AssetMetadata>, ContentApiError>> {
        Box::pin(self.fetch_audio_assets())
    }
}

fn json_pick_value<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let object = value.as_object()?;
    for key in keys {
        if let Some(found) = object.get(*key) {
            if !found.is_null() {
                return Some(found);
            }
        }
    }
    None
}

fn json_pick_string(value: &Value, keys: &[&str]) -> Option<String> {
    let picked = json_pick_value(value, keys)?;
    match picked {
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Unwrap `{ "attributes": {...} }` entries.
fn attributes(value: &Value) -> &Value {
    value.get("attributes").unwrap_or(value)
}

/// Unwrap `{ "data": ... }` relation wrappers.
fn relation(value: &Value) -> &Value {
    match value.get("data") {
        Some(data) if value.as_object().map(|o| o.len() <= 2).unwrap_or(false) => data,
        _ => value,
    }
}

fn as_list(value: &Value) -> Vec<&Value> {
    match relation(value) {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn parse_file_reference(value: &Value) -> Option<FileReference> {
    let first = as_list(value).into_iter().next()?;
    let attrs = attributes(first);
    Some(FileReference {
        url: json_pick_string(attrs, &["url"])?,
        name: json_pick_string(attrs, &["name"]),
        mime: json_pick_string(attrs, &["mime"]),
    })
}

fn parse_stem(value: &Value) -> StemMetadata {
    let attrs = attributes(value);
    StemMetadata {
        id: json_pick_string(value, &["documentId", "id"]),
        name: json_pick_string(attrs, &["name"]),
        alt_name: json_pick_string(attrs, &["stemName", "stem_name", "title"]),
        url: json_pick_string(attrs, &["url", "audioUrl", "fileUrl"]),
        file: json_pick_value(attrs, &["file", "audio", "audioFile"]).and_then(parse_file_reference),
    }
}

fn parse_track(value: &Value) -> Option<TrackMetadata> {
    let attrs = attributes(value);
    let title = json_pick_string(attrs, &["title", "name"])?;
    let id = json_pick_string(value, &["documentId", "id"])
        .or_else(|| json_pick_string(attrs, &["slug"]))
        .unwrap_or_else(|| title.clone());
    let stems = json_pick_value(attrs, &["stems"])
        .map(|stems| as_list(stems).into_iter().map(parse_stem).collect())
        .unwrap_or_default();
    Some(TrackMetadata { id, title, stems })
}

pub fn parse_tracks(value: &Value) -> Vec<TrackMetadata> {
    as_list(value).into_iter().filter_map(parse_track).collect()
}

pub fn parse_assets(value: &Value) -> Vec<AssetMetadata> {
    as_list(value)
        .into_iter()
        .filter_map(|item| {
            let attrs = attributes(item);
            Some(AssetMetadata {
                name: json_pick_string(attrs, &["name"])?,
                url: json_pick_string(attrs, &["url"])?,
                mime: json_pick_string(attrs, &["mime"]),
            })
        })
        .collect()
}
