//! Storage-origin to CDN URL rewriting.

use crate::db::PlaybackSettings;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CdnRewriter {
    media_base: String,
    storage_origins: Vec<String>,
    cdn_base: String,
}

impl CdnRewriter {
    pub fn new(
        media_base: impl Into<String>,
        storage_origins: Vec<String>,
        cdn_base: impl Into<String>,
    ) -> Self {
        Self {
            media_base: media_base.into().trim_end_matches('/').to_string(),
            storage_origins: storage_origins
                .into_iter()
                .map(|origin| origin.trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            cdn_base: cdn_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &PlaybackSettings) -> Self {
        Self::new(
            settings.media_base.clone(),
            settings.storage_origins.clone(),
            settings.cdn_base.clone(),
        )
    }

    pub fn media_base(&self) -> &str {
        &self.media_base
    }

    pub fn cdn_base(&self) -> &str {
        &self.cdn_base
    }

    /// Absolutize relative upload paths and swap any storage origin for the
    /// CDN base. URLs on other hosts pass through unchanged.
    pub fn to_public_url(&self, raw: &str) -> String {
        let raw = raw.trim();
        let absolute = if let Some(rest) = raw.strip_prefix("//") {
            format!("https://{rest}")
        } else if raw.starts_with('/') && !self.media_base.is_empty() {
            format!("{}{}", self.media_base, raw)
        } else {
            raw.to_string()
        };

        if self.cdn_base.is_empty() {
            return absolute;
        }

        for origin in &self.storage_origins {
            if let Some(rest) = absolute.strip_prefix(origin.as_str()) {
                if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') {
                    return format!("{}{}", self.cdn_base, rest);
                }
            }
        }

        absolute
    }
}
