use serde::{Deserialize, Serialize};

/// A sellable track and the stems the CMS lists for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrackMetadata {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub stems: Vec<StemMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StemMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Secondary display name some entries carry instead of (or besides) `name`.
    #[serde(default, alias = "stemName", alias = "title")]
    pub alt_name: Option<String>,
    #[serde(default, alias = "audioUrl", alias = "fileUrl")]
    pub url: Option<String>,
    #[serde(default)]
    pub file: Option<FileReference>,
}

impl StemMetadata {
    /// Case-insensitive match against the primary or alternate name.
    pub fn matches_name(&self, stem_name: &str) -> bool {
        let wanted = stem_name.trim().to_lowercase();
        if wanted.is_empty() {
            return false;
        }
        [self.name.as_deref(), self.alt_name.as_deref()]
            .into_iter()
            .flatten()
            .any(|candidate| candidate.trim().to_lowercase() == wanted)
    }

    /// The direct URL field, else the nested file reference's URL.
    pub fn direct_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .or_else(|| self.file.as_ref().map(|file| file.url.as_str()))
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FileReference {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime: Option<String>,
}

/// An uploaded media-library file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AssetMetadata {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub mime: Option<String>,
}

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a", "aac"];

impl AssetMetadata {
    /// Audio by MIME type, or by extension when the MIME type is absent.
    pub fn is_audio(&self) -> bool {
        match self.mime.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(mime) => mime.to_ascii_lowercase().starts_with("audio/"),
            None => {
                let name = self.name.to_ascii_lowercase();
                name.rsplit_once('.')
                    .map(|(_, ext)| AUDIO_EXTENSIONS.contains(&ext))
                    .unwrap_or(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stem(name: Option<&str>, alt: Option<&str>) -> StemMetadata {
        StemMetadata {
            name: name.map(str::to_string),
            alt_name: alt.map(str::to_string),
            ..StemMetadata::default()
        }
    }

    #[test]
    fn stem_name_match_is_case_insensitive_on_either_field() {
        assert!(stem(Some("Drums"), None).matches_name("drums"));
        assert!(stem(None, Some("Lead Vocals")).matches_name("lead vocals"));
        assert!(!stem(Some("Bass"), Some("Low End")).matches_name("Drums"));
        assert!(!stem(Some("Bass"), None).matches_name("  "));
    }

    #[test]
    fn direct_url_prefers_field_then_file_reference() {
        let mut s = stem(Some("Drums"), None);
        assert_eq!(s.direct_url(), None);
        s.file = Some(FileReference {
            url: "/uploads/drums.mp3".to_string(),
            ..FileReference::default()
        });
        assert_eq!(s.direct_url(), Some("/uploads/drums.mp3"));
        s.url = Some("https://cdn.example.com/d.mp3".to_string());
        assert_eq!(s.direct_url(), Some("https://cdn.example.com/d.mp3"));
        s.url = Some("   ".to_string());
        assert_eq!(s.direct_url(), None);
    }

    #[test]
    fn audio_detection_uses_mime_then_extension() {
        let asset = |name: &str, mime: Option<&str>| AssetMetadata {
            name: name.to_string(),
            url: String::new(),
            mime: mime.map(str::to_string),
        };
        assert!(asset("x.bin", Some("audio/mpeg")).is_audio());
        assert!(!asset("cover.mp3", Some("image/png")).is_audio());
        assert!(asset("drums.MP3", None).is_audio());
        assert!(!asset("notes.txt", None).is_audio());
    }
}
