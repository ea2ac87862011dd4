// Common data models for media extraction

use std::collections::BTreeMap;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::element::ElementRef;
use super::errors::ExtractionError;

lazy_static! {
    static ref STATUS_URL: Regex = Regex::new(
        r"^(?:https?://(?:www\.|mobile\.)?(?:x|twitter)\.com)?/([A-Za-z0-9_]{1,15})/status/(\d+)"
    )
    .unwrap();
}

/// Kind of media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Gif,
}

/// One extracted media item, in the order the strategy produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub original_url: String,
    pub filename: String,
    pub thumbnail_url: Option<String>,
    pub content_id: Option<String>,
    pub author_handle: Option<String>,
}

impl MediaDescriptor {
    pub fn new(id: impl Into<String>, url: impl Into<String>, media_type: MediaType) -> Self {
        let url = url.into();
        let filename = filename_from_url(&url);
        Self {
            id: id.into(),
            original_url: url.clone(),
            url,
            media_type,
            filename,
            thumbnail_url: None,
            content_id: None,
            author_handle: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail_url: Option<String>) -> Self {
        self.thumbnail_url = thumbnail_url;
        self
    }

    /// Attach the owning content unit
    pub fn with_content(mut self, info: &ContentInfo) -> Self {
        self.content_id = Some(info.content_id.clone());
        self.author_handle = Some(info.author_handle.clone());
        self
    }
}

fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("media")
        .to_string()
}

/// The logical content unit (one post) that media items belong to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentInfo {
    pub content_id: String,
    pub author_handle: String,
    pub content_url: String,
}

impl ContentInfo {
    pub fn new(
        content_id: impl Into<String>,
        author_handle: impl Into<String>,
        content_url: impl Into<String>,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            author_handle: author_handle.into(),
            content_url: content_url.into(),
        }
    }

    /// Parse an absolute or site-relative status link (`/{handle}/status/{id}`)
    pub fn from_content_url(url: &str) -> Option<Self> {
        let caps = STATUS_URL.captures(url.trim())?;
        let handle = caps.get(1)?.as_str();
        let id = caps.get(2)?.as_str();
        Some(Self::new(
            id,
            handle,
            format!("https://x.com/{}/status/{}", handle, id),
        ))
    }
}

/// Options supplied with every extraction request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionOptions {
    /// Whether video and gif items should be produced
    pub include_videos: bool,
    /// Whether strategies should drop URLs that do not look like media
    pub validate_urls: bool,
    /// Deadline hint for strategies; the chain itself never times out
    pub timeout: Option<Duration>,
    /// Reuse a live content-keyed result before running any strategy
    pub prefer_content_cache: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            include_videos: true,
            validate_urls: true,
            timeout: None,
            prefer_content_cache: false,
        }
    }
}

impl ExtractionOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_prefer_content_cache(mut self, enabled: bool) -> Self {
        self.prefer_content_cache = enabled;
        self
    }
}

/// Everything a strategy gets to look at
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub element: ElementRef,
    pub options: ExtractionOptions,
    pub content_info: Option<ContentInfo>,
}

impl ExtractionContext {
    pub fn new(element: ElementRef, options: ExtractionOptions) -> Self {
        Self {
            element,
            options,
            content_info: None,
        }
    }

    pub fn with_content_info(mut self, content_info: Option<ContentInfo>) -> Self {
        self.content_info = content_info;
        self
    }
}

/// Metadata describing how a result was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub source_type: String,
    pub strategy_name: String,
    /// Wall-clock time of extraction, unix milliseconds
    pub extracted_at_ms: u64,
    pub success_strategy: Option<String>,
    pub attempted_strategies: Vec<String>,
    pub cache_hit: bool,
    pub debug: BTreeMap<String, serde_json::Value>,
}

impl ExtractionMetadata {
    pub fn new(source_type: impl Into<String>, strategy_name: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            strategy_name: strategy_name.into(),
            extracted_at_ms: now_unix_ms(),
            success_strategy: None,
            attempted_strategies: Vec::new(),
            cache_hit: false,
            debug: BTreeMap::new(),
        }
    }
}

/// Outcome of an extraction, success or failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub items: Vec<MediaDescriptor>,
    pub selected_index: usize,
    pub metadata: ExtractionMetadata,
    pub content_info: Option<ContentInfo>,
    pub errors: Vec<ExtractionError>,
}

impl ExtractionResult {
    /// Successful result; an empty item list is not a success
    pub fn success(
        items: Vec<MediaDescriptor>,
        selected_index: usize,
        source_type: impl Into<String>,
        strategy_name: impl Into<String>,
    ) -> Self {
        let selected_index = selected_index.min(items.len().saturating_sub(1));
        Self {
            success: !items.is_empty(),
            items,
            selected_index,
            metadata: ExtractionMetadata::new(source_type, strategy_name),
            content_info: None,
            errors: Vec::new(),
        }
    }

    pub fn failure(
        error: ExtractionError,
        source_type: impl Into<String>,
        strategy_name: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            items: Vec::new(),
            selected_index: 0,
            metadata: ExtractionMetadata::new(source_type, strategy_name),
            content_info: None,
            errors: vec![error],
        }
    }

    pub fn with_content_info(mut self, content_info: Option<ContentInfo>) -> Self {
        self.content_info = content_info;
        self
    }

    pub fn with_debug(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.debug.insert(key.to_string(), value);
        self
    }

    /// Copy of this result marked as served from a cache tier
    pub fn as_cache_hit(&self, tier: &str) -> Self {
        let mut copy = self.clone();
        copy.metadata.cache_hit = true;
        copy.metadata
            .debug
            .insert("cacheTier".to_string(), serde_json::Value::from(tier));
        copy
    }

    pub fn content_id(&self) -> Option<&str> {
        self.content_info.as_ref().map(|c| c.content_id.as_str())
    }
}

pub(crate) fn now_unix_ms() -> u64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    u64::try_from(nanos / 1_000_000).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_info_from_absolute_url() {
        let info = ContentInfo::from_content_url("https://twitter.com/rustlang/status/1234567890?s=20")
            .unwrap();
        assert_eq!(info.content_id, "1234567890");
        assert_eq!(info.author_handle, "rustlang");
        assert_eq!(info.content_url, "https://x.com/rustlang/status/1234567890");
    }

    #[test]
    fn test_content_info_from_relative_url() {
        let info = ContentInfo::from_content_url("/someone_1/status/42/photo/1").unwrap();
        assert_eq!(info.content_id, "42");
        assert_eq!(info.author_handle, "someone_1");
    }

    #[test]
    fn test_content_info_rejects_other_links() {
        assert!(ContentInfo::from_content_url("https://example.com/a/status/1").is_none());
        assert!(ContentInfo::from_content_url("/home").is_none());
    }

    #[test]
    fn test_filename_from_url() {
        let item = MediaDescriptor::new(
            "m1",
            "https://pbs.twimg.com/media/ABC.jpg?format=jpg&name=orig",
            MediaType::Image,
        );
        assert_eq!(item.filename, "ABC.jpg");
        assert_eq!(item.original_url, item.url);
    }

    #[test]
    fn test_empty_success_is_not_success() {
        let result = ExtractionResult::success(Vec::new(), 3, "dom", "dom");
        assert!(!result.success);
        assert_eq!(result.selected_index, 0);
    }

    #[test]
    fn test_cache_hit_copy_leaves_original_untouched() {
        let items = vec![MediaDescriptor::new("a", "https://x/a.jpg", MediaType::Image)];
        let original = ExtractionResult::success(items, 0, "api", "api");
        let copy = original.as_cache_hit("success");

        assert!(copy.metadata.cache_hit);
        assert!(!original.metadata.cache_hit);
        assert_eq!(copy.items, original.items);
    }

    #[test]
    fn test_media_type_serializes_as_type_field() {
        let item = MediaDescriptor::new("v", "https://x/v.mp4", MediaType::Video);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "video");
    }
}
