//! Manifest parsing for the headless engine

mod dash;
mod hls;

pub use dash::DashParser;
pub use hls::HlsParser;

use crate::Result;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Manifest types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ManifestType {
    Hls,
    Dash,
}

/// One variant (HLS) or representation (DASH)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestVariant {
    pub id: String,
    /// Bandwidth in bits per second
    pub bandwidth: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codecs: Option<String>,
    pub frame_rate: Option<f64>,
}

impl ManifestVariant {
    /// Engine-style track object, as handed to the catalog builder
    pub fn to_track(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "bandwidth": self.bandwidth,
            "width": self.width,
            "height": self.height,
            "codecs": self.codecs,
            "frameRate": self.frame_rate,
        })
    }
}

/// Parsed manifest data
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub manifest_type: ManifestType,
    pub variants: Vec<ManifestVariant>,
    pub is_live: bool,
    /// Total duration (for VOD)
    pub duration: Option<Duration>,
    /// Key ids the content is protected with (`cenc:default_KID`)
    pub default_kids: Vec<String>,
}

impl Manifest {
    pub fn is_encrypted(&self) -> bool {
        !self.default_kids.is_empty()
    }
}

/// Trait for manifest parsers
pub trait ManifestParser: Send + Sync {
    /// Parse manifest text fetched from `base_url`
    fn parse(&self, content: &str, base_url: &Url) -> Result<Manifest>;
}

/// Detect manifest type from URL or content
pub fn detect_manifest_type(url: &Url, content: Option<&str>) -> ManifestType {
    let path = url.path().to_lowercase();
    if path.ends_with(".m3u8") || path.ends_with(".m3u") {
        return ManifestType::Hls;
    }
    if path.ends_with(".mpd") {
        return ManifestType::Dash;
    }

    if let Some(content) = content {
        if content.contains("#EXTM3U") {
            return ManifestType::Hls;
        }
        if content.contains("<MPD") || content.contains("urn:mpeg:dash") {
            return ManifestType::Dash;
        }
    }

    // Default to HLS
    ManifestType::Hls
}

/// Create appropriate parser for a manifest type
pub fn create_parser(manifest_type: ManifestType) -> Box<dyn ManifestParser> {
    match manifest_type {
        ManifestType::Hls => Box::new(HlsParser::new()),
        ManifestType::Dash => Box::new(DashParser::new()),
    }
}

/// Detect and parse in one step
pub fn parse_manifest(url: &Url, content: &str) -> Result<Manifest> {
    create_parser(detect_manifest_type(url, Some(content))).parse(content, url)
}
