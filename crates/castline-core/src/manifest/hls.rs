//! HLS (HTTP Live Streaming) manifest parser
//!
//! Master playlists yield one variant per `EXT-X-STREAM-INF`. A media
//! playlist used as the entry point yields a single variant with no
//! resolution, which leaves the quality menu at `Auto` only.

use super::{Manifest, ManifestParser, ManifestType, ManifestVariant};
use crate::{error::Error, Result};
use m3u8_rs::{MasterPlaylist, MediaPlaylist};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HLS manifest parser
#[derive(Debug, Default)]
pub struct HlsParser;

impl HlsParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse master playlist
    fn parse_master(&self, content: &str) -> Result<Manifest> {
        let parsed = m3u8_rs::parse_master_playlist_res(content.as_bytes())
            .map_err(|e| Error::ManifestParse(format!("Failed to parse HLS master: {:?}", e)))?;

        let variants = self.extract_variants(&parsed);
        if variants.is_empty() {
            return Err(Error::InvalidManifest("No variants found in master playlist".to_string()));
        }

        Ok(Manifest {
            manifest_type: ManifestType::Hls,
            variants,
            is_live: false,
            duration: None,
            default_kids: Vec::new(),
        })
    }

    fn extract_variants(&self, master: &MasterPlaylist) -> Vec<ManifestVariant> {
        master
            .variants
            .iter()
            .filter(|v| !v.is_i_frame)
            .enumerate()
            .map(|(idx, variant)| ManifestVariant {
                id: idx.to_string(),
                bandwidth: variant.bandwidth,
                width: variant.resolution.map(|r| r.width as u32),
                height: variant.resolution.map(|r| r.height as u32),
                codecs: variant.codecs.clone(),
                frame_rate: variant.frame_rate,
            })
            .collect()
    }

    /// Parse media playlist
    fn parse_media(&self, content: &str) -> Result<Manifest> {
        let parsed = m3u8_rs::parse_media_playlist_res(content.as_bytes())
            .map_err(|e| Error::ManifestParse(format!("Failed to parse HLS media: {:?}", e)))?;

        Ok(Manifest {
            manifest_type: ManifestType::Hls,
            variants: vec![default_variant()],
            is_live: !parsed.end_list,
            duration: media_duration(&parsed),
            default_kids: Vec::new(),
        })
    }
}

impl ManifestParser for HlsParser {
    fn parse(&self, content: &str, base_url: &Url) -> Result<Manifest> {
        debug!(url = %base_url, "Parsing HLS manifest");

        if !content.trim_start().starts_with("#EXTM3U") {
            return Err(Error::InvalidManifest("missing #EXTM3U header".to_string()));
        }

        if content.contains("#EXT-X-STREAM-INF") {
            self.parse_master(content)
        } else {
            self.parse_media(content)
        }
    }
}

/// Stand-in for a playlist that only has one rendition
fn default_variant() -> ManifestVariant {
    ManifestVariant {
        id: "default".to_string(),
        bandwidth: 0,
        width: None,
        height: None,
        codecs: None,
        frame_rate: None,
    }
}

fn media_duration(media: &MediaPlaylist) -> Option<Duration> {
    if !media.end_list {
        return None;
    }
    let total: f32 = media.segments.iter().map(|s| s.duration).sum();
    Duration::try_from_secs_f32(total).ok()
}
