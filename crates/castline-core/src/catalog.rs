//! Track catalog builder
//!
//! Engines report variant tracks as loosely-typed objects. This module is
//! the boundary where they are validated and turned into the quality menu:
//! tracks without a vertical resolution are dropped, one entry is kept per
//! distinct height (the highest-bandwidth one), entries are ordered from
//! tallest to shortest and the `Auto` entry goes first.

use crate::types::{QualityVariant, VariantId};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Engine track as it crosses the boundary
#[derive(Debug, Clone, Deserialize)]
pub struct RawTrack {
    pub id: RawTrackId,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub bandwidth: Option<u64>,
}

/// Engines use numeric or string ids interchangeably
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawTrackId {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for RawTrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawTrackId::Number(n) => write!(f, "{}", n),
            RawTrackId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Published quality menu for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackCatalog {
    variants: Vec<QualityVariant>,
}

impl TrackCatalog {
    /// Catalog holding only the `Auto` entry
    pub fn automatic_only() -> Self {
        Self {
            variants: vec![QualityVariant::automatic()],
        }
    }

    /// Validate raw engine objects and build the catalog
    pub fn from_raw(tracks: &[serde_json::Value]) -> Self {
        let parsed = tracks.iter().filter_map(|value| {
            match RawTrack::deserialize(value) {
                Ok(track) => Some(track),
                Err(e) => {
                    debug!(error = %e, "Skipping malformed engine track");
                    None
                }
            }
        });
        Self::from_tracks(parsed)
    }

    /// Build the catalog from typed tracks
    pub fn from_tracks(tracks: impl IntoIterator<Item = RawTrack>) -> Self {
        let mut by_height: BTreeMap<u32, RawTrack> = BTreeMap::new();

        for track in tracks {
            let height = match track.height {
                Some(h) if h > 0 => h,
                _ => continue,
            };
            let replace = match by_height.get(&height) {
                Some(kept) => track.bandwidth.unwrap_or(0) > kept.bandwidth.unwrap_or(0),
                None => true,
            };
            if replace {
                by_height.insert(height, track);
            }
        }

        let mut variants = Vec::with_capacity(by_height.len() + 1);
        variants.push(QualityVariant::automatic());
        variants.extend(
            by_height
                .into_iter()
                .rev()
                .map(|(height, track)| QualityVariant::pinned(track.id.to_string(), height, track.bandwidth)),
        );

        Self { variants }
    }

    pub fn variants(&self) -> &[QualityVariant] {
        &self.variants
    }

    pub fn into_variants(self) -> Vec<QualityVariant> {
        self.variants
    }

    pub fn contains(&self, id: &VariantId) -> bool {
        self.variants.iter().any(|v| &v.id == id)
    }

    pub fn get(&self, id: &VariantId) -> Option<&QualityVariant> {
        self.variants.iter().find(|v| &v.id == id)
    }

    /// Look an entry up by its menu label ("720p", "Auto")
    pub fn find_by_label(&self, label: &str) -> Option<&QualityVariant> {
        self.variants
            .iter()
            .find(|v| v.label.eq_ignore_ascii_case(label.trim()))
    }

    /// Number of pinnable entries (excludes `Auto`)
    pub fn pinnable_len(&self) -> usize {
        self.variants.len() - 1
    }
}

impl Default for TrackCatalog {
    fn default() -> Self {
        Self::automatic_only()
    }
}
