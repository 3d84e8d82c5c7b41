//! DASH (Dynamic Adaptive Streaming over HTTP) manifest parser
//!
//! Reads the MPD by attribute scanning, which is enough for the quality
//! menu: representation ids, bandwidth, dimensions, codecs, frame rate,
//! presentation type/duration and the `cenc:default_KID` key ids.

use super::{Manifest, ManifestParser, ManifestType, ManifestVariant};
use crate::{error::Error, Result};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// DASH MPD parser
#[derive(Debug, Default)]
pub struct DashParser;

impl DashParser {
    pub fn new() -> Self {
        Self
    }

    /// Extract representations from MPD, inheriting dimensions, codecs and
    /// frame rate from the enclosing `AdaptationSet`
    fn extract_representations(&self, content: &str) -> Result<Vec<ManifestVariant>> {
        let mut variants = Vec::new();
        let mut set_attrs: Option<&str> = None;

        for tag in tags(content) {
            match tag.name {
                "AdaptationSet" if !tag.self_closing => set_attrs = Some(tag.attrs),
                "/AdaptationSet" => set_attrs = None,
                "Representation" => {
                    let idx = variants.len();
                    let set = set_attrs;
                    let attr = |name: &str| {
                        extract_attr(tag.attrs, name)
                            .or_else(|| set.and_then(|set| extract_attr(set, name)))
                    };

                    variants.push(ManifestVariant {
                        id: extract_attr(tag.attrs, "id")
                            .unwrap_or_else(|| format!("rep_{}", idx)),
                        bandwidth: extract_attr(tag.attrs, "bandwidth")
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(0),
                        width: attr("width").and_then(|s| s.parse::<u32>().ok()),
                        height: attr("height").and_then(|s| s.parse::<u32>().ok()),
                        codecs: attr("codecs"),
                        frame_rate: attr("frameRate").and_then(|s| parse_frame_rate(&s)),
                    });
                }
                _ => {}
            }
        }

        if variants.is_empty() {
            return Err(Error::InvalidManifest("No representations found in MPD".to_string()));
        }

        Ok(variants)
    }
}

struct Tag<'a> {
    name: &'a str,
    attrs: &'a str,
    self_closing: bool,
}

/// Element tags in document order
fn tags(content: &str) -> impl Iterator<Item = Tag<'_>> {
    content.split('<').skip(1).filter_map(|chunk| {
        let end = chunk.find('>')?;
        let raw = &chunk[..end];
        let self_closing = raw.ends_with('/');
        let raw = raw.trim_end_matches('/');
        let name_end = raw.find(char::is_whitespace).unwrap_or(raw.len());
        Some(Tag {
            name: &raw[..name_end],
            attrs: &raw[name_end..],
            self_closing,
        })
    })
}

impl ManifestParser for DashParser {
    fn parse(&self, content: &str, base_url: &Url) -> Result<Manifest> {
        debug!(url = %base_url, "Parsing DASH manifest");

        if !content.contains("<MPD") {
            return Err(Error::InvalidManifest("missing <MPD> root".to_string()));
        }

        let mut default_kids: Vec<String> = Vec::new();
        for kid in extract_all_attrs(content, "cenc:default_KID") {
            if !default_kids.contains(&kid) {
                default_kids.push(kid);
            }
        }

        Ok(Manifest {
            manifest_type: ManifestType::Dash,
            variants: self.extract_representations(content)?,
            is_live: content.contains("type=\"dynamic\""),
            duration: extract_attr(content, "mediaPresentationDuration")
                .and_then(|s| parse_iso8601_duration(&s)),
            default_kids,
        })
    }
}

/// Extract attribute value from XML attributes string
fn extract_attr(attrs: &str, name: &str) -> Option<String> {
    extract_all_attrs(attrs, name).next()
}

/// Every value of `name="..."` in document order
fn extract_all_attrs<'a>(content: &'a str, name: &str) -> impl Iterator<Item = String> + 'a {
    let pattern = format!("{}=\"", name);
    let mut rest = content;
    std::iter::from_fn(move || loop {
        let start = rest.find(&pattern)?;
        // Reject matches that are the tail of a longer attribute name
        let preceded_ok = rest[..start]
            .chars()
            .last()
            .map(|c| c.is_whitespace())
            .unwrap_or(true);
        let value_start = start + pattern.len();
        let end = rest[value_start..].find('"')?;
        let value = rest[value_start..value_start + end].to_string();
        rest = &rest[value_start + end + 1..];
        if preceded_ok {
            return Some(value);
        }
    })
}

/// `30`, `29.97` or `30000/1001`
fn parse_frame_rate(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => s.parse().ok(),
    }
}

/// Parse ISO 8601 duration (PT1H2M3.4S format)
fn parse_iso8601_duration(s: &str) -> Option<Duration> {
    let s = s.trim_start_matches("PT").trim_start_matches('P');

    let mut total_seconds = 0.0;
    let mut current = String::new();

    for c in s.chars() {
        match c {
            'H' => {
                total_seconds += current.parse::<f64>().unwrap_or(0.0) * 3600.0;
                current.clear();
            }
            'M' => {
                total_seconds += current.parse::<f64>().unwrap_or(0.0) * 60.0;
                current.clear();
            }
            'S' => {
                total_seconds += current.parse::<f64>().unwrap_or(0.0);
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if total_seconds > 0.0 {
        Duration::try_from_secs_f64(total_seconds).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MPD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" xmlns:cenc="urn:mpeg:cenc:2013" type="static" mediaPresentationDuration="PT1H30M">
  <Period>
    <AdaptationSet mimeType="video/mp4">
      <ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011" value="cenc" cenc:default_KID="eb676abb-cb34-5e96-bbcf-616630f1a3da"/>
      <Representation id="v1080" bandwidth="6000000" width="1920" height="1080" codecs="avc1.640028" frameRate="30000/1001"/>
      <Representation id="v720" bandwidth="3000000" width="1280" height="720" codecs="avc1.4d401f" frameRate="25"/>
    </AdaptationSet>
    <AdaptationSet mimeType="audio/mp4">
      <ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011" value="cenc" cenc:default_KID="eb676abb-cb34-5e96-bbcf-616630f1a3da"/>
      <Representation id="audio" bandwidth="128000" codecs="mp4a.40.2"/>
    </AdaptationSet>
  </Period>
</MPD>"#;

    fn base() -> Url {
        Url::parse("https://cdn.example.com/vod/manifest.mpd").unwrap()
    }

    #[test]
    fn test_parse_representations() {
        let manifest = DashParser::new().parse(MPD, &base()).unwrap();
        assert_eq!(manifest.manifest_type, ManifestType::Dash);
        assert_eq!(manifest.variants.len(), 3);
        assert_eq!(manifest.variants[0].id, "v1080");
        assert_eq!(manifest.variants[0].height, Some(1080));
        assert!(manifest.variants[2].height.is_none());
        assert!(!manifest.is_live);
        assert_eq!(manifest.duration, Some(Duration::from_secs(5400)));
    }

    #[test]
    fn test_collects_unique_kids() {
        let manifest = DashParser::new().parse(MPD, &base()).unwrap();
        assert_eq!(manifest.default_kids, vec!["eb676abb-cb34-5e96-bbcf-616630f1a3da".to_string()]);
        assert!(manifest.is_encrypted());
    }

    #[test]
    fn test_attribute_name_must_match_whole() {
        let attrs = r#" cenc:default_KID="bb" KID="cc""#;
        assert_eq!(extract_attr(attrs, "KID"), Some("cc".to_string()));
        assert_eq!(extract_attr(attrs, "default_KID"), None);
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("1/0"), None);
    }

    #[test]
    fn test_parse_iso8601_duration() {
        assert_eq!(parse_iso8601_duration("PT1H30M"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_iso8601_duration("PT45.5S"), Some(Duration::from_secs_f64(45.5)));
        assert_eq!(parse_iso8601_duration("PT2H5M10S"), Some(Duration::from_secs(7510)));
    }

    #[test]
    fn test_out_of_range_duration_is_dropped() {
        assert_eq!(parse_iso8601_duration("PT99999999999999999999S"), None);
        let mpd = MPD.replace("PT1H30M", "PT99999999999999999999S");
        let manifest = DashParser::new().parse(&mpd, &base()).unwrap();
        assert_eq!(manifest.duration, None);
        assert_eq!(manifest.variants.len(), 3);
    }

    #[test]
    fn test_inherits_adaptation_set_attributes() {
        let mpd = r#"<MPD type="static">
  <Period>
    <AdaptationSet mimeType="video/mp4" width="1280" height="720" frameRate="25" codecs="avc1.4d401f">
      <SegmentTemplate media="$RepresentationID$/$Number$.m4s"/>
      <Representation id="hi" bandwidth="3000000">
        <RepresentationIndex sourceURL="hi.sidx"/>
      </Representation>
      <Representation id="lo" bandwidth="1500000" width="640" height="360"/>
    </AdaptationSet>
    <AdaptationSet mimeType="audio/mp4">
      <Representation id="audio" bandwidth="128000"/>
    </AdaptationSet>
  </Period>
</MPD>"#;
        let manifest = DashParser::new().parse(mpd, &base()).unwrap();
        let ids: Vec<&str> = manifest.variants.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["hi", "lo", "audio"]);
        assert_eq!(manifest.variants[0].height, Some(720));
        assert_eq!(manifest.variants[0].frame_rate, Some(25.0));
        assert_eq!(manifest.variants[0].codecs.as_deref(), Some("avc1.4d401f"));
        assert_eq!(manifest.variants[1].height, Some(360));
        assert!(manifest.variants[2].height.is_none());
    }

    #[test]
    fn test_rejects_empty_mpd() {
        let result = DashParser::new().parse("<MPD></MPD>", &base());
        assert!(matches!(result, Err(Error::InvalidManifest(_))));
    }
}
