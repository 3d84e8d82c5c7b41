//! Catalog file loading and search

use anyhow::Context;
use castline_core::MediaSource;
use serde::Deserialize;
use std::path::Path;

/// Accept a bare array or an object wrapping it
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<MediaSource>),
    Wrapped {
        #[serde(alias = "channels", alias = "sources")]
        items: Vec<MediaSource>,
    },
}

/// Read and validate a catalog file
pub fn load(path: &Path) -> anyhow::Result<Vec<MediaSource>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading catalog {}", path.display()))?;
    parse(&raw).with_context(|| format!("parsing catalog {}", path.display()))
}

pub fn parse(raw: &str) -> anyhow::Result<Vec<MediaSource>> {
    let file: CatalogFile = serde_json::from_str(raw)?;
    Ok(match file {
        CatalogFile::List(items) | CatalogFile::Wrapped { items } => items,
    })
}

/// Split a query on commas into lower-cased, non-empty terms
pub fn search_terms(query: &str) -> Vec<String> {
    query
        .split(',')
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect()
}

/// Entries whose name or category contains any of the terms
pub fn search<'a>(sources: &'a [MediaSource], query: Option<&str>) -> Vec<&'a MediaSource> {
    let terms = query.map(search_terms).unwrap_or_default();
    if terms.is_empty() {
        return sources.iter().collect();
    }

    sources
        .iter()
        .filter(|source| {
            let name = source.name().to_lowercase();
            let category = source.category().unwrap_or_default().to_lowercase();
            terms
                .iter()
                .any(|term| name.contains(term.as_str()) || category.contains(term.as_str()))
        })
        .collect()
}

/// Look an entry up by id, then by case-insensitive name
pub fn find<'a>(sources: &'a [MediaSource], key: &str) -> Option<&'a MediaSource> {
    sources
        .iter()
        .find(|s| s.id() == key)
        .or_else(|| sources.iter().find(|s| s.name().eq_ignore_ascii_case(key.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        { "name": "ESPN", "type": "dash", "manifestUri": "https://cdn.example.com/espn.mpd", "category": "Sports" },
        { "name": "Sky News", "type": "hls", "manifestUri": "https://cdn.example.com/sky.m3u8", "category": "News" },
        { "id": "lofi", "name": "Lofi Radio", "type": "youtube", "embedUrl": "https://www.youtube.com/embed/abc", "category": "Music" }
    ]"#;

    fn names(found: &[&MediaSource]) -> Vec<String> {
        found.iter().map(|s| s.name().to_string()).collect()
    }

    #[test]
    fn test_search_terms() {
        assert_eq!(search_terms(" Sports, ,NEWS "), vec!["sports", "news"]);
        assert!(search_terms(" , ").is_empty());
    }

    #[test]
    fn test_search_any_term_name_or_category() {
        let sources = parse(CATALOG).unwrap();
        assert_eq!(names(&search(&sources, Some("espn, music"))), vec!["ESPN", "Lofi Radio"]);
        assert_eq!(names(&search(&sources, Some("NEWS"))), vec!["Sky News"]);
        assert!(search(&sources, Some("cooking")).is_empty());
    }

    #[test]
    fn test_blank_query_returns_everything() {
        let sources = parse(CATALOG).unwrap();
        assert_eq!(search(&sources, None).len(), 3);
        assert_eq!(search(&sources, Some("  ,")).len(), 3);
    }

    #[test]
    fn test_find_by_id_or_name() {
        let sources = parse(CATALOG).unwrap();
        assert_eq!(find(&sources, "sky-news").map(|s| s.name()), Some("Sky News"));
        assert_eq!(find(&sources, "lofi radio").map(|s| s.id()), Some("lofi"));
        assert!(find(&sources, "hbo").is_none());
    }

    #[test]
    fn test_wrapped_catalog() {
        let wrapped = format!(r#"{{ "channels": {} }}"#, CATALOG);
        assert_eq!(parse(&wrapped).unwrap().len(), 3);
    }
}
