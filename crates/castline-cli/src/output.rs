//! Output formatting for CLI

use castline_core::{MediaSource, PlayerStatus, QualityVariant, Surface};
use console::style;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Tabled)]
struct SourceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "DRM")]
    drm: String,
}

#[derive(Tabled)]
struct VariantRow {
    #[tabled(rename = "")]
    marker: String,
    #[tabled(rename = "Quality")]
    label: String,
    #[tabled(rename = "Track")]
    id: String,
    #[tabled(rename = "Bandwidth")]
    bandwidth: String,
}

fn format_bandwidth(bps: Option<u64>) -> String {
    match bps {
        Some(b) if b >= 1_000_000 => format!("{:.1} Mbps", b as f64 / 1_000_000.0),
        Some(b) => format!("{} kbps", b / 1_000),
        None => "-".to_string(),
    }
}

/// Render catalog entries
pub fn sources(sources: &[&MediaSource], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(&sources),
        OutputFormat::Table => {
            let rows: Vec<SourceRow> = sources
                .iter()
                .map(|s| SourceRow {
                    id: s.id().to_string(),
                    name: s.name().to_string(),
                    kind: s.kind().to_string(),
                    category: s.category().unwrap_or("-").to_string(),
                    drm: if s.clear_keys().is_some() { "clearkey" } else { "-" }.to_string(),
                })
                .collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Text => sources
            .iter()
            .map(|s| match s.category() {
                Some(category) => format!("  {} ({}) [{}]", s.name(), s.kind(), category),
                None => format!("  {} ({})", s.name(), s.kind()),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn variant_table(variants: &[QualityVariant], status: &PlayerStatus) -> String {
    let rows: Vec<VariantRow> = variants
        .iter()
        .map(|v| VariantRow {
            marker: if v.id == status.selected { "*" } else { "" }.to_string(),
            label: v.label.clone(),
            id: v.id.to_string(),
            bandwidth: format_bandwidth(v.bandwidth),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Render a controller snapshot
pub fn status(status: &PlayerStatus, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return to_json(status);
    }

    let mut lines = Vec::new();
    let state = match &status.error {
        Some(_) => style(status.state.to_string()).red().bold(),
        None => style(status.state.to_string()).green().bold(),
    };
    lines.push(format!("  State: {}", state));
    if let Some(source) = &status.source {
        lines.push(format!("  Source: {} ({})", source.name, source.kind));
    }
    if let Some(error) = &status.error {
        lines.push(format!("  Error: {}", style(error).red()));
    }
    lines.push(format!("  Muted: {}  Fullscreen: {}", status.muted, status.fullscreen));
    if let Surface::Embedded(frame) = &status.surface {
        lines.push(format!("  Embed: {}", frame.url));
    }
    if let Some(id) = status.session_id {
        lines.push(format!("  Session: {}", id));
    }

    if !status.variants.is_empty() {
        lines.push(String::new());
        match format {
            OutputFormat::Table => lines.push(variant_table(&status.variants, status)),
            _ => {
                lines.push("  Qualities:".to_string());
                for v in &status.variants {
                    let marker = if v.id == status.selected { "*" } else { " " };
                    lines.push(format!(
                        "   {} {:<6} {:>12}  track {}",
                        marker,
                        v.label,
                        format_bandwidth(v.bandwidth),
                        v.id
                    ));
                }
            }
        }
    }

    lines.join("\n")
}
