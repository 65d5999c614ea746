//! Plain-text and JSON rendering of inventory records

use crate::inventory::{ResourceGroupRecord, ResourceRecord};
use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use std::collections::HashMap;

/// Widest a table cell may grow before it is truncated
const MAX_CELL_WIDTH: usize = 38;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

pub fn render_resource_groups(records: &[ResourceGroupRecord], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(records),
        OutputFormat::Table => Ok(render_table(
            &["NAME", "LOCATION", "SUBSCRIPTION", "RESOURCES", "TAGS"],
            records
                .iter()
                .map(|r| {
                    vec![
                        r.name.clone(),
                        r.location.clone(),
                        r.subscription_id.clone(),
                        r.resource_count.to_string(),
                        format_tags(&r.tags),
                    ]
                })
                .collect(),
        )),
    }
}

pub fn render_resources(records: &[ResourceRecord], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(records),
        OutputFormat::Table => Ok(render_table(
            &["NAME", "TYPE", "LOCATION", "SKU", "STATUS", "TAGS"],
            records
                .iter()
                .map(|r| {
                    vec![
                        r.name.clone(),
                        r.resource_type.clone(),
                        r.location.clone(),
                        r.sku.clone().unwrap_or_else(|| "-".to_string()),
                        r.status.clone().unwrap_or_else(|| "-".to_string()),
                        format_tags(&r.tags),
                    ]
                })
                .collect(),
        )),
    }
}

fn to_json<T: Serialize>(records: &[T]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Tags as `key=value` pairs ordered by key
pub fn format_tags(tags: &HashMap<String, String>) -> String {
    if tags.is_empty() {
        return "-".to_string();
    }

    let mut pairs: Vec<(&String, &String)> = tags.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .map(|row| row.iter().map(|c| truncate_string(c, MAX_CELL_WIDTH)).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = Vec::with_capacity(rows.len() + 1);
    out.push(render_line(headers.iter().copied(), &widths));
    for row in &rows {
        out.push(render_line(row.iter().map(String::as_str), &widths));
    }
    out.join("\n")
}

fn render_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, width)| pad(cell, *width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

fn pad(cell: &str, width: usize) -> String {
    let fill = width.saturating_sub(cell.chars().count());
    format!("{}{}", cell, " ".repeat(fill))
}

/// Truncate string for display (Unicode-safe)
fn truncate_string(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count > max_len {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    } else {
        s.to_string()
    }
}
