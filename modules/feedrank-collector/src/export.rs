//! Export a ranked result as JSON or CSV.

use anyhow::Result;
use serde::Serialize;

use feedrank_common::Item;

/// Maximum text length carried into exports.
const EXPORT_TEXT_LIMIT: usize = 500;

#[derive(Debug, Serialize)]
pub struct ExportRow {
    pub rank: usize,
    pub author: String,
    pub text: String,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub url: String,
}

pub fn export_rows(items: &[Item]) -> Vec<ExportRow> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| ExportRow {
            rank: index + 1,
            author: item.author_name.clone(),
            text: truncate_chars(&item.text, EXPORT_TEXT_LIMIT),
            likes: item.like_count,
            comments: item.comment_count,
            shares: item.share_count,
            url: item.id.permalink(),
        })
        .collect()
}

pub fn to_json(items: &[Item]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&export_rows(items))?)
}

/// RFC-4180 CSV with a BOM so spreadsheet tools pick up the encoding.
pub fn to_csv(items: &[Item]) -> String {
    let mut out = String::from("\u{feff}rank,author,text,likes,comments,shares,url\n");
    for row in export_rows(items) {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            row.rank,
            csv_quote(&row.author),
            csv_quote(&row.text),
            row.likes,
            row.comments,
            row.shares,
            csv_quote(&row.url),
        ));
    }
    out
}

fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit).collect();
    truncated.push_str("...");
    truncated
}
