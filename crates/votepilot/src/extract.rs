//! Result-page extraction.
//!
//! Turns raw result-page HTML into a [`PollSnapshot`]. Two strategies, in
//! order: the poll widget's feedback markup, then a plain-text pattern
//! over the de-tagged page for layouts that dropped the widget classes.
//! Whatever either finds is validated, deduplicated case-insensitively,
//! and sorted by percentage descending.

use pacing::{PollSnapshot, ResultEntry};
use regex::Regex;
use std::collections::HashSet;

/// Shortest believable entrant name; filters markup debris.
const MIN_NAME_LEN: usize = 4;

/// Parse a result page into ranked entries plus the server-reported total.
pub fn extract_results(html: &str) -> PollSnapshot {
    let mut entries = widget_entries(html);
    if entries.is_empty() {
        entries = text_pattern_entries(html);
    }

    let mut seen = HashSet::new();
    entries.retain(|e| e.name.len() >= MIN_NAME_LEN && seen.insert(e.name.to_lowercase()));
    entries.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));

    PollSnapshot::new(entries, total_votes(html))
}

/// Strategy 1: the widget's feedback groups. Each result renders an
/// answer-text element ("Name, year, school, sport") followed by a
/// feedback-per element ("23.58%").
fn widget_entries(html: &str) -> Vec<ResultEntry> {
    let re = Regex::new(
        r"(?is)pds-answer-text[^>]*>\s*([^<]+?)\s*<.{0,600}?pds-feedback-per[^>]*>\s*(\d+(?:\.\d+)?)\s*%",
    )
    .expect("widget pattern");

    re.captures_iter(html)
        .filter_map(|c| entry_from(&c[1], &c[2]))
        .collect()
}

/// Strategy 2: de-tag the page and look for "First Last, year, school ...
/// NN.NN%" runs in the visible text.
fn text_pattern_entries(html: &str) -> Vec<ResultEntry> {
    let text = strip_markup(html);
    let re = Regex::new(
        r"([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+),\s+[^,%]*,\s*[^0-9%]*?(\d+(?:\.\d+)?)\s*%",
    )
    .expect("text pattern");

    re.captures_iter(&text)
        .filter_map(|c| entry_from(&c[1], &c[2]))
        .collect()
}

fn entry_from(raw_name: &str, raw_pct: &str) -> Option<ResultEntry> {
    // Keep only the name proper: "Cutler Whitaker, sr., Mountain" → "Cutler Whitaker"
    let name = raw_name.split(',').next()?.trim();
    let percentage: f64 = raw_pct.parse().ok()?;
    if name.len() < 3 || !(0.0..=100.0).contains(&percentage) {
        return None;
    }
    Some(ResultEntry::new(name, percentage))
}

/// Drop script/style bodies, then every remaining tag.
fn strip_markup(html: &str) -> String {
    let scripts = Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>").expect("script pattern");
    let tags = Regex::new(r"<[^>]+>").expect("tag pattern");
    let without_scripts = scripts.replace_all(html, " ");
    tags.replace_all(&without_scripts, " ").into_owned()
}

/// "Total Votes: 58,836" anywhere in the visible text.
fn total_votes(html: &str) -> Option<u64> {
    let re = Regex::new(r"(?i)total\s+votes?\s*:?\s*([\d,]+)").expect("total pattern");
    let text = strip_markup(html);
    let raw = re.captures(&text)?.get(1)?.as_str().replace(',', "");
    raw.parse().ok()
}
