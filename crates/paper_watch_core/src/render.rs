//! crates/paper_watch_core/src/render.rs
//!
//! Builds the HTML chat messages sent to users.

use crate::domain::Paper;

/// Escapes text for chat HTML (Telegram accepts `&lt;`, `&gt;`, `&amp;`, `&quot;`).
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn display_year(paper: &Paper) -> String {
    paper
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// One delivered paper. `url` is the summary page, or the raw link as fallback.
pub fn new_paper_message(topic: &str, paper: &Paper, url: &str) -> String {
    format!(
        "🔔 New paper on {}\n\n• <a href=\"{}\">{}</a> ({})",
        escape_html(topic),
        escape_html(url),
        escape_html(&paper.title),
        display_year(paper)
    )
}

pub fn nothing_new_message(topic: &str) -> String {
    format!("📭 No new papers on «{}» yet.", escape_html(topic))
}
