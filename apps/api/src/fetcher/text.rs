//! HTML-to-text helpers for the selector cascade.

use scraper::{ElementRef, Html, Selector};

use super::FetchError;

const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Validates every selector up front so a bad configuration fails at startup.
pub fn validate_selectors(selectors: &[String]) -> Result<(), FetchError> {
    for raw in selectors {
        Selector::parse(raw).map_err(|_| FetchError::InvalidSelector(raw.clone()))?;
    }
    Ok(())
}

/// Applies the selector cascade to `html`.
///
/// Returns the text of the first element matched by the first selector that yields
/// non-empty text, falling back to the whole `<body>`. `None` when the page has no
/// visible text at all. Selectors that fail to parse are skipped.
pub fn extract_text(html: &str, selectors: &[String]) -> Option<String> {
    let document = Html::parse_document(html);

    for raw in selectors {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        for element in document.select(&selector) {
            let text = clean_text(&visible_text(element));
            if !text.is_empty() {
                tracing::debug!("Selector '{raw}' matched {} chars", text.len());
                return Some(text);
            }
        }
    }

    let body = Selector::parse("body").ok()?;
    let text = document
        .select(&body)
        .next()
        .map(|element| clean_text(&visible_text(element)))
        .unwrap_or_else(|| clean_text(&visible_text(document.root_element())));

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Text of `element` and its descendants, skipping script/style content.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .map(|parent| HIDDEN_ELEMENTS.contains(&parent.name()))
            .unwrap_or(false);
        if !hidden {
            out.push_str(text);
            out.push('\n');
        }
    }
    out
}

/// Collapses runs of whitespace inside lines and drops empty lines.
pub fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncates to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
