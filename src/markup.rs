//! Provider text to chat markup.
//!
//! The front end renders assistant messages as HTML. This module turns the
//! markdown-ish text providers return into that markup: emphasis, numbered
//! and bulleted lists, paragraphs, and the "sources" block appended to web
//! search answers. The list and sources shapes live in minijinja templates so
//! escaping is handled in one place.

use crate::message::Citation;

use minijinja::{Environment, HtmlEscape, context};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

const LIST_TEMPLATE: &str = r#"<{{ tag }} class="{{ class }}"{% if start %} start="{{ start }}"{% endif %}>{% for item in items %}<li>{{ item|safe }}</li>{% endfor %}</{{ tag }}>"#;

const SOURCES_TEMPLATE: &str = r#"
<div class="sources-section">
  <div class="sources-header">
    <svg xmlns="http://www.w3.org/2000/svg" width="16" height="16" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><circle cx="12" cy="12" r="10"></circle><line x1="12" y1="8" x2="12" y2="16"></line><line x1="8" y1="12" x2="16" y2="12"></line></svg>
    <span>Sources</span>
  </div>
  <div class="citations-container">
{%- for source in sources %}
    <div class="citation">
      <a href="{{ source.url }}" target="_blank" rel="noopener noreferrer" class="citation-link">
        <span class="citation-number">{{ source.marker }}</span>
        <span class="citation-title">{{ source.title }}</span>
      </a>
      <div class="citation-url">{{ source.url }}</div>
    </div>
{%- endfor %}
  </div>
</div>"#;

/// Templates use the `.html` suffix so minijinja auto-escapes interpolations.
static TEMPLATES: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template("list.html", LIST_TEMPLATE)
        .expect("hardcoded list template");
    env.add_template("sources.html", SOURCES_TEMPLATE)
        .expect("hardcoded sources template");
    env
});

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").expect("hardcoded regex"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^\s*][^*\n]*?)\*").expect("hardcoded regex"));
static HAS_NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\d+\.\s").expect("hardcoded regex"));
static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\.\s+(.*)$").expect("hardcoded regex"));
static BULLET_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[•*]\s+(.*)$").expect("hardcoded regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("hardcoded regex"));
static BLOCK_HTML: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^<(p|ol|ul|li|div|h[1-6]|blockquote|pre|table|section)[\s>]")
        .expect("hardcoded regex")
});

const CIRCLED: [&str; 10] = ["①", "②", "③", "④", "⑤", "⑥", "⑦", "⑧", "⑨", "⑩"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListStyle {
    Numbered,
    Bulleted,
    Plain,
}

/// Convert raw provider text into chat markup.
pub fn format_response(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }

    let style = if HAS_NUMBERED_LINE.is_match(text) {
        ListStyle::Numbered
    } else if text.contains("• ") || text.contains("* ") {
        ListStyle::Bulleted
    } else {
        ListStyle::Plain
    };

    BLANK_LINES
        .split(text)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| render_block(block, style))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Marker shown next to the citation at `index` (zero based).
pub fn citation_marker(index: usize) -> String {
    CIRCLED
        .get(index)
        .map(|marker| marker.to_string())
        .unwrap_or_else(|| format!("[{}]", index + 1))
}

/// Web search answer with its sources block. Without citations the content is
/// returned untouched.
pub fn format_web_search_result(content: &str, citations: &[Citation]) -> String {
    if citations.is_empty() {
        return content.to_string();
    }

    let body = BLANK_LINES
        .split(content.trim())
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| {
            if BLOCK_HTML.is_match(block) {
                emphasize(block)
            } else {
                format!("<p>{}</p>", emphasize(block))
            }
        })
        .collect::<String>();
    let body = if body.is_empty() {
        "<p></p>".to_string()
    } else {
        body
    };

    #[derive(Serialize)]
    struct Source<'a> {
        marker: String,
        title: &'a str,
        url: &'a str,
    }

    let sources: Vec<Source> = citations
        .iter()
        .enumerate()
        .map(|(index, citation)| Source {
            marker: citation_marker(index),
            title: &citation.title,
            url: &citation.url,
        })
        .collect();

    let block = render("sources.html", context! { sources }).unwrap_or_else(|| {
        sources_fallback(citations)
    });

    format!("{body}{block}")
}

fn emphasize(text: &str) -> String {
    let bold = BOLD.replace_all(text, "<strong>$1</strong>");
    ITALIC.replace_all(&bold, "<em>$1</em>").into_owned()
}

fn render_block(block: &str, style: ListStyle) -> String {
    if BLOCK_HTML.is_match(block) {
        return emphasize(block);
    }

    let item_pattern: Option<&Regex> = match style {
        ListStyle::Numbered => Some(&*NUMBERED_ITEM),
        ListStyle::Bulleted => Some(&*BULLET_ITEM),
        ListStyle::Plain => None,
    };
    let Some(item_pattern) = item_pattern else {
        return paragraph(block);
    };

    let mut lead_in: Vec<&str> = Vec::new();
    let mut items: Vec<String> = Vec::new();
    let mut start: Option<u64> = None;

    for line in block.lines() {
        let line = line.trim_end();
        if let Some(captures) = item_pattern.captures(line) {
            let (number, text) = match style {
                ListStyle::Numbered => (
                    captures.get(1).and_then(|m| m.as_str().parse::<u64>().ok()),
                    captures.get(2).map_or("", |m| m.as_str()),
                ),
                ListStyle::Bulleted | ListStyle::Plain => {
                    (None, captures.get(1).map_or("", |m| m.as_str()))
                }
            };
            if items.is_empty() {
                start = number;
            }
            items.push(emphasize(text.trim()));
        } else if let Some(last) = items.last_mut() {
            // Wrapped continuation of the previous item.
            last.push(' ');
            last.push_str(&emphasize(line.trim()));
        } else {
            lead_in.push(line);
        }
    }

    if items.is_empty() {
        return paragraph(block);
    }

    let (tag, class) = match style {
        ListStyle::Numbered => ("ol", "numbered-list"),
        ListStyle::Bulleted | ListStyle::Plain => ("ul", "bullet-list"),
    };
    let start = start.filter(|number| *number != 1);

    let list = render(
        "list.html",
        context! { tag, class, start, items => &items },
    )
    .unwrap_or_else(|| {
        let inner: String = items.iter().map(|item| format!("<li>{item}</li>")).collect();
        format!("<{tag} class=\"{class}\">{inner}</{tag}>")
    });

    if lead_in.is_empty() {
        list
    } else {
        format!("{}{list}", paragraph(&lead_in.join("\n")))
    }
}

fn paragraph(block: &str) -> String {
    let lines: Vec<String> = block.lines().map(|line| emphasize(line.trim())).collect();
    format!("<p>{}</p>", lines.join("<br>"))
}

fn render(name: &str, ctx: minijinja::Value) -> Option<String> {
    let result = TEMPLATES
        .get_template(name)
        .and_then(|template| template.render(ctx));
    match result {
        Ok(rendered) => Some(rendered),
        Err(error) => {
            tracing::warn!(%error, template = name, "failed to render markup template");
            None
        }
    }
}

fn sources_fallback(citations: &[Citation]) -> String {
    let entries: Vec<String> = citations
        .iter()
        .enumerate()
        .map(|(index, citation)| {
            format!(
                "<div class=\"citation\">{} {}</div>",
                citation_marker(index),
                HtmlEscape(&citation.url)
            )
        })
        .collect();
    format!("<div class=\"sources-section\">{}</div>", entries.join(""))
}
