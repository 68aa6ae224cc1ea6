//! HTML sanitizing of submitted column values.
//!
//! Plain columns lose every tag. Markdown columns keep the tags on the
//! safelist, stripped of attributes (except a safe `href` on links).
//! Script and style elements are removed with their content in both
//! cases, and any `<` or `>` left outside a kept tag is escaped.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Tags markdown columns keep unless the registry is configured otherwise.
pub const DEFAULT_MARKDOWN_SAFELIST: &[&str] = &[
    "b", "i", "em", "strong", "code", "pre", "blockquote", "ul", "ol", "li", "p", "br", "a", "h1",
    "h2", "h3", "h4", "h5", "h6",
];

struct Patterns {
    script: Regex,
    style: Regex,
    tag: Regex,
    href: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                script: Regex::new(r"(?is)<script\b[^>]*>.*?(</script\s*>|$)").ok()?,
                style: Regex::new(r"(?is)<style\b[^>]*>.*?(</style\s*>|$)").ok()?,
                tag: Regex::new(r"(?s)<(/?)([a-zA-Z][a-zA-Z0-9]*)\b([^>]*)>").ok()?,
                href: Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).ok()?,
            })
        })
        .as_ref()
}

/// Escape markup characters; used when the tag patterns are unavailable.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Tag stripper with a configurable markdown safelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitizer {
    markdown_tags: BTreeSet<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MARKDOWN_SAFELIST.iter().copied())
    }
}

impl Sanitizer {
    /// Create a sanitizer keeping `markdown_tags` in markdown columns.
    pub fn new<I, S>(markdown_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markdown_tags: markdown_tags
                .into_iter()
                .map(|t| t.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn markdown_tags(&self) -> impl Iterator<Item = &str> {
        self.markdown_tags.iter().map(String::as_str)
    }

    /// Remove every tag.
    pub fn strip(&self, text: &str) -> String {
        self.clean(text, |_| false)
    }

    /// Remove all but the safelisted tags.
    pub fn markdown(&self, text: &str) -> String {
        self.clean(text, |tag| self.markdown_tags.contains(tag))
    }

    fn clean(&self, text: &str, keep: impl Fn(&str) -> bool) -> String {
        let Some(p) = patterns() else {
            tracing::warn!("Sanitizer patterns unavailable, escaping markup");
            return escape(text);
        };
        // Removing a tag can splice its neighbours into a new one, so the
        // removal passes run until nothing changes.
        let mut current = text.to_string();
        loop {
            let next = p.script.replace_all(&current, "");
            let next = p.style.replace_all(&next, "");
            let next = p
                .tag
                .replace_all(&next, |caps: &regex::Captures<'_>| {
                    if keep(&caps[2].to_ascii_lowercase()) {
                        caps[0].to_string()
                    } else {
                        String::new()
                    }
                })
                .into_owned();
            if next == current {
                break;
            }
            current = next;
        }

        let mut out = String::with_capacity(current.len());
        let mut last = 0;
        for caps in p.tag.captures_iter(&current) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&escape_angles(&current[last..whole.start()]));
            out.push_str(&normalize_tag(&caps));
            last = whole.end();
        }
        out.push_str(&escape_angles(&current[last..]));
        out
    }
}

/// Rebuild a kept tag without its attributes.
fn normalize_tag(caps: &regex::Captures<'_>) -> String {
    let closing = &caps[1];
    let name = caps[2].to_ascii_lowercase();
    if closing.is_empty() && name == "a" {
        if let Some(href) = safe_href(&caps[3]) {
            return format!("<a href=\"{}\">", href);
        }
    }
    format!("<{}{}>", closing, name)
}

/// Angle brackets left outside kept tags.
fn escape_angles(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}

fn safe_href(attrs: &str) -> Option<String> {
    let caps = patterns()?.href.captures(attrs)?;
    let url = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("data:") || lower.starts_with("vbscript:") {
        return None;
    }
    Some(url.replace('"', "&quot;"))
}
