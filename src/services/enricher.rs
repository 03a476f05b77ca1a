use lazy_static::lazy_static;
use regex::Regex;
use sha1::{Digest, Sha1};

use crate::models::Channel;
use crate::services::normalizer::normalize_url;

lazy_static! {
    /// Category keyword tables, checked in order; first hit wins.
    static ref CATEGORY_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("News", Regex::new(r"(?i)\b(news|noticias|nachrichten|24/7 news)\b").unwrap()),
        ("Sports", Regex::new(r"(?i)\b(sport|sports|espn|futbol|football|soccer|f1|golf|tennis|ufc)\b").unwrap()),
        ("Movies", Regex::new(r"(?i)\b(movie|movies|cinema|cine|film|films)\b").unwrap()),
        ("Kids", Regex::new(r"(?i)\b(kids|cartoon|cartoons|junior|baby)\b").unwrap()),
        ("Music", Regex::new(r"(?i)\b(music|mtv|radio|hits)\b").unwrap()),
        ("Documentary", Regex::new(r"(?i)\b(doc|docu|documentary|discovery|history|nat ?geo)\b").unwrap()),
        ("Entertainment", Regex::new(r"(?i)\b(entertainment|comedy|series|shows?)\b").unwrap()),
    ];

    /// Language hints like `[EN]`, `|PT|` or a `FR:` prefix in channel names.
    static ref LANGUAGE_TAG: Regex =
        Regex::new(r"(?i)(?:\[|\|\s*|\b)([a-z]{2})(?:\]|\s*\||:)").unwrap();

    /// Bracketed junk stripped by the rename pass.
    static ref BRACKET_GROUPS: Regex = Regex::new(r"[\[\(][^\]\)]*[\]\)]").unwrap();
    static ref MULTI_SPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// ISO-639-1 codes this tool bothers to spell out.
const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("en", "English"),
    ("de", "German"),
    ("fr", "French"),
    ("es", "Spanish"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("ru", "Russian"),
    ("tr", "Turkish"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
];

/// Fills the cosmetic metadata fields: category, language and content hash.
///
/// Pure table lookups over name and group; nothing here touches the network
/// or the probing machinery.
pub struct Enricher;

impl Enricher {
    pub fn enrich(channels: Vec<Channel>) -> Vec<Channel> {
        channels
            .into_iter()
            .map(|mut channel| {
                if channel.category.is_none() {
                    channel.category = detect_category(&channel.name, &channel.group_name);
                }
                if channel.language.is_none() {
                    channel.language = detect_language(&channel.name);
                }
                channel.content_hash = Some(content_hash(&channel.link));
                channel
            })
            .collect()
    }

    /// Metadata-only cleanup of display names; links are never touched.
    pub fn rename(channels: Vec<Channel>) -> Vec<Channel> {
        channels
            .into_iter()
            .map(|mut channel| {
                if !channel.name.starts_with("#EXTINF") {
                    channel.name = clean_display_name(&channel.name);
                }
                channel
            })
            .collect()
    }
}

fn detect_category(name: &str, group: &str) -> Option<String> {
    let haystack = format!("{group} {name}");
    CATEGORY_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&haystack))
        .map(|(label, _)| (*label).to_string())
}

fn detect_language(name: &str) -> Option<String> {
    let caps = LANGUAGE_TAG.captures(name)?;
    let code = caps[1].to_lowercase();
    LANGUAGE_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, label)| (*label).to_string())
}

/// Stable identity for a channel across runs: SHA-1 of the normalized link.
fn content_hash(link: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(normalize_url(link).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn clean_display_name(name: &str) -> String {
    let cleaned = BRACKET_GROUPS.replace_all(name, " ");
    MULTI_SPACE.replace_all(&cleaned, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_prefers_group_keywords() {
        assert_eq!(
            detect_category("Alpha One", "UK | Sports").as_deref(),
            Some("Sports")
        );
        assert_eq!(
            detect_category("CNN News HD", "").as_deref(),
            Some("News")
        );
        assert_eq!(detect_category("Alpha One", ""), None);
    }

    #[test]
    fn language_tags_resolve_to_names() {
        assert_eq!(detect_language("[DE] Das Erste").as_deref(), Some("German"));
        assert_eq!(detect_language("TF1 | FR | HD").as_deref(), Some("French"));
        assert_eq!(detect_language("Plain Channel"), None);
        assert_eq!(detect_language("[ZZ] Unknown"), None);
    }

    #[test]
    fn content_hash_ignores_tracking_params() {
        let a = content_hash("http://h/ch?utm_source=x&a=1");
        let b = content_hash("http://h/ch/?a=1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
    }

    #[test]
    fn rename_strips_bracketed_tags() {
        let input = vec![Channel::new(0, "[VIP] Alpha (backup)  HD", "http://h/a")];
        let renamed = Enricher::rename(input);
        assert_eq!(renamed[0].name, "Alpha HD");
    }

    #[test]
    fn enrich_fills_hash_for_every_channel() {
        let input = vec![
            Channel::new(0, "Alpha News", "http://h/a"),
            Channel::new(1, "Beta", "http://h/b"),
        ];
        let enriched = Enricher::enrich(input);
        assert!(enriched.iter().all(|c| c.content_hash.is_some()));
        assert_eq!(enriched[0].category.as_deref(), Some("News"));
    }
}
