use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Trailing quality markers stripped from channel names before comparison.
    static ref QUALITY_SUFFIX: Regex =
        Regex::new(r"(?i)\s*(hd|sd|fhd|uhd|4k|1080p|720p|480p|360p)\s*$").unwrap();
    /// Anything that is not a word character or whitespace.
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").unwrap();
    static ref MULTI_SPACE: Regex = Regex::new(r"\s+").unwrap();

    /// Names too generic to identify a channel on their own.
    static ref GENERIC_NAMES: HashSet<&'static str> = [
        "channel", "test", "live", "stream", "tv", "video", "audio", "radio",
        "news", "sports", "movie", "music", "entertainment",
    ]
    .into_iter()
    .collect();
}

/// Query parameters that vary between fetches of the same stream.
const VOLATILE_PARAM_PREFIXES: &[&str] = &[
    "utm_",
    "session",
    "sid=",
    "token=",
    "t=",
    "ts=",
    "timestamp=",
    "_=",
    "random=",
    "r=",
    "cache=",
    "nocache=",
];

/// Canonicalize a stream URL for equality checks.
///
/// Folds case, a trailing slash, default ports, a `www.` host prefix and
/// volatile query parameters, and sorts the surviving parameters so that
/// ordering differences do not defeat deduplication.
pub fn normalize_url(url: &str) -> String {
    let lowered = url.trim().to_lowercase();
    if lowered.is_empty() {
        return String::new();
    }

    let (base, query) = match lowered.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (lowered.as_str(), None),
    };
    let base = base.strip_suffix('/').unwrap_or(base);

    let mut result = base.to_string();
    if let Some(query) = query {
        let mut params: Vec<&str> = query
            .split('&')
            .filter(|p| !p.is_empty())
            .filter(|p| {
                !VOLATILE_PARAM_PREFIXES
                    .iter()
                    .any(|prefix| p.starts_with(prefix))
            })
            .collect();
        params.sort_unstable();
        if !params.is_empty() {
            result.push('?');
            result.push_str(&params.join("&"));
        }
    }

    result
        .replace(":80/", "/")
        .replace(":443/", "/")
        .replace("://www.", "://")
}

/// Canonicalize a channel name for equality checks.
pub fn normalize_name(name: &str) -> String {
    let mut s = name;
    // Some feeds carry whole EXTINF lines where a display name belongs.
    if s.len() >= 7 && s.as_bytes()[..7].eq_ignore_ascii_case(b"#extinf") {
        s = match s.split_once(',') {
            Some((_, rest)) => rest,
            None => s,
        };
    }

    let lowered = s.trim().to_lowercase();
    let stripped = QUALITY_SUFFIX.replace(&lowered, "");
    let cleaned = NON_WORD.replace_all(&stripped, " ");
    MULTI_SPACE.replace_all(&cleaned, " ").trim().to_string()
}

/// A normalized name identifies a channel only when it is long enough and not
/// one of the generic placeholders half the feeds out there use.
pub fn is_meaningful_name(normalized: &str) -> bool {
    normalized.len() > 3 && !GENERIC_NAMES.contains(normalized)
}
