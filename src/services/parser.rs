use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use crate::models::Channel;

lazy_static! {
    /// `key="value"` pairs on an EXTINF line (keys may be dashed).
    static ref ATTR_REGEX: Regex = Regex::new(r#"([\w-]+)="([^"]*)""#).unwrap();
    static ref DURATION_REGEX: Regex = Regex::new(r"^\s*-?\d+").unwrap();
}

/// Attribute keys the parser lifts into dedicated `Channel` fields.
const RECOGNIZED_KEYS: &[&str] = &[
    "tvg-id",
    "tvg-name",
    "tvg-logo",
    "group-title",
    "x-tvg-url",
    "url-tvg",
];

/// URL schemes accepted for stream endpoints.
const STREAM_SCHEMES: &[&str] = &["http", "https", "rtmp", "rtsp", "mms", "mmsh", "rtp"];

/// Path suffixes that mark a URL as an image, document or web page rather
/// than a stream.
const REJECTED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".ico", ".svg", ".webp", ".html", ".htm", ".php",
    ".asp", ".aspx", ".jsp", ".css", ".js", ".json", ".xml", ".txt", ".pdf", ".doc", ".docx",
    ".zip", ".rar", ".7z", ".tar", ".gz",
];

/// How many lines after an `#EXTINF` are searched for the stream URL.
const URL_SCAN_WINDOW: usize = 5;

/// Parsed `#EXTINF` line data.
#[derive(Debug, Default)]
struct ExtinfData {
    attributes: BTreeMap<String, String>,
    display_name: Option<String>,
}

/// Maximally forgiving extended-M3U parser.
///
/// Malformed entries are skipped silently; whatever can be salvaged from a
/// playlist is returned in source order.
pub struct PlaylistParser;

impl PlaylistParser {
    pub fn parse(text: &str) -> Vec<Channel> {
        let lines: Vec<&str> = text.lines().collect();
        let global_epg = lines
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
            .filter(|l| starts_with_ignore_case(l, "#EXTM3U"))
            .and_then(|header| {
                let mut attrs = extract_attributes(header);
                attrs.remove("x-tvg-url").or_else(|| attrs.remove("url-tvg"))
            })
            .filter(|v| !v.is_empty());

        let mut channels: Vec<Channel> = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i].trim();
            if line.is_empty() || !starts_with_ignore_case(line, "#EXTINF") {
                i += 1;
                continue;
            }

            let extinf = parse_extinf(line);
            let mut group_override: Option<String> = None;
            let mut found: Option<(usize, String)> = None;

            for j in (i + 1)..=(i + URL_SCAN_WINDOW).min(lines.len().saturating_sub(1)) {
                let candidate = lines[j].trim();
                if candidate.is_empty() {
                    continue;
                }
                if starts_with_ignore_case(candidate, "#EXTGRP:") {
                    group_override = Some(candidate["#EXTGRP:".len()..].trim().to_string());
                    continue;
                }
                if candidate.starts_with('#') {
                    continue;
                }
                let unquoted = candidate.trim_matches('"').trim_matches('\'');
                if is_valid_stream_url(unquoted) {
                    found = Some((j, unquoted.to_string()));
                }
                // First non-comment line settles the entry either way.
                break;
            }

            let Some((url_index, link)) = found else {
                i += 1;
                continue;
            };

            let mut attributes = extinf.attributes;
            let inline_epg = attributes
                .remove("x-tvg-url")
                .or_else(|| attributes.remove("url-tvg"))
                .filter(|v| !v.is_empty());
            let tvg_id = attributes.remove("tvg-id").filter(|v| !v.is_empty());
            let tvg_name = attributes.remove("tvg-name").filter(|v| !v.is_empty());
            let tvg_logo = attributes.remove("tvg-logo").filter(|v| !v.is_empty());
            let group_title = attributes.remove("group-title").unwrap_or_default();

            let name = extinf
                .display_name
                .clone()
                .filter(|n| !n.is_empty())
                .or_else(|| tvg_name.clone())
                .unwrap_or_else(|| line.to_string());

            let mut channel = Channel::new(channels.len(), name, link);
            channel.group_name = group_override.unwrap_or(group_title);
            channel.tvg_id = tvg_id;
            channel.tvg_name = tvg_name;
            channel.tvg_logo = tvg_logo;
            channel.epg_url = inline_epg.or_else(|| global_epg.clone());
            channel.extra_attributes = attributes;
            channels.push(channel);

            i = url_index + 1;
        }

        channels
    }
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.len() >= prefix.len()
        && line.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn extract_attributes(segment: &str) -> BTreeMap<String, String> {
    ATTR_REGEX
        .captures_iter(segment)
        .map(|caps| (caps[1].to_lowercase(), caps[2].to_string()))
        .collect()
}

/// Split an `#EXTINF` line into attributes and the free-form display name.
///
/// The display name starts at the first comma that is not inside a quoted
/// attribute value, so names like `tvg-name="News, Local"` survive intact.
fn parse_extinf(line: &str) -> ExtinfData {
    let content = line.get("#EXTINF:".len()..).unwrap_or("");
    let after_duration = match DURATION_REGEX.find(content) {
        Some(m) => &content[m.end()..],
        None => content,
    };

    let mut in_quotes = false;
    let mut split_at = None;
    for (idx, ch) in after_duration.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                split_at = Some(idx);
                break;
            }
            _ => {}
        }
    }

    let (header, display_name) = match split_at {
        Some(idx) => (
            &after_duration[..idx],
            Some(after_duration[idx + 1..].trim().to_string()),
        ),
        None => (after_duration, None),
    };

    ExtinfData {
        attributes: extract_attributes(header),
        display_name,
    }
}

/// Accept only absolute URLs that plausibly point at a media stream.
pub fn is_valid_stream_url(candidate: &str) -> bool {
    let Ok(url) = Url::parse(candidate) else {
        return false;
    };
    if !STREAM_SCHEMES.contains(&url.scheme()) {
        return false;
    }

    let Some(host) = url.host_str() else {
        return false;
    };
    if host.len() < 3 || matches!(host, "localhost" | "127.0.0.1" | "0.0.0.0") {
        return false;
    }

    let path = url.path().to_lowercase();
    !REJECTED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entry_with_group_override() {
        let text = "#EXTM3U\n\
                    #EXTINF:-1 tvg-id=\"a1\" group-title=\"News\",Alpha HD\n\
                    #EXTGRP:Sports\n\
                    http://host.example/a\n";
        let channels = PlaylistParser::parse(text);
        assert_eq!(channels.len(), 1);
        let ch = &channels[0];
        assert_eq!(ch.name, "Alpha HD");
        assert_eq!(ch.group_name, "Sports");
        assert_eq!(ch.tvg_id.as_deref(), Some("a1"));
        assert_eq!(ch.link, "http://host.example/a");
    }

    #[test]
    fn collects_unknown_attributes() {
        let text = "#EXTINF:-1 tvg-id=\"x\" catchup=\"shift\" tvg-shift=\"2\",Beta\n\
                    http://host.example/b\n";
        let channels = PlaylistParser::parse(text);
        assert_eq!(channels[0].extra_attributes.get("catchup").unwrap(), "shift");
        assert_eq!(channels[0].extra_attributes.get("tvg-shift").unwrap(), "2");
        assert!(!channels[0].extra_attributes.contains_key("tvg-id"));
    }

    #[test]
    fn display_name_survives_comma_in_attribute() {
        let text = "#EXTINF:-1 tvg-name=\"News, Local\",Gamma\nhttp://host.example/c\n";
        let channels = PlaylistParser::parse(text);
        assert_eq!(channels[0].name, "Gamma");
        assert_eq!(channels[0].tvg_name.as_deref(), Some("News, Local"));
    }

    #[test]
    fn falls_back_to_tvg_name_when_comma_missing() {
        let text = "#EXTINF:-1 tvg-name=\"Delta One\"\nhttp://host.example/d\n";
        let channels = PlaylistParser::parse(text);
        assert_eq!(channels[0].name, "Delta One");
    }

    #[test]
    fn global_epg_applies_when_no_inline_value() {
        let text = "#EXTM3U x-tvg-url=\"http://epg.example/guide.xml\"\n\
                    #EXTINF:-1,One\nhttp://host.example/1\n\
                    #EXTINF:-1 x-tvg-url=\"http://other.example/e.xml\",Two\nhttp://host.example/2\n";
        let channels = PlaylistParser::parse(text);
        assert_eq!(
            channels[0].epg_url.as_deref(),
            Some("http://epg.example/guide.xml")
        );
        assert_eq!(
            channels[1].epg_url.as_deref(),
            Some("http://other.example/e.xml")
        );
    }

    #[test]
    fn rejects_non_stream_urls() {
        assert!(!is_valid_stream_url("http://host.example/logo.png"));
        assert!(!is_valid_stream_url("ftp://host.example/file.ts"));
        assert!(!is_valid_stream_url("http://localhost/stream"));
        assert!(!is_valid_stream_url("http://h/stream"));
        assert!(!is_valid_stream_url("not a url"));
        assert!(is_valid_stream_url("rtsp://cam.example/live"));
        assert!(is_valid_stream_url("http://host.example/live.m3u8"));
    }

    #[test]
    fn entry_without_url_is_dropped() {
        let text = "#EXTINF:-1,Orphan\n#EXTINF:-1,Kept\nhttp://host.example/k\n";
        let channels = PlaylistParser::parse(text);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Kept");
        assert_eq!(channels[0].id, 0);
    }

    #[test]
    fn url_line_with_quotes_is_unwrapped() {
        let text = "#EXTINF:-1,Quoted\n\"http://host.example/q\"\n";
        let channels = PlaylistParser::parse(text);
        assert_eq!(channels[0].link, "http://host.example/q");
    }

    #[test]
    fn scan_window_skips_comments_and_blanks() {
        let text = "#EXTINF:-1,Spaced\n\n#EXTVLCOPT:network-caching=1000\n\nhttp://host.example/s\n";
        let channels = PlaylistParser::parse(text);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].link, "http://host.example/s");
    }

    #[test]
    fn ids_are_dense_in_source_order() {
        let text = "#EXTINF:-1,A\nhttp://host.example/a\n\
                    #EXTINF:-1,B\nhttp://xy/broken\n\
                    #EXTINF:-1,C\nhttp://host.example/c\n";
        let channels = PlaylistParser::parse(text);
        let ids: Vec<usize> = channels.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(channels[1].name, "C");
    }
}
