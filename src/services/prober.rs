use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{HeaderMap, ACCEPT, CONNECTION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::models::{ProbeResult, StreamInfo};

/// IPTV servers routinely block unknown clients; claim to be VLC.
pub const PROBE_USER_AGENT: &str = "VLC/3.0.18 LibVLC/3.0.18";

/// Time allowed for body reads once response headers have arrived.
const SNIFF_DEADLINE: Duration = Duration::from_secs(8);
/// Reading stops as soon as this many bytes have arrived.
const SNIFF_TARGET_BYTES: usize = 512;
/// Hard cap on buffered body bytes.
const SNIFF_MAX_BYTES: usize = 4096;
/// Only the leading slice is scanned for textual signatures.
const SNIFF_SCAN_BYTES: usize = 2048;
const MAX_READ_ATTEMPTS: usize = 3;

/// Sleeps between the up-to-three probe attempts per URL.
const RETRY_DELAYS: [Duration; 2] = [Duration::from_millis(100), Duration::from_millis(200)];

/// Media types accepted when byte signatures are inconclusive.
const RECOGNIZED_MEDIA_TYPES: &[&str] = &[
    "video/mp2t",
    "video/mp4",
    "video/mpeg",
    "video/x-mpegurl",
    "video/x-ms-asf",
    "video/x-msvideo",
    "video/x-flv",
    "video/webm",
    "video/3gpp",
    "video/quicktime",
    "audio/mpeg",
    "audio/aac",
    "audio/mp4",
    "audio/x-mpegurl",
    "audio/x-scpls",
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "application/dash+xml",
    "application/octet-stream",
    "binary/octet-stream",
];

lazy_static! {
    static ref MANIFEST_RESOLUTION: Regex = Regex::new(r"(?i)RESOLUTION=(\d+)x(\d+)").unwrap();
    static ref MANIFEST_BANDWIDTH: Regex = Regex::new(r"(?i)BANDWIDTH=(\d+)").unwrap();
    static ref MANIFEST_CODECS: Regex = Regex::new(r#"(?i)CODECS="([^"]*)""#).unwrap();
}

/// Container magic recognized in the sniffed prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerSignature {
    MpegTs,
    Id3,
    AacAdts,
    Mp3Sync,
    Flv,
    HlsManifest,
}

/// Probe seam; the scheduler only depends on this trait so tests can swap in
/// scripted verdicts.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Classify one URL. Never errors: every failure mode is a dead stream.
    async fn probe(&self, url: &str, cancel: &CancellationToken) -> ProbeResult;
}

/// Probes a URL with a single GET, accepting it as a live stream when either
/// the first kilobytes carry known container magic or the headers declare a
/// recognized media type.
pub struct StreamProber {
    client: Client,
}

impl StreamProber {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn probe_once(&self, url: &str, cancel: &CancellationToken) -> ProbeResult {
        let request = self
            .client
            .get(url)
            .header(USER_AGENT, PROBE_USER_AGENT)
            .header(ACCEPT, "*/*")
            .header(CONNECTION, "keep-alive")
            .header("Icy-MetaData", "1");

        let response = tokio::select! {
            _ = cancel.cancelled() => return ProbeResult::dead(),
            result = request.send() => match result {
                Ok(response) => response,
                Err(err) => {
                    trace!(url, error = %err, "probe transport failed");
                    return ProbeResult::dead();
                }
            },
        };

        let status = response.status();
        if !status.is_success() || status == StatusCode::NO_CONTENT {
            trace!(url, %status, "probe rejected by status");
            return ProbeResult::dead();
        }

        let header_info = stream_info_from_headers(response.headers());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut buf: Vec<u8> = Vec::with_capacity(SNIFF_MAX_BYTES);
        let mut body = response.bytes_stream();
        let deadline = Instant::now() + SNIFF_DEADLINE;
        let mut attempts = 0;
        while attempts < MAX_READ_ATTEMPTS && buf.len() < SNIFF_TARGET_BYTES {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let next = tokio::select! {
                _ = cancel.cancelled() => return ProbeResult::dead(),
                chunk = timeout(remaining, body.next()) => chunk,
            };
            match next {
                Ok(Some(Ok(chunk))) => {
                    let room = SNIFF_MAX_BYTES - buf.len();
                    buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
                    if buf.len() >= SNIFF_MAX_BYTES {
                        break;
                    }
                }
                // Mid-body failures and end-of-stream both end the sniff;
                // whatever arrived is judged on its own.
                Ok(Some(Err(_))) | Ok(None) => break,
                Err(_) => break,
            }
        }

        if buf.is_empty() {
            trace!(url, "probe read no body bytes");
            return ProbeResult::dead();
        }
        if !is_live_stream(&buf, content_type.as_deref()) {
            return ProbeResult::dead();
        }

        let mut info = header_info;
        match detect_signature(&buf) {
            Some(ContainerSignature::HlsManifest) => {
                info = info.merged_over(stream_info_from_manifest(&ascii_prefix(&buf, buf.len())));
            }
            Some(signature) => {
                info = info.merged_over(stream_info_from_signature(signature));
            }
            None => {}
        }

        ProbeResult {
            alive: true,
            stream_info: (!info.is_empty()).then_some(info),
        }
    }
}

#[async_trait]
impl Probe for StreamProber {
    async fn probe(&self, url: &str, cancel: &CancellationToken) -> ProbeResult {
        let mut last = ProbeResult::dead();
        for attempt in 0..=RETRY_DELAYS.len() {
            if attempt > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return last,
                    _ = sleep(RETRY_DELAYS[attempt - 1]) => {}
                }
            }
            if cancel.is_cancelled() {
                return last;
            }
            last = self.probe_once(url, cancel).await;
            if last.alive {
                break;
            }
        }
        last
    }
}

/// Acceptance predicate over the sniffed bytes and the declared media type.
pub fn is_live_stream(buf: &[u8], content_type: Option<&str>) -> bool {
    if looks_like_error_page(buf) {
        return false;
    }
    if detect_signature(buf).is_some() {
        return true;
    }
    if is_mostly_binary(buf) {
        return true;
    }
    content_type.map(media_type_recognized).unwrap_or(false)
}

/// ASCII-decode a prefix of the buffer.
///
/// Every byte maps to one char; unlike UTF-8 decoding this can never trip
/// over binary payloads, and all scanned signatures are 7-bit.
fn ascii_prefix(buf: &[u8], limit: usize) -> String {
    buf.iter().take(limit).map(|&b| b as char).collect()
}

fn looks_like_error_page(buf: &[u8]) -> bool {
    let text = ascii_prefix(buf, SNIFF_SCAN_BYTES).to_ascii_lowercase();
    let text = text.trim_start();
    text.starts_with("<!doctype")
        || text.starts_with("<html")
        || (text.starts_with("<?xml") && text.contains("<html"))
        || text.starts_with("404")
        || text.starts_with("403")
        || text.starts_with("error")
        || text.contains("not found")
        || text.contains("access denied")
}

fn detect_signature(buf: &[u8]) -> Option<ContainerSignature> {
    if buf.first() == Some(&0x47) {
        return Some(ContainerSignature::MpegTs);
    }
    if buf.starts_with(b"ID3") {
        return Some(ContainerSignature::Id3);
    }
    if buf.len() >= 2 && buf[0] == 0xFF {
        if buf[1] & 0xF0 == 0xF0 {
            return Some(ContainerSignature::AacAdts);
        }
        if buf[1] & 0xE0 == 0xE0 {
            return Some(ContainerSignature::Mp3Sync);
        }
    }
    if buf.starts_with(b"FLV") {
        return Some(ContainerSignature::Flv);
    }
    let text = ascii_prefix(buf, SNIFF_SCAN_BYTES).to_ascii_lowercase();
    if text.trim_start().starts_with("#extm3u") {
        return Some(ContainerSignature::HlsManifest);
    }
    None
}

/// A payload dominated by control bytes is some unrecognized binary container
/// rather than text; accept it.
fn is_mostly_binary(buf: &[u8]) -> bool {
    let window = &buf[..buf.len().min(100)];
    if window.is_empty() {
        return false;
    }
    let control = window
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\r' | b'\n' | b'\t'))
        .count();
    control * 10 > window.len()
}

fn media_type_recognized(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    RECOGNIZED_MEDIA_TYPES.contains(&media_type.as_str())
}

fn stream_info_from_headers(headers: &HeaderMap) -> StreamInfo {
    let bitrate = headers
        .get("icy-br")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|kbps| kbps * 1000);
    StreamInfo {
        bitrate,
        ..Default::default()
    }
}

/// Pull resolution, bandwidth and codec hints out of an HLS master manifest.
fn stream_info_from_manifest(text: &str) -> StreamInfo {
    let mut info = StreamInfo::default();
    if let Some(caps) = MANIFEST_RESOLUTION.captures(text) {
        info.width = caps[1].parse().ok();
        info.height = caps[2].parse().ok();
    }
    if let Some(caps) = MANIFEST_BANDWIDTH.captures(text) {
        info.bitrate = caps[1].parse().ok();
    }
    if let Some(caps) = MANIFEST_CODECS.captures(text) {
        for tag in caps[1].split(',') {
            match codec_label(tag.trim()) {
                Some((label, true)) if info.audio_codec.is_none() => {
                    info.audio_codec = Some(label.to_string());
                }
                Some((label, false)) if info.video_codec.is_none() => {
                    info.video_codec = Some(label.to_string());
                }
                _ => {}
            }
        }
    }
    info
}

/// Map an RFC 6381 codec tag to a display label; `true` marks audio codecs.
fn codec_label(tag: &str) -> Option<(&'static str, bool)> {
    let tag = tag.to_lowercase();
    if tag.starts_with("avc1") {
        Some(("H.264", false))
    } else if tag.starts_with("hvc1") || tag.starts_with("hev1") {
        Some(("HEVC", false))
    } else if tag.starts_with("vp9") {
        Some(("VP9", false))
    } else if tag.starts_with("av01") {
        Some(("AV1", false))
    } else if tag.starts_with("mp4a") {
        Some(("AAC", true))
    } else if tag.starts_with("ac-3") {
        Some(("AC3", true))
    } else if tag.starts_with("opus") {
        Some(("Opus", true))
    } else {
        None
    }
}

fn stream_info_from_signature(signature: ContainerSignature) -> StreamInfo {
    let mut info = StreamInfo::default();
    match signature {
        ContainerSignature::MpegTs => info.video_codec = Some("MPEG-TS".into()),
        ContainerSignature::Flv => info.video_codec = Some("FLV".into()),
        ContainerSignature::Mp3Sync => info.audio_codec = Some("MP3".into()),
        ContainerSignature::AacAdts => info.audio_codec = Some("AAC".into()),
        ContainerSignature::Id3 => info.audio_codec = Some("MP3/AAC".into()),
        ContainerSignature::HlsManifest => {}
    }
    info
}
