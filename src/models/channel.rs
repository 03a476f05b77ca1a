use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single playlist entry.
///
/// Channels are immutable: every pipeline stage consumes an ordered list and
/// produces a fresh one, rewriting `id` to the position in its own output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Position in the current ordered list (dense, `0..N-1`).
    pub id: usize,
    pub name: String,
    /// Absolute stream URL.
    pub link: String,
    /// Category; empty means "Uncategorized".
    #[serde(default)]
    pub group_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvg_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvg_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvg_logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epg_url: Option<String>,
    /// Unknown `key="value"` attributes from the source `#EXTINF` line.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_attributes: BTreeMap<String, String>,
    /// Filled only after a successful probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_info: Option<StreamInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl Channel {
    pub fn new(id: usize, name: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            link: link.into(),
            group_name: String::new(),
            tvg_id: None,
            tvg_name: None,
            tvg_logo: None,
            epg_url: None,
            extra_attributes: BTreeMap::new(),
            stream_info: None,
            category: None,
            language: None,
            content_hash: None,
        }
    }
}

/// Technical stream metadata derived from probe headers and body sniffing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Bits per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

impl StreamInfo {
    pub fn is_empty(&self) -> bool {
        self.width.is_none()
            && self.height.is_none()
            && self.bitrate.is_none()
            && self.video_codec.is_none()
            && self.audio_codec.is_none()
    }

    /// Merge two partial records; fields of `self` win over `other`.
    pub fn merged_over(mut self, other: StreamInfo) -> StreamInfo {
        self.width = self.width.or(other.width);
        self.height = self.height.or(other.height);
        self.bitrate = self.bitrate.or(other.bitrate);
        self.video_codec = self.video_codec.or(other.video_codec);
        self.audio_codec = self.audio_codec.or(other.audio_codec);
        self
    }
}

/// Outcome of one probe; failures yield `alive == false` rather than errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    pub alive: bool,
    pub stream_info: Option<StreamInfo>,
}

impl ProbeResult {
    pub fn dead() -> Self {
        Self::default()
    }
}

/// Progress snapshot emitted by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub total: usize,
    pub working: usize,
    pub not_working: usize,
    pub percent: u8,
    pub activity_label: String,
}

impl ProgressReport {
    pub fn processed(&self) -> usize {
        self.working + self.not_working
    }
}

/// Summary of a finished cleaning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanReport {
    pub working_count: usize,
    pub total_after_dedupe: usize,
    pub doubles_removed: usize,
    pub original_count: usize,
    pub group_count: usize,
}

impl CleanReport {
    pub fn absorb(&mut self, other: &CleanReport) {
        self.working_count += other.working_count;
        self.total_after_dedupe += other.total_after_dedupe;
        self.doubles_removed += other.doubles_removed;
        self.original_count += other.original_count;
        self.group_count += other.group_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_info_merge_prefers_left() {
        let header = StreamInfo {
            bitrate: Some(128_000),
            ..Default::default()
        };
        let body = StreamInfo {
            bitrate: Some(256_000),
            video_codec: Some("H.264".into()),
            ..Default::default()
        };
        let merged = header.merged_over(body);
        assert_eq!(merged.bitrate, Some(128_000));
        assert_eq!(merged.video_codec.as_deref(), Some("H.264"));
    }

    #[test]
    fn report_absorb_sums_counts() {
        let mut total = CleanReport::default();
        let one = CleanReport {
            working_count: 3,
            total_after_dedupe: 5,
            doubles_removed: 2,
            original_count: 7,
            group_count: 1,
        };
        total.absorb(&one);
        total.absorb(&one);
        assert_eq!(total.working_count, 6);
        assert_eq!(total.original_count, 14);
    }
}
