use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::SweepError;
use crate::models::Channel;

/// Emits a well-formed extended-M3U file from an ordered channel list.
pub struct PlaylistWriter;

impl PlaylistWriter {
    pub fn write(path: &Path, channels: &[Channel]) -> Result<(), SweepError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| SweepError::Write {
                    path: path.display().to_string(),
                    source,
                })?;
            }
        }

        let file = File::create(path).map_err(|source| SweepError::Write {
            path: path.display().to_string(),
            source,
        })?;
        let mut out = BufWriter::new(file);
        Self::write_to(&mut out, channels).map_err(|source| SweepError::Write {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), channels = channels.len(), "playlist written");
        Ok(())
    }

    /// One output file per group, named `<stem>-<group>.m3u` next to `dest`.
    pub fn write_split(dest: &Path, channels: &[Channel]) -> Result<Vec<PathBuf>, SweepError> {
        let mut groups: BTreeMap<String, Vec<Channel>> = BTreeMap::new();
        for channel in channels {
            let group = if channel.group_name.is_empty() {
                "Uncategorized".to_string()
            } else {
                channel.group_name.clone()
            };
            groups.entry(group).or_default().push(channel.clone());
        }

        let stem = dest
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "playlist".to_string());
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));

        let mut written = Vec::with_capacity(groups.len());
        for (group, mut members) in groups {
            for (id, channel) in members.iter_mut().enumerate() {
                channel.id = id;
            }
            let file_name = format!("{stem}-{}.m3u", sanitize_file_component(&group));
            let path = dir.join(file_name);
            Self::write(&path, &members)?;
            written.push(path);
        }
        Ok(written)
    }

    fn write_to(out: &mut impl Write, channels: &[Channel]) -> std::io::Result<()> {
        let epg_url = channels
            .iter()
            .find_map(|c| c.epg_url.as_deref().filter(|u| !u.is_empty()));
        match epg_url {
            Some(url) => writeln!(out, "#EXTM3U x-tvg-url=\"{url}\"")?,
            None => writeln!(out, "#EXTM3U")?,
        }

        for channel in channels {
            let extinf = if channel.name.starts_with("#EXTINF") {
                // Names salvaged from malformed sources are whole directive
                // lines already; pass them through untouched.
                channel.name.clone()
            } else {
                format_extinf(channel)
            };
            writeln!(out, "{extinf}")?;
            if !channel.group_name.is_empty() && !extinf.contains("group-title=") {
                writeln!(out, "#EXTGRP:{}", channel.group_name)?;
            }
            writeln!(out, "{}", channel.link)?;
        }
        out.flush()
    }
}

fn format_extinf(channel: &Channel) -> String {
    let mut line = String::from("#EXTINF:-1");
    let mut push_attr = |key: &str, value: &str| {
        line.push_str(&format!(" {key}=\"{value}\""));
    };

    if let Some(tvg_id) = &channel.tvg_id {
        push_attr("tvg-id", tvg_id);
    }
    if let Some(tvg_name) = &channel.tvg_name {
        push_attr("tvg-name", tvg_name);
    }
    if let Some(tvg_logo) = &channel.tvg_logo {
        push_attr("tvg-logo", tvg_logo);
    }
    if let Some(language) = &channel.language {
        push_attr("tvg-language", language);
    }
    if !channel.group_name.is_empty() {
        push_attr("group-title", &channel.group_name);
    }
    for (key, value) in &channel.extra_attributes {
        push_attr(key, value);
    }

    let display = channel.tvg_name.as_deref().unwrap_or(&channel.name);
    line.push(',');
    line.push_str(display);
    line
}

fn sanitize_file_component(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::parser::PlaylistParser;

    fn render(channels: &[Channel]) -> String {
        let mut buf = Vec::new();
        PlaylistWriter::write_to(&mut buf, channels).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn writes_header_with_first_epg_url() {
        let mut a = Channel::new(0, "Alpha", "http://h.example/a");
        a.epg_url = Some("http://epg.example/g.xml".into());
        let b = Channel::new(1, "Beta", "http://h.example/b");
        let text = render(&[b, a]);
        assert!(text.starts_with("#EXTM3U x-tvg-url=\"http://epg.example/g.xml\"\n"));
    }

    #[test]
    fn extgrp_only_when_extinf_lacks_group_title() {
        let mut grouped = Channel::new(0, "Alpha", "http://h.example/a");
        grouped.group_name = "News".into();
        let text = render(&[grouped]);
        assert!(text.contains("group-title=\"News\""));
        assert!(!text.contains("#EXTGRP:"));

        let mut verbatim = Channel::new(0, "#EXTINF:-1,Raw Name", "http://h.example/r");
        verbatim.group_name = "Sports".into();
        let text = render(&[verbatim]);
        assert!(text.contains("#EXTINF:-1,Raw Name\n#EXTGRP:Sports\nhttp://h.example/r\n"));
    }

    #[test]
    fn round_trip_preserves_fields() {
        let source = "#EXTM3U x-tvg-url=\"http://epg.example/g.xml\"\n\
            #EXTINF:-1 tvg-id=\"a1\" tvg-logo=\"http://l.example/a.png\" group-title=\"News\" catchup=\"shift\",Alpha HD\n\
            http://host.example/a\n\
            #EXTINF:-1,Beta\n\
            #EXTGRP:Movies\n\
            http://host.example/b\n";
        let first = PlaylistParser::parse(source);
        let written = render(&first);
        let second = PlaylistParser::parse(&written);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.link, b.link);
            assert_eq!(a.group_name, b.group_name);
            assert_eq!(a.tvg_id, b.tvg_id);
            assert_eq!(a.tvg_logo, b.tvg_logo);
            assert_eq!(a.epg_url, b.epg_url);
            assert_eq!(a.extra_attributes, b.extra_attributes);
        }
    }

    #[test]
    fn split_groups_channels_into_separate_files() {
        let dir = std::env::temp_dir().join(format!("m3u-sweeper-split-{}", std::process::id()));
        let dest = dir.join("out.m3u");

        let mut news = Channel::new(0, "Alpha", "http://h.example/a");
        news.group_name = "News".into();
        let ungrouped = Channel::new(1, "Beta", "http://h.example/b");

        let written = PlaylistWriter::write_split(&dest, &[news, ungrouped]).unwrap();
        assert_eq!(written.len(), 2);
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"out-News.m3u".to_string()));
        assert!(names.contains(&"out-Uncategorized.m3u".to_string()));

        let contents = fs::read_to_string(&written[0]).unwrap();
        assert!(contents.starts_with("#EXTM3U"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = std::env::temp_dir().join(format!("m3u-sweeper-parent-{}", std::process::id()));
        let dest = dir.join("nested").join("list.m3u");
        PlaylistWriter::write(&dest, &[Channel::new(0, "A", "http://h.example/a")]).unwrap();
        assert!(dest.exists());
        fs::remove_dir_all(&dir).unwrap();
    }
}
