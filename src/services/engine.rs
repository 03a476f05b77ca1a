use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::SweepError;
use crate::models::{Channel, CleanReport, ProgressReport};
use crate::services::dedup::remove_duplicates;
use crate::services::downloader::{read_playlist_text, SourceFetcher};
use crate::services::enricher::Enricher;
use crate::services::parser::PlaylistParser;
use crate::services::prober::{Probe, StreamProber};
use crate::services::scheduler::ProbeScheduler;
use crate::services::writer::PlaylistWriter;

/// Composes the cleaning stages: fetch, parse, dedup, enrich, probe, write.
pub struct SweepEngine {
    config: Config,
    fetcher: SourceFetcher,
    scheduler: ProbeScheduler,
}

impl SweepEngine {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client = config.http_client()?;
        let prober: Arc<dyn Probe> = Arc::new(StreamProber::new(client.clone()));
        Ok(Self {
            fetcher: SourceFetcher::new(client, config.max_retries),
            scheduler: ProbeScheduler::new(prober, config.concurrency),
            config,
        })
    }

    /// Test seam: run with a scripted prober instead of the HTTP one.
    #[cfg(test)]
    pub fn with_prober(config: Config, prober: Arc<dyn Probe>) -> anyhow::Result<Self> {
        let client = config.http_client()?;
        Ok(Self {
            fetcher: SourceFetcher::new(client, config.max_retries),
            scheduler: ProbeScheduler::new(prober, config.concurrency),
            config,
        })
    }

    /// Run the whole pipeline over every configured source.
    ///
    /// Cancellation is not an error: the report built so far is returned and
    /// the caller inspects its own cancel flag.
    pub async fn run(
        &self,
        progress: UnboundedSender<ProgressReport>,
        cancel: CancellationToken,
    ) -> Result<CleanReport, SweepError> {
        let mut working_sets: Vec<(String, Vec<Channel>)> = Vec::new();
        for source in &self.config.sources {
            let path = self.fetcher.resolve(source, &cancel).await?;
            let text = read_playlist_text(&path)?;
            let channels = PlaylistParser::parse(&text);
            if channels.is_empty() {
                // An empty parse is not fatal; the report just shows zeros.
                warn!(%source, "no channels parsed from source");
            }
            info!(%source, channels = channels.len(), "source parsed");
            working_sets.push((source_stem(source), channels));
        }

        if self.config.merge && working_sets.len() > 1 {
            let merged_name = working_sets[0].0.clone();
            let mut merged: Vec<Channel> = Vec::new();
            for (_, channels) in working_sets.drain(..) {
                merged.extend(channels);
            }
            for (id, channel) in merged.iter_mut().enumerate() {
                channel.id = id;
            }
            working_sets.push((merged_name, merged));
        }

        let multiple_outputs = working_sets.len() > 1;
        let mut report = CleanReport::default();
        for (run_index, (stem, channels)) in working_sets.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let dest = self.destination_for(&stem, run_index, multiple_outputs);
            let one = self
                .clean_one(channels, &dest, progress.clone(), cancel.clone())
                .await?;
            report.absorb(&one);
        }
        Ok(report)
    }

    async fn clean_one(
        &self,
        channels: Vec<Channel>,
        dest: &PathBuf,
        progress: UnboundedSender<ProgressReport>,
        cancel: CancellationToken,
    ) -> Result<CleanReport, SweepError> {
        let original_count = channels.len();

        let (channels, doubles_removed) = if self.config.remove_duplicates {
            remove_duplicates(channels)
        } else {
            (channels, 0)
        };
        let total_after_dedupe = channels.len();
        debug!(original_count, doubles_removed, "dedup pass finished");

        let channels = Enricher::enrich(Enricher::rename(channels));

        let survivors = if self.config.skip_validation {
            info!("probe pass skipped, keeping all parsed channels");
            channels
        } else {
            self.scheduler
                .filter_working(channels, progress, cancel.clone())
                .await
        };

        let groups: HashSet<&str> = survivors
            .iter()
            .map(|c| {
                if c.group_name.is_empty() {
                    "Uncategorized"
                } else {
                    c.group_name.as_str()
                }
            })
            .collect();

        let report = CleanReport {
            working_count: survivors.len(),
            total_after_dedupe,
            doubles_removed,
            original_count,
            group_count: groups.len(),
        };

        if cancel.is_cancelled() {
            info!("cancelled before writing, leaving destination untouched");
            return Ok(report);
        }

        if self.config.split {
            let written = PlaylistWriter::write_split(dest, &survivors)?;
            info!(files = written.len(), "split playlists written");
        } else {
            PlaylistWriter::write(dest, &survivors)?;
            info!(dest = %dest.display(), channels = survivors.len(), "playlist written");
        }

        Ok(report)
    }

    /// Explicit `-dest` wins; otherwise `<temp>/<stem>-Cleaned.m3u`. With
    /// several unmerged sources, later outputs get a numeric suffix so they
    /// do not clobber each other.
    fn destination_for(&self, stem: &str, run_index: usize, multiple: bool) -> PathBuf {
        let base = match &self.config.dest {
            Some(dest) => dest.clone(),
            None => std::env::temp_dir()
                .join("m3u-sweeper")
                .join(format!("{stem}-Cleaned.m3u")),
        };
        if multiple && run_index > 0 && self.config.dest.is_some() {
            let stem_part = base
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "playlist".into());
            let parent = base.parent().unwrap_or_else(|| std::path::Path::new("."));
            parent.join(format!("{stem_part}-{run_index}.m3u"))
        } else {
            base
        }
    }
}

fn source_stem(source: &str) -> String {
    let trimmed = source.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .split('?')
        .next()
        .unwrap_or(trimmed);
    let stem = last.strip_suffix(".m3u8").or_else(|| last.strip_suffix(".m3u"));
    let stem = stem.unwrap_or(last);
    if stem.is_empty() {
        "playlist".to_string()
    } else {
        stem.to_string()
    }
}
