use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::{Channel, ProgressReport};
use crate::services::prober::Probe;

/// Bounds accepted for concurrent probes.
pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 50;

/// Fans probes out over a channel list with bounded concurrency.
///
/// Completion order is unpredictable, output order is not: survivors are
/// re-sorted by their original index before being returned.
pub struct ProbeScheduler {
    prober: Arc<dyn Probe>,
    max_concurrency: usize,
}

impl ProbeScheduler {
    pub fn new(prober: Arc<dyn Probe>, max_concurrency: usize) -> Self {
        Self {
            prober,
            max_concurrency: max_concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
        }
    }

    /// Probe every channel and keep the ones that answered as live streams.
    ///
    /// On cancellation the survivors collected so far are returned; the
    /// caller decides what that means.
    pub async fn filter_working(
        &self,
        channels: Vec<Channel>,
        progress: UnboundedSender<ProgressReport>,
        cancel: CancellationToken,
    ) -> Vec<Channel> {
        let total = channels.len();
        if total == 0 {
            let _ = progress.send(ProgressReport {
                total: 0,
                working: 0,
                not_working: 0,
                percent: 100,
                activity_label: "nothing to probe".into(),
            });
            return Vec::new();
        }

        let interval = progress_interval(total);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let working = Arc::new(AtomicUsize::new(0));
        let not_working = Arc::new(AtomicUsize::new(0));
        let processed = Arc::new(AtomicUsize::new(0));

        let mut tasks: JoinSet<Option<(usize, Channel)>> = JoinSet::new();
        for (index, mut channel) in channels.into_iter().enumerate() {
            let prober = Arc::clone(&self.prober);
            let semaphore = Arc::clone(&semaphore);
            let working = Arc::clone(&working);
            let not_working = Arc::clone(&not_working);
            let processed = Arc::clone(&processed);
            let progress = progress.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                // The permit is dropped on every exit path below.
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return None,
                    permit = semaphore.acquire_owned() => permit.ok()?,
                };
                if cancel.is_cancelled() {
                    return None;
                }

                let result = prober.probe(&channel.link, &cancel).await;
                if result.alive {
                    working.fetch_add(1, Ordering::Relaxed);
                } else {
                    not_working.fetch_add(1, Ordering::Relaxed);
                }

                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % interval == 0 || done == total {
                    let _ = progress.send(ProgressReport {
                        total,
                        working: working.load(Ordering::Relaxed),
                        not_working: not_working.load(Ordering::Relaxed),
                        percent: (100 * done / total) as u8,
                        activity_label: channel.name.clone(),
                    });
                }

                if result.alive {
                    channel.stream_info = match (result.stream_info, channel.stream_info.take()) {
                        (Some(probed), Some(existing)) => Some(probed.merged_over(existing)),
                        (probed, existing) => probed.or(existing),
                    };
                    Some((index, channel))
                } else {
                    None
                }
            });
        }

        let mut survivors: Vec<(usize, Channel)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(entry)) => survivors.push(entry),
                Ok(None) => {}
                Err(err) => warn!("probe task panicked: {err}"),
            }
        }

        survivors.sort_by_key(|(index, _)| *index);
        let mut survivors: Vec<Channel> = survivors.into_iter().map(|(_, ch)| ch).collect();
        for (id, channel) in survivors.iter_mut().enumerate() {
            channel.id = id;
        }

        let done = processed.load(Ordering::Relaxed);
        let _ = progress.send(ProgressReport {
            total,
            working: working.load(Ordering::Relaxed),
            not_working: not_working.load(Ordering::Relaxed),
            percent: 100,
            activity_label: if cancel.is_cancelled() && done < total {
                "cancelled".into()
            } else {
                "done".into()
            },
        });
        debug!(
            total,
            working = survivors.len(),
            cancelled = cancel.is_cancelled(),
            "probe pass finished"
        );

        survivors
    }
}

/// Larger playlists report less often so progress output stays readable.
fn progress_interval(total: usize) -> usize {
    if total < 20 {
        1
    } else if total < 100 {
        2
    } else if total < 500 {
        5
    } else if total < 1000 {
        10
    } else {
        (total / 100).max(1)
    }
}
