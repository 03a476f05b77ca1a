use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;

use crate::cli::CliArgs;
use crate::services::scheduler::{MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Runtime configuration assembled from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub sources: Vec<String>,
    pub dest: Option<PathBuf>,
    /// Per-request total timeout in seconds.
    pub timeout_secs: u64,
    /// Max concurrent probes, clamped to [1, 50].
    pub concurrency: usize,
    pub remove_duplicates: bool,
    pub skip_validation: bool,
    pub merge: bool,
    pub split: bool,
    pub verbose: bool,
    /// Retries for source downloads (probe retries are fixed).
    pub max_retries: u32,
}

impl Config {
    pub fn from_args(args: CliArgs) -> Self {
        Self {
            sources: args.src,
            dest: args.dest,
            timeout_secs: args.timeout,
            concurrency: args.concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
            remove_duplicates: args.remove_duplicates,
            skip_validation: args.skip_validation,
            merge: args.merge,
            split: args.split,
            verbose: args.verbose,
            max_retries: 2,
        }
    }

    /// The one HTTP client shared by downloads and probes.
    pub fn http_client(&self) -> anyhow::Result<Client> {
        let client = Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .tcp_keepalive(Duration::from_secs(10))
            .pool_max_idle_per_host(self.concurrency)
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .build()?;
        Ok(client)
    }
}
