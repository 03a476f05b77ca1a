use std::path::PathBuf;

use clap::Parser;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Cleans IPTV playlists by removing duplicate and dead entries",
    long_about = "Reads one or more M3U/M3U8 playlists, removes duplicate entries,\n\
                  probes every stream URL to weed out dead channels, and writes a\n\
                  cleaned playlist. Sources can be local files or HTTP(S) URLs."
)]
pub struct CliArgs {
    /// Source playlist, repeatable
    #[arg(
        short = 's',
        long = "src",
        required = true,
        value_name = "PATH|URL",
        help = "Source playlist file or URL (can be used multiple times)"
    )]
    pub src: Vec<String>,

    /// Output path
    #[arg(
        short = 'd',
        long = "dest",
        value_name = "PATH",
        help = "Destination path for the cleaned playlist (default: temp dir, <source>-Cleaned.m3u)"
    )]
    pub dest: Option<PathBuf>,

    /// Per-request total timeout in seconds
    #[arg(long, default_value_t = 10, help = "HTTP timeout per request, in seconds")]
    pub timeout: u64,

    /// Maximum concurrent probes
    #[arg(
        short = 'c',
        long = "concurrency",
        default_value_t = 10,
        help = "Maximum number of concurrent stream probes (clamped to 1-50)"
    )]
    pub concurrency: usize,

    /// Duplicate removal toggle
    #[arg(
        long = "remove-duplicates",
        action = clap::ArgAction::Set,
        default_value = "true",
        value_name = "BOOL",
        value_parser = parse_lenient_bool,
        help = "Remove duplicate channels (\"false\", \"f\", \"0\" and \"no\" disable)"
    )]
    pub remove_duplicates: bool,

    /// Skip the probe pass entirely
    #[arg(long = "skip-validation", help = "Keep all parsed channels without probing them")]
    pub skip_validation: bool,

    /// Concatenate all sources into one working set
    #[arg(long, help = "Merge multiple sources into a single cleaned playlist")]
    pub merge: bool,

    /// One output file per group
    #[arg(long, help = "Write one output file per channel group")]
    pub split: bool,

    /// Verbose error output
    #[arg(short = 'v', long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

/// Anything except the documented false forms counts as true.
fn parse_lenient_bool(value: &str) -> Result<bool, String> {
    Ok(!matches!(
        value.to_lowercase().as_str(),
        "false" | "f" | "0" | "no"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn src_is_repeatable() {
        let args = CliArgs::parse_from(["m3u-sweeper", "-s", "a.m3u", "-s", "b.m3u", "--merge"]);
        assert_eq!(args.src, vec!["a.m3u", "b.m3u"]);
        assert!(args.merge);
    }

    #[test]
    fn lenient_bool_accepts_documented_false_forms() {
        for form in ["false", "F", "0", "no", "NO"] {
            let args =
                CliArgs::parse_from(["m3u-sweeper", "-s", "a.m3u", "--remove-duplicates", form]);
            assert!(!args.remove_duplicates, "{form} should be falsy");
        }
        let args = CliArgs::parse_from(["m3u-sweeper", "-s", "a.m3u", "--remove-duplicates", "yes"]);
        assert!(args.remove_duplicates);
    }

    #[test]
    fn missing_src_is_an_error() {
        assert!(CliArgs::try_parse_from(["m3u-sweeper"]).is_err());
    }
}
