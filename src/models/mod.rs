mod channel;

pub use channel::{Channel, CleanReport, ProbeResult, ProgressReport, StreamInfo};
