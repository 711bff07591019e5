pub mod check;
pub mod guide;
pub mod playlist;

pub use check::{BatchProgress, CheckOutcome, LinkQuality, VerifyConfig, VerifyStrategy, TRACE_SEPARATOR};
pub use guide::{GuideChannel, GuideState};
pub use playlist::{
    ChannelEntry, LinkOptions, LinkStatus, PlaylistSource, ResolveOutcome, ScanReport,
    ScanSummary, DEFAULT_GROUP,
};
