//! IPTV playlist link restoration.
//!
//! Scans channel playlists from several sources into one index, finds the best
//! replacement for channels with broken or missing links (optionally guided by
//! an XMLTV program guide) and verifies link health concurrently.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;

pub use config::Config;
pub use error::{RelinkError, Result};
pub use models::*;
pub use services::{
    CandidateResolver, ChannelIndex, LinkQualityAnalyzer, LinkVerifier, M3UParser, NameNormalizer,
    Playlist, ProgramGuideIndex, Relinker, ScoreWeights, SourceScanner, VerifyBatch,
};
