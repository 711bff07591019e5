//! Link restoration services
//!
//! Leaf-first:
//!
//! - **normalizer**: canonical channel names used as index keys
//! - **link_options**: `#EXTVLCOPT:` parsing and re-emission
//! - **quality**: static URL trust scoring
//! - **m3u_parser**: playlist grammar, round-trip serialization and source loading
//! - **cache** / **epg**: guide catalog with on-disk artifact and fuzzy identity lookup
//! - **channel_index** / **scanner**: multi-source candidate index
//! - **resolver**: candidate scoring and selection
//! - **verifier**: retrying link checks on a worker pool
//! - **relink**: host-facing facade
//!
//! # Usage
//!
//! ```rust,ignore
//! let relinker = Relinker::new(Config::load())?;
//! relinker.spawn_guide_load();
//! relinker.scan_all(&sources).await;
//!
//! let mut playlist = Playlist::parse(&text);
//! relinker.repair(&mut playlist).await?;
//! ```

pub mod cache;
pub mod channel_index;
pub mod epg;
pub mod link_options;
pub mod m3u_parser;
pub mod normalizer;
pub mod quality;
pub mod relink;
pub mod resolver;
pub mod scanner;
pub mod verifier;

pub use channel_index::ChannelIndex;
pub use epg::ProgramGuideIndex;
pub use link_options::LinkOptionExtractor;
pub use m3u_parser::{M3UParser, Playlist};
pub use normalizer::NameNormalizer;
pub use quality::LinkQualityAnalyzer;
pub use relink::Relinker;
pub use resolver::{CandidateResolver, ScoreWeights, ScoredCandidate};
pub use scanner::SourceScanner;
pub use verifier::{LinkVerifier, VerifyBatch};
