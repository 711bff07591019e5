use std::sync::Arc;

use crate::config::Config;
use crate::error::{RelinkError, Result};
use crate::models::{ChannelEntry, PlaylistSource, ScanReport};
use crate::services::epg::ProgramGuideIndex;
use crate::services::m3u_parser::{M3UParser, Playlist};
use crate::services::normalizer::NameNormalizer;
use crate::services::quality::LinkQualityAnalyzer;

/// Entries of one source ready to be indexed
#[derive(Debug, Default)]
pub struct ScannedSource {
    pub report: ScanReport,
    pub entries: Vec<ChannelEntry>,
}

/// Reads sources and turns them into indexable entries
pub struct SourceScanner {
    loader: M3UParser,
    guide: Option<Arc<ProgramGuideIndex>>,
    tag_identities: bool,
}

impl SourceScanner {
    pub fn new(loader: M3UParser, guide: Option<Arc<ProgramGuideIndex>>, tag_identities: bool) -> Self {
        Self {
            loader,
            guide,
            tag_identities,
        }
    }

    pub fn from_config(config: &Config, guide: Option<Arc<ProgramGuideIndex>>) -> Result<Self> {
        let loader = M3UParser::new(
            &config.user_agent,
            config.fetch_timeout(),
            config.max_retries,
            config.max_playlist_size_mb,
        )?;
        Ok(Self::new(loader, guide, config.tag_identities))
    }

    /// Raw playlist text of a source
    pub async fn fetch(&self, source: &PlaylistSource) -> Result<String> {
        let location = source.location.trim();
        let text = if source.is_remote() {
            self.loader.fetch_text(location).await
        } else {
            self.loader.read_file(location).await
        };
        text.map_err(|e| RelinkError::Source {
            name: source.name.clone(),
            reason: format!("{:#}", e),
        })
    }

    /// Scan one source. Failures end up in `report.error`, never as an `Err`.
    pub async fn scan(&self, source: &PlaylistSource) -> ScannedSource {
        let started = std::time::Instant::now();
        match self.fetch(source).await {
            Ok(text) => {
                let scanned = self.prepare(&source.name, &text);
                tracing::info!(
                    "Scanned {}: {} indexed, {} skipped, {} tagged in {:?}",
                    source.name,
                    scanned.report.indexed,
                    scanned.report.skipped,
                    scanned.report.tagged,
                    started.elapsed()
                );
                scanned
            }
            Err(e) => {
                tracing::warn!("source_failed" = %source.name, "error" = %e);
                ScannedSource {
                    report: ScanReport {
                        source: source.name.clone(),
                        error: Some(e.to_string()),
                        ..ScanReport::default()
                    },
                    entries: Vec::new(),
                }
            }
        }
    }

    /// Parse playlist text and prepare each entry independently
    pub fn prepare(&self, source_name: &str, text: &str) -> ScannedSource {
        let playlist = Playlist::parse(text);
        let mut report = ScanReport {
            source: source_name.to_string(),
            skipped: playlist.skipped,
            ..ScanReport::default()
        };

        let guide = self
            .guide
            .as_deref()
            .filter(|g| self.tag_identities && g.is_loaded());

        let mut entries = Vec::with_capacity(playlist.entries.len());
        for mut entry in playlist.entries {
            // Nothing to offer as a replacement without a link or a usable name
            if !entry.has_link() || NameNormalizer::normalize(&entry.name).is_empty() {
                report.skipped += 1;
                continue;
            }

            entry.source = source_name.to_string();
            entry.quality = Some(LinkQualityAnalyzer::analyze(entry.url_str()));

            if entry.identity_id.is_none() {
                if let Some(id) = guide.and_then(|g| g.find_identity(&entry.name)) {
                    entry.identity_id = Some(id);
                    report.tagged += 1;
                }
            }

            entries.push(entry);
        }

        report.indexed = entries.len();
        ScannedSource { report, entries }
    }
}
