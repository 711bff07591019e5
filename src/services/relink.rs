use futures::{stream, Stream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{RelinkError, Result};
use crate::models::{ChannelEntry, CheckOutcome, GuideState, PlaylistSource, ResolveOutcome, ScanReport, ScanSummary};
use crate::services::channel_index::ChannelIndex;
use crate::services::epg::ProgramGuideIndex;
use crate::services::m3u_parser::Playlist;
use crate::services::resolver::{CandidateResolver, ScoreWeights};
use crate::services::scanner::SourceScanner;
use crate::services::verifier::{LinkVerifier, VerifyBatch};

/// Sources fetched at the same time during a full scan
const SCAN_CONCURRENCY: usize = 4;

/// Host-facing entry point: owns the channel index, the guide and the verifier
pub struct Relinker {
    config: Config,
    index: RwLock<Option<Arc<ChannelIndex>>>,
    guide: Arc<ProgramGuideIndex>,
    scanner: SourceScanner,
    verifier: Arc<LinkVerifier>,
    weights: ScoreWeights,
}

impl Relinker {
    pub fn new(config: Config) -> Result<Self> {
        let guide = Arc::new(ProgramGuideIndex::from_config(&config)?);
        let scanner = SourceScanner::from_config(&config, Some(Arc::clone(&guide)))?;
        let verifier = Arc::new(LinkVerifier::new(config.verify_config())?);
        let weights = config.score_weights();

        Ok(Self {
            config,
            index: RwLock::new(None),
            guide,
            scanner,
            verifier,
            weights,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn guide(&self) -> &Arc<ProgramGuideIndex> {
        &self.guide
    }

    pub fn verifier(&self) -> &Arc<LinkVerifier> {
        &self.verifier
    }

    /// Current index snapshot, if any scan has run
    pub fn index(&self) -> Option<Arc<ChannelIndex>> {
        self.index.read().unwrap().clone()
    }

    /// Scan every source and replace the whole index.
    /// Failing sources are reported and skipped.
    pub async fn scan_all(&self, sources: &[PlaylistSource]) -> ScanSummary {
        let scanned: Vec<_> = stream::iter(sources)
            .map(|source| self.scanner.scan(source))
            .buffered(SCAN_CONCURRENCY)
            .collect()
            .await;

        let mut index = ChannelIndex::new();
        let mut summary = ScanSummary::default();
        for source in scanned {
            for entry in source.entries {
                index.add(entry);
            }
            summary.push(source.report);
        }

        tracing::info!(
            "Index rebuilt: {} entries under {} names from {} sources ({} failed)",
            index.len(),
            index.key_count(),
            sources.len(),
            summary.failed_sources
        );
        *self.index.write().unwrap() = Some(Arc::new(index));
        summary
    }

    /// Rescan one source, replacing only its entries. On failure the index is left as is.
    pub async fn scan_source(&self, source: &PlaylistSource) -> Result<ScanReport> {
        let scanned = self.scanner.scan(source).await;
        if let Some(reason) = scanned.report.error.clone() {
            return Err(RelinkError::Source {
                name: source.name.clone(),
                reason,
            });
        }

        let entries = scanned.entries.into_iter().map(Arc::new);
        let mut guard = self.index.write().unwrap();
        let next = match guard.as_deref() {
            Some(current) => current.replace_source(&source.name, entries),
            None => ChannelIndex::new().replace_source(&source.name, entries),
        };
        tracing::info!("Source {} rescanned, index now holds {} entries", source.name, next.len());
        *guard = Some(Arc::new(next));

        Ok(scanned.report)
    }

    /// Resolver over the current snapshot
    pub fn resolver(&self) -> Result<CandidateResolver> {
        let index = self.index().ok_or(RelinkError::NotReady)?;
        Ok(CandidateResolver::new(
            index,
            Some(Arc::clone(&self.guide)),
            self.weights.clone(),
        ))
    }

    /// One outcome per channel that needs a new link, in playlist order
    pub fn resolve_missing_links(
        &self,
        playlist: &Playlist,
    ) -> Result<impl Stream<Item = ResolveOutcome> + Send + 'static> {
        let resolver = self.resolver()?;
        let targets: Vec<(usize, ChannelEntry)> = playlist
            .needs_resolution()
            .into_iter()
            .map(|i| (i, playlist.entries[i].clone()))
            .collect();

        Ok(async_stream::stream! {
            for (index, target) in targets {
                let found = resolver.resolve_entry(&target, true);
                yield ResolveOutcome {
                    index,
                    name: target.name.clone(),
                    score: found.as_ref().map(|c| c.score),
                    via_identity: found.as_ref().map_or(false, |c| c.via_identity),
                    replacement: found.map(|c| c.entry),
                };
                tokio::task::yield_now().await;
            }
        })
    }

    /// Resolve and apply replacements in place; returns how many channels were fixed
    pub async fn repair(&self, playlist: &mut Playlist) -> Result<usize> {
        let outcomes: Vec<ResolveOutcome> = self.resolve_missing_links(playlist)?.collect().await;

        let mut fixed = 0;
        for outcome in outcomes {
            if let Some(candidate) = &outcome.replacement {
                if playlist.apply_fix(outcome.index, candidate) {
                    fixed += 1;
                }
            }
        }
        tracing::info!("Repaired {} of {} channels needing a link", fixed, playlist.needs_resolution().len() + fixed);
        Ok(fixed)
    }

    pub fn verify_batch(&self, entries: Vec<ChannelEntry>, cancel: CancellationToken) -> VerifyBatch {
        self.verifier.verify_batch(entries, cancel)
    }

    /// Check every entry of a playlist and record the outcomes.
    ///
    /// Linked entries are `Checking` while the batch runs; entries skipped by
    /// cancellation return to their previous status.
    pub async fn verify_playlist(&self, playlist: &mut Playlist, cancel: CancellationToken) -> usize {
        let batch = self.verify_batch(playlist.entries.clone(), cancel);
        let previous = playlist.begin_check();
        let results = batch.finish().await;
        playlist.finish_check(results, &previous)
    }

    /// Check every indexed candidate and swap in a snapshot carrying the
    /// outcomes, so ranking can favour links known to work
    pub async fn verify_index(&self, cancel: CancellationToken) -> Result<usize> {
        let snapshot = self.index().ok_or(RelinkError::NotReady)?;
        let entries: Vec<ChannelEntry> = snapshot.entries().map(|e| ChannelEntry::clone(e)).collect();
        let keys: Vec<(String, String)> = entries
            .iter()
            .map(|e| (e.source.clone(), e.url_str().to_string()))
            .collect();

        let results = self.verify_batch(entries, cancel).finish().await;
        let outcomes: HashMap<(String, String), CheckOutcome> = keys
            .into_iter()
            .zip(results)
            .filter_map(|(key, outcome)| outcome.map(|o| (key, o)))
            .collect();

        // Apply to whatever snapshot is current; a rescan may have replaced it
        let mut guard = self.index.write().unwrap();
        let next = guard.as_deref().map(|current| current.with_outcomes(&outcomes));
        if let Some(next) = next {
            *guard = Some(Arc::new(next));
        }
        tracing::info!("Index verified: {} of {} candidates checked", outcomes.len(), snapshot.len());
        Ok(outcomes.len())
    }

    pub async fn load_program_guide(&self) -> bool {
        self.guide.load().await.0
    }

    pub fn spawn_guide_load(&self) -> watch::Receiver<GuideState> {
        self.guide.spawn_load()
    }
}
