//! Program guide (XMLTV) channel catalog
//! Maps display-name variants to guide identities, with fuzzy lookup
//! Supports both plain XML and gzip-compressed (.xml.gz) catalogs

use flate2::read::GzDecoder;
use lru::LruCache;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, Read};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;

use crate::config::Config;
use crate::error::{RelinkError, Result};
use crate::models::{GuideChannel, GuideState};
use crate::services::cache::{GuideArtifact, GuideCache};
use crate::services::m3u_parser::M3UParser;
use crate::services::normalizer::{similarity, NameNormalizer};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const IDENTITY_MEMO_SIZE: usize = 4096;
/// Minimum similarity (exclusive) for a fuzzy identity match
pub const FUZZY_THRESHOLD: f64 = 0.7;

const PAD_START: char = '\u{2}';
const PAD_END: char = '\u{3}';

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    Root,
    Channel,
    DisplayName,
}

fn get_attribute(e: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| RelinkError::Guide(format!("bad attribute: {}", err)))?;
        if attr.key.as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|err| RelinkError::Guide(format!("bad attribute value: {}", err)))?;
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}

/// Parse a catalog, inflating gzip payloads first.
///
/// Any XML error fails the whole parse; a document without channels is an error too.
pub fn parse_catalog(bytes: &[u8]) -> Result<Vec<GuideChannel>> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut xml = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut xml)
            .map_err(|e| RelinkError::Guide(format!("gzip decode failed: {}", e)))?;
        parse_channels(xml.as_slice())
    } else {
        parse_channels(bytes)
    }
}

/// Streaming parse of `<channel>` elements; programmes are ignored
fn parse_channels<R: BufRead>(reader: R) -> Result<Vec<GuideChannel>> {
    let mut xml_reader = Reader::from_reader(reader);
    xml_reader.config_mut().trim_text(true);

    let mut buf = Vec::with_capacity(8192);
    let mut channels: Vec<GuideChannel> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    let mut state = ParserState::Root;
    let mut current: Option<GuideChannel> = None;
    let mut text_buf = String::new();

    let mut finish = |channel: GuideChannel, channels: &mut Vec<GuideChannel>| {
        if channel.id.is_empty() {
            return;
        }
        match positions.get(&channel.id) {
            // Duplicate id: merge names into the first occurrence
            Some(&pos) => {
                let existing = &mut channels[pos];
                for name in channel.names {
                    if !existing.names.contains(&name) {
                        existing.names.push(name);
                    }
                }
                if existing.icon_url.is_none() {
                    existing.icon_url = channel.icon_url;
                }
            }
            None => {
                positions.insert(channel.id.clone(), channels.len());
                channels.push(channel);
            }
        }
    };

    loop {
        let position = xml_reader.buffer_position();
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"channel" => {
                    state = ParserState::Channel;
                    current = Some(GuideChannel {
                        id: get_attribute(e, b"id")?.unwrap_or_default(),
                        names: Vec::new(),
                        icon_url: None,
                    });
                }
                b"display-name" if state == ParserState::Channel => {
                    state = ParserState::DisplayName;
                    text_buf.clear();
                }
                b"icon" if state == ParserState::Channel => {
                    if let (Some(src), Some(chan)) = (get_attribute(e, b"src")?, current.as_mut()) {
                        chan.icon_url = Some(src).filter(|s| !s.is_empty());
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"channel" => {
                    let id = get_attribute(e, b"id")?.unwrap_or_default();
                    finish(
                        GuideChannel {
                            id,
                            names: Vec::new(),
                            icon_url: None,
                        },
                        &mut channels,
                    );
                }
                b"icon" if state == ParserState::Channel => {
                    if let (Some(src), Some(chan)) = (get_attribute(e, b"src")?, current.as_mut()) {
                        chan.icon_url = Some(src).filter(|s| !s.is_empty());
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if state == ParserState::DisplayName {
                    let text = e
                        .unescape()
                        .map_err(|err| RelinkError::Guide(format!("XML error at byte {}: {}", position, err)))?;
                    text_buf.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if state == ParserState::DisplayName {
                    text_buf.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"display-name" if state == ParserState::DisplayName => {
                    let name = text_buf.trim().to_string();
                    if let Some(chan) = current.as_mut() {
                        if !name.is_empty() && !chan.names.contains(&name) {
                            chan.names.push(name);
                        }
                    }
                    state = ParserState::Channel;
                }
                b"channel" => {
                    if let Some(channel) = current.take() {
                        finish(channel, &mut channels);
                    }
                    state = ParserState::Root;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(RelinkError::Guide(format!("XML error at byte {}: {}", position, e)));
            }
            _ => {}
        }
        buf.clear();
    }

    if channels.is_empty() {
        return Err(RelinkError::Guide("catalog contains no channels".to_string()));
    }
    Ok(channels)
}

/// Padded character bigrams: a name of n chars yields n + 1 bigrams.
///
/// One edit touches at most two bigrams, so any name within the fuzzy
/// threshold of a query shares at least one bigram with it.
fn bigrams(text: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = std::iter::once(PAD_START)
        .chain(text.chars())
        .chain(std::iter::once(PAD_END))
        .collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

#[derive(Debug)]
struct GuideName {
    normalized: String,
    char_len: usize,
    channel: usize,
}

/// Immutable catalog snapshot with its lookup structures
struct GuideCatalog {
    channels: Vec<GuideChannel>,
    by_id: HashMap<String, usize>,
    /// Distinct normalized names, catalog order
    names: Vec<GuideName>,
    exact: HashMap<String, usize>,
    blocks: HashMap<(char, char), Vec<usize>>,
    memo: Mutex<LruCache<String, Option<String>>>,
}

impl GuideCatalog {
    fn build(channels: Vec<GuideChannel>) -> Self {
        let mut by_id = HashMap::with_capacity(channels.len());
        let mut names = Vec::new();
        let mut exact = HashMap::new();

        for (pos, channel) in channels.iter().enumerate() {
            by_id.entry(channel.id.clone()).or_insert(pos);
            for name in &channel.names {
                let normalized = NameNormalizer::normalize_guide(name);
                if normalized.is_empty() || exact.contains_key(&normalized) {
                    continue;
                }
                exact.insert(normalized.clone(), names.len());
                names.push(GuideName {
                    char_len: normalized.chars().count(),
                    normalized,
                    channel: pos,
                });
            }
        }

        let mut blocks: HashMap<(char, char), Vec<usize>> = HashMap::new();
        for (idx, name) in names.iter().enumerate() {
            let mut grams = bigrams(&name.normalized);
            grams.sort_unstable();
            grams.dedup();
            for gram in grams {
                blocks.entry(gram).or_default().push(idx);
            }
        }

        Self {
            channels,
            by_id,
            names,
            exact,
            blocks,
            memo: Mutex::new(LruCache::new(
                NonZeroUsize::new(IDENTITY_MEMO_SIZE).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    fn id_of(&self, name_idx: usize) -> String {
        self.channels[self.names[name_idx].channel].id.clone()
    }

    fn lookup(&self, normalized: &str) -> Option<String> {
        if let Some(&idx) = self.exact.get(normalized) {
            return Some(self.id_of(idx));
        }
        self.fuzzy(normalized).map(|idx| self.id_of(idx))
    }

    /// Best name above the threshold among names sharing a bigram; ties keep catalog order
    fn fuzzy(&self, query: &str) -> Option<usize> {
        let query_len = query.chars().count();
        if query_len == 0 {
            return None;
        }

        let mut candidates = BTreeSet::new();
        for gram in bigrams(query) {
            if let Some(block) = self.blocks.get(&gram) {
                candidates.extend(block.iter().copied());
            }
        }

        let mut best: Option<(f64, usize)> = None;
        for idx in candidates {
            let name = &self.names[idx];
            // Length difference alone already bounds the edit distance
            let (lo, hi) = if name.char_len < query_len {
                (name.char_len, query_len)
            } else {
                (query_len, name.char_len)
            };
            if (lo as f64) <= FUZZY_THRESHOLD * hi as f64 {
                continue;
            }

            let ratio = similarity(query, &name.normalized);
            if ratio > FUZZY_THRESHOLD && best.map_or(true, |(b, _)| ratio > b) {
                best = Some((ratio, idx));
            }
        }
        best.map(|(_, idx)| idx)
    }
}

/// Channel-identity catalog loaded from an XMLTV guide
pub struct ProgramGuideIndex {
    source_url: Option<String>,
    cache: GuideCache,
    max_age: chrono::Duration,
    fetcher: M3UParser,
    catalog: RwLock<Option<Arc<GuideCatalog>>>,
}

impl ProgramGuideIndex {
    pub fn new(
        source_url: Option<String>,
        cache: GuideCache,
        max_age: chrono::Duration,
        fetcher: M3UParser,
    ) -> Self {
        Self {
            source_url,
            cache,
            max_age,
            fetcher,
            catalog: RwLock::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = M3UParser::new(
            &config.user_agent,
            config.fetch_timeout(),
            config.max_retries,
            config.max_playlist_size_mb,
        )?;
        Ok(Self::new(
            config.epg_url.clone(),
            GuideCache::new(&config.epg_cache_dir),
            config.epg_cache_max_age(),
            fetcher,
        ))
    }

    /// Load the catalog: fresh cache, then remote (persisting a new artifact),
    /// then stale cache. Failure keeps the previous catalog and returns `(false, 0)`.
    pub async fn load(&self) -> (bool, usize) {
        let Some(url) = self.source_url.clone() else {
            tracing::warn!("No program guide URL configured");
            return (false, 0);
        };

        let cached = self.cache.read(&url).await;
        if let Some(artifact) = cached.as_ref().filter(|a| a.is_fresh(self.max_age) && !a.channels.is_empty()) {
            let count = self.install(artifact.channels.clone());
            tracing::info!("guide_load" = "cache", "channels" = count, "age_hours" = artifact.age().num_hours());
            return (true, count);
        }

        match self.fetch_remote(&url).await {
            Ok(channels) => {
                let artifact = GuideArtifact::new(url.clone(), channels);
                if let Err(e) = self.cache.write(&artifact).await {
                    tracing::warn!("Failed to persist guide cache: {:#}", e);
                }
                let count = self.install(artifact.channels);
                tracing::info!("guide_load" = "remote", "channels" = count);
                return (true, count);
            }
            Err(e) => {
                tracing::warn!("guide_fetch_failed" = %url, "error" = %e);
            }
        }

        if let Some(artifact) = cached.filter(|a| !a.channels.is_empty()) {
            let count = self.install(artifact.channels);
            tracing::info!("guide_load" = "stale_cache", "channels" = count);
            return (true, count);
        }

        tracing::warn!("Program guide unavailable, identity matching disabled");
        (false, 0)
    }

    async fn fetch_remote(&self, url: &str) -> Result<Vec<GuideChannel>> {
        let bytes = self
            .fetcher
            .fetch_bytes(url)
            .await
            .map_err(|e| RelinkError::Guide(format!("{:#}", e)))?;

        tokio::task::spawn_blocking(move || parse_catalog(&bytes))
            .await
            .map_err(|e| RelinkError::Guide(format!("parser task failed: {}", e)))?
    }

    /// Load a catalog document the host obtained itself
    pub fn load_from_str(&self, xml: &str) -> Result<usize> {
        let channels = parse_catalog(xml.as_bytes())?;
        Ok(self.install(channels))
    }

    /// Load in the background; the receiver flips from `Loading` once done
    pub fn spawn_load(self: &Arc<Self>) -> watch::Receiver<GuideState> {
        let (tx, rx) = watch::channel(GuideState::Loading);
        let index = Arc::clone(self);
        tokio::spawn(async move {
            let (ok, count) = index.load().await;
            let state = if ok {
                GuideState::Ready(count)
            } else {
                GuideState::Unavailable
            };
            let _ = tx.send(state);
        });
        rx
    }

    /// Swap in a new catalog (memo goes with the old one)
    fn install(&self, channels: Vec<GuideChannel>) -> usize {
        let catalog = Arc::new(GuideCatalog::build(channels));
        let count = catalog.channels.len();
        *self.catalog.write().unwrap() = Some(catalog);
        count
    }

    fn snapshot(&self) -> Option<Arc<GuideCatalog>> {
        self.catalog.read().unwrap().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.catalog.read().unwrap().is_some()
    }

    pub fn channel_count(&self) -> usize {
        self.snapshot().map(|c| c.channels.len()).unwrap_or(0)
    }

    /// Guide identity for a free-text channel name
    pub fn find_identity(&self, name: &str) -> Option<String> {
        let catalog = self.snapshot()?;
        let key = NameNormalizer::normalize_guide(name);
        if key.is_empty() {
            return None;
        }

        if let Some(hit) = catalog.memo.lock().unwrap().get(&key) {
            return hit.clone();
        }

        let result = catalog.lookup(&key);
        catalog.memo.lock().unwrap().put(key, result.clone());
        result
    }

    pub fn get_names(&self, id: &str) -> Vec<String> {
        self.get_channel(id).map(|c| c.names).unwrap_or_default()
    }

    pub fn get_channel(&self, id: &str) -> Option<GuideChannel> {
        let catalog = self.snapshot()?;
        catalog.by_id.get(id).map(|&pos| catalog.channels[pos].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::time::Duration;

    const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="test">
  <channel id="bbc1.uk">
    <display-name>BBC One</display-name>
    <display-name>BBC One HD</display-name>
    <icon src="http://logo.example/bbc1.png"/>
  </channel>
  <channel id="news24.id">
    <display-name>News 24</display-name>
  </channel>
  <channel id="canal.fr">
    <display-name>Canal+ &amp; Cinéma</display-name>
  </channel>
  <programme start="20240101000000 +0000" stop="20240101010000 +0000" channel="bbc1.uk">
    <title>News at Midnight</title>
  </programme>
</tv>"#;

    fn offline_index(dir: &std::path::Path) -> ProgramGuideIndex {
        let fetcher = M3UParser::new("test", Duration::from_secs(1), 0, 10).unwrap();
        ProgramGuideIndex::new(None, GuideCache::new(dir), chrono::Duration::days(7), fetcher)
    }

    #[test]
    fn test_parse_catalog() {
        let channels = parse_catalog(SAMPLE_XML.as_bytes()).unwrap();
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].names, vec!["BBC One", "BBC One HD"]);
        assert_eq!(channels[0].icon_url.as_deref(), Some("http://logo.example/bbc1.png"));
        assert_eq!(channels[2].names, vec!["Canal+ & Cinéma"]);
    }

    #[test]
    fn test_parse_gzip_catalog() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(SAMPLE_XML.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let channels = parse_catalog(&compressed).unwrap();
        assert_eq!(channels.len(), 3);
    }

    #[test]
    fn test_malformed_catalog_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let index = offline_index(dir.path());
        assert_eq!(index.load_from_str(SAMPLE_XML).unwrap(), 3);

        let broken = "<tv><channel id=\"x\"><display-name>X</display-name></tv>";
        assert!(index.load_from_str(broken).is_err());
        assert_eq!(index.channel_count(), 3);
        assert_eq!(index.find_identity("BBC One").as_deref(), Some("bbc1.uk"));
    }

    #[test]
    fn test_exact_and_fuzzy_identity() {
        let dir = tempfile::tempdir().unwrap();
        let index = offline_index(dir.path());
        assert!(index.find_identity("BBC One").is_none());
        index.load_from_str(SAMPLE_XML).unwrap();

        assert_eq!(index.find_identity("bbc one uk").as_deref(), Some("bbc1.uk"));
        assert_eq!(index.find_identity("News24").as_deref(), Some("news24.id"));
        assert_eq!(index.find_identity("NEWS 24 HD").as_deref(), Some("news24.id"));
        assert!(index.find_identity("Discovery Science").is_none());
        // memoized answers stay the same
        assert_eq!(index.find_identity("News24").as_deref(), Some("news24.id"));
    }

    #[test]
    fn test_blocking_matches_linear_scan() {
        let catalog = GuideCatalog::build(parse_catalog(SAMPLE_XML.as_bytes()).unwrap());
        for query in ["news24", "bbc on", "canal cinema", "bcc one", "xyz"] {
            let linear = catalog
                .names
                .iter()
                .enumerate()
                .map(|(i, n)| (similarity(query, &n.normalized), i))
                .filter(|(s, _)| *s > FUZZY_THRESHOLD)
                .fold(None, |best: Option<(f64, usize)>, (s, i)| match best {
                    Some((b, _)) if s <= b => best,
                    _ => Some((s, i)),
                })
                .map(|(_, i)| i);
            assert_eq!(catalog.fuzzy(query), linear, "query {:?}", query);
        }
    }

    #[test]
    fn test_get_names_and_channel() {
        let dir = tempfile::tempdir().unwrap();
        let index = offline_index(dir.path());
        index.load_from_str(SAMPLE_XML).unwrap();

        assert_eq!(index.get_names("bbc1.uk"), vec!["BBC One", "BBC One HD"]);
        assert!(index.get_channel("missing").is_none());
        assert!(index.get_names("missing").is_empty());
    }

    #[tokio::test]
    async fn test_load_without_url_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(offline_index(dir.path()));
        let mut rx = index.spawn_load();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), GuideState::Unavailable);
        assert!(!index.is_loaded());
    }

    #[tokio::test]
    async fn test_load_prefers_fresh_cache_then_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GuideCache::new(dir.path());
        // Unroutable URL: remote always fails
        let url = "http://127.0.0.1:9/epg.xml".to_string();
        let channels = parse_catalog(SAMPLE_XML.as_bytes()).unwrap();

        let mut artifact = GuideArtifact::new(url.clone(), channels);
        cache.write(&artifact).await.unwrap();

        let fetcher = M3UParser::new("test", Duration::from_millis(500), 0, 10).unwrap();
        let index = ProgramGuideIndex::new(Some(url.clone()), cache.clone(), chrono::Duration::days(7), fetcher);
        assert_eq!(index.load().await, (true, 3));

        // Stale artifact is still used once the remote fetch fails
        artifact.fetched_at = chrono::Utc::now() - chrono::Duration::days(30);
        cache.write(&artifact).await.unwrap();
        let fetcher = M3UParser::new("test", Duration::from_millis(500), 0, 10).unwrap();
        let index = ProgramGuideIndex::new(Some(url), cache, chrono::Duration::days(7), fetcher);
        assert_eq!(index.load().await, (true, 3));
    }

    async fn spawn_guide_server() -> String {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(SAMPLE_XML.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let app = Router::new()
            .route("/epg.xml", get(|| async { SAMPLE_XML }))
            .route(
                "/epg.xml.gz",
                get(move || {
                    let body = compressed.clone();
                    async move { body }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_remote_load_persists_fresh_artifact() {
        let base = spawn_guide_server().await;
        let dir = tempfile::tempdir().unwrap();
        let cache = GuideCache::new(dir.path());

        for path in ["/epg.xml", "/epg.xml.gz"] {
            let url = format!("{}{}", base, path);
            assert!(cache.read(&url).await.is_none());

            let fetcher = M3UParser::new("test", Duration::from_secs(2), 0, 10).unwrap();
            let index = ProgramGuideIndex::new(Some(url.clone()), cache.clone(), chrono::Duration::days(7), fetcher);
            assert_eq!(index.load().await, (true, 3));
            assert_eq!(index.find_identity("BBC One").as_deref(), Some("bbc1.uk"));

            let artifact = cache.read(&url).await.unwrap();
            assert_eq!(artifact.source_url, url);
            assert_eq!(artifact.channels.len(), 3);
            assert!(artifact.is_fresh(chrono::Duration::days(7)));
        }
    }
}
