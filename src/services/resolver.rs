use std::sync::Arc;

use crate::models::{ChannelEntry, LinkStatus};
use crate::services::channel_index::ChannelIndex;
use crate::services::epg::{ProgramGuideIndex, FUZZY_THRESHOLD};
use crate::services::normalizer::{similarity, NameNormalizer};

/// Source names containing one of these are preferred
const TRUST_KEYWORDS: &[&str] = &["official", "stable", "main", "primary"];

/// Additive bonuses used to rank candidates
#[derive(Debug, Clone)]
pub struct ScoreWeights {
    pub identity_match: i32,
    pub working: i32,
    pub checked: i32,
    pub exact_name: i32,
    pub substring: i32,
    pub per_shared_word: i32,
    pub https: i32,
    pub https_priority: bool,
    pub stable: i32,
    pub safe: i32,
    pub fast_response: i32,
    pub ok_response: i32,
    pub known_identity: i32,
    pub link_options: i32,
    pub trusted_source: i32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            identity_match: 100,
            working: 40,
            checked: 20,
            exact_name: 50,
            substring: 30,
            per_shared_word: 10,
            https: 20,
            https_priority: true,
            stable: 15,
            safe: 10,
            fast_response: 10,
            ok_response: 5,
            known_identity: 25,
            link_options: 30,
            trusted_source: 20,
        }
    }
}

/// A chosen replacement and how it was found
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub entry: Arc<ChannelEntry>,
    pub score: i32,
    pub via_identity: bool,
}

/// Picks the best replacement for a channel from a channel index snapshot
#[derive(Clone)]
pub struct CandidateResolver {
    index: Arc<ChannelIndex>,
    guide: Option<Arc<ProgramGuideIndex>>,
    weights: ScoreWeights,
}

impl CandidateResolver {
    pub fn new(index: Arc<ChannelIndex>, guide: Option<Arc<ProgramGuideIndex>>, weights: ScoreWeights) -> Self {
        Self { index, guide, weights }
    }

    fn loaded_guide(&self) -> Option<&ProgramGuideIndex> {
        self.guide.as_deref().filter(|g| g.is_loaded())
    }

    /// Additive score of one candidate
    pub fn score(&self, candidate: &ChannelEntry, via_identity: bool, search_name: Option<&str>) -> i32 {
        let w = &self.weights;
        let mut score = 0;

        if via_identity {
            score += w.identity_match;
        }

        if candidate.status == LinkStatus::Working {
            score += w.working;
        }
        if candidate.last_checked_at.is_some() {
            score += w.checked;
        }

        if let Some(search) = search_name {
            let target = NameNormalizer::normalize(search);
            let name = NameNormalizer::normalize(&candidate.name);
            if !target.is_empty() && target == name {
                score += w.exact_name;
            } else if !target.is_empty() && !name.is_empty() && (name.contains(&target) || target.contains(&name)) {
                score += w.substring;
            } else {
                let target_words = NameNormalizer::words(&target);
                let shared = NameNormalizer::words(&name)
                    .intersection(&target_words)
                    .count() as i32;
                score += w.per_shared_word * shared;
            }
        }

        if w.https_priority && candidate.url_str().to_lowercase().starts_with("https://") {
            score += w.https;
        }
        if let Some(quality) = &candidate.quality {
            if quality.is_stable {
                score += w.stable;
            }
            if quality.is_safe {
                score += w.safe;
            }
        }

        match candidate.response_time_secs {
            Some(t) if t < 2.0 => score += w.fast_response,
            Some(t) if t < 5.0 => score += w.ok_response,
            _ => {}
        }

        if candidate.identity_id.is_some() {
            score += w.known_identity;
        }
        if !candidate.link_options.is_empty() {
            score += w.link_options;
        }

        let source = candidate.source.to_lowercase();
        if TRUST_KEYWORDS.iter().any(|k| source.contains(k)) {
            score += w.trusted_source;
        }

        score
    }

    /// Best replacement for `target_name`
    pub fn resolve(&self, target_name: &str, use_identity: bool) -> Option<Arc<ChannelEntry>> {
        self.resolve_scored(target_name, use_identity).map(|c| c.entry)
    }

    pub fn resolve_scored(&self, target_name: &str, use_identity: bool) -> Option<ScoredCandidate> {
        let target_identity = if use_identity {
            self.loaded_guide().and_then(|g| g.find_identity(target_name))
        } else {
            None
        };
        self.resolve_inner(target_name, target_identity, &[])
    }

    /// Resolve a playlist entry: its own `tvg-id` is trusted before the guide,
    /// and candidates carrying the entry's current or original URL are ignored.
    pub fn resolve_entry(&self, target: &ChannelEntry, use_identity: bool) -> Option<ScoredCandidate> {
        let target_identity = if use_identity {
            target
                .identity_id
                .clone()
                .or_else(|| self.loaded_guide().and_then(|g| g.find_identity(&target.name)))
        } else {
            None
        };
        let excluded: Vec<&str> = target
            .url
            .as_deref()
            .into_iter()
            .chain(target.original_url.as_deref())
            .collect();
        self.resolve_inner(&target.name, target_identity, &excluded)
    }

    fn resolve_inner(&self, target_name: &str, target_identity: Option<String>, excluded: &[&str]) -> Option<ScoredCandidate> {
        if let Some(identity) = target_identity {
            if let Some(found) = self.resolve_by_identity(target_name, &identity, excluded) {
                tracing::debug!("Resolved {} via identity {}", target_name, identity);
                return Some(found);
            }
        }
        self.resolve_by_text(target_name, excluded)
    }

    /// First key whose identity equals the target's wins
    fn resolve_by_identity(&self, target_name: &str, identity: &str, excluded: &[&str]) -> Option<ScoredCandidate> {
        let guide = self.loaded_guide();

        for key in self.index.all_keys() {
            let candidates = self.index.candidates_for(key);
            let key_identity = candidates
                .iter()
                .find_map(|c| c.identity_id.clone())
                .or_else(|| guide.and_then(|g| g.find_identity(key)));

            if key_identity.as_deref() != Some(identity) {
                continue;
            }

            let best = self.best_of(candidates.iter(), true, target_name, excluded);
            if best.is_some() {
                return best;
            }
        }
        None
    }

    /// Substring either way or similarity above the threshold; every matching key is scored
    fn resolve_by_text(&self, target_name: &str, excluded: &[&str]) -> Option<ScoredCandidate> {
        let target = NameNormalizer::normalize(target_name);
        if target.is_empty() {
            return None;
        }

        let matching = self
            .index
            .all_keys()
            .filter(|key| key.contains(target.as_str()) || target.contains(key) || similarity(&target, key) > FUZZY_THRESHOLD)
            .flat_map(|key| self.index.candidates_for(key).iter());

        self.best_of(matching, false, target_name, excluded)
    }

    /// Highest score; the first candidate reaching it wins
    fn best_of<'a>(
        &self,
        candidates: impl Iterator<Item = &'a Arc<ChannelEntry>>,
        via_identity: bool,
        target_name: &str,
        excluded: &[&str],
    ) -> Option<ScoredCandidate> {
        let mut best: Option<ScoredCandidate> = None;
        for candidate in candidates {
            if !candidate.has_link() || excluded.contains(&candidate.url_str()) {
                continue;
            }
            let score = self.score(candidate, via_identity, Some(target_name));
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(ScoredCandidate {
                    entry: Arc::clone(candidate),
                    score,
                    via_identity,
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::GuideCache;
    use crate::services::m3u_parser::M3UParser;
    use crate::services::quality::LinkQualityAnalyzer;
    use std::time::Duration;

    const GUIDE_XML: &str = r#"<tv>
  <channel id="bbc1.uk"><display-name>BBC One</display-name><display-name>BBC 1</display-name></channel>
  <channel id="news24.id"><display-name>News 24</display-name></channel>
</tv>"#;

    fn entry(name: &str, url: &str, source: &str, identity: Option<&str>) -> ChannelEntry {
        let mut e = ChannelEntry::new(name, Some(url.to_string()));
        e.source = source.to_string();
        e.identity_id = identity.map(str::to_string);
        e.quality = Some(LinkQualityAnalyzer::analyze(url));
        e
    }

    fn guide() -> Arc<ProgramGuideIndex> {
        let dir = std::env::temp_dir();
        let fetcher = M3UParser::new("test", Duration::from_secs(1), 0, 10).unwrap();
        let guide = ProgramGuideIndex::new(None, GuideCache::new(dir), chrono::Duration::days(7), fetcher);
        guide.load_from_str(GUIDE_XML).unwrap();
        Arc::new(guide)
    }

    fn resolver(entries: Vec<ChannelEntry>, guide: Option<Arc<ProgramGuideIndex>>) -> CandidateResolver {
        let mut index = ChannelIndex::new();
        for e in entries {
            index.add(e);
        }
        CandidateResolver::new(Arc::new(index), guide, ScoreWeights::default())
    }

    #[test]
    fn test_score_components() {
        let r = resolver(Vec::new(), None);
        let mut candidate = entry("News 24", "https://cdn.cloudfront.net/n.m3u8", "Main list", Some("news24.id"));
        candidate.status = LinkStatus::Working;
        candidate.last_checked_at = Some(chrono::Utc::now());
        candidate.response_time_secs = Some(1.2);
        candidate.link_options.insert("http-user-agent", "UA");

        // 40 + 20 + 50 + 20 + 15 + 10 + 10 + 25 + 30 + 20
        assert_eq!(r.score(&candidate, false, Some("NEWS 24")), 240);
        assert_eq!(r.score(&candidate, true, Some("NEWS 24")), 340);
    }

    #[test]
    fn test_shared_words_bonus() {
        let r = resolver(Vec::new(), None);
        let candidate = entry("Sky Sports News", "http://x/1", "b", None);
        // http plain: 100 - 10 = 90 -> stable and safe
        assert_eq!(r.score(&candidate, false, Some("Sky News")), 20 + 15 + 10);
    }

    #[test]
    fn test_identity_short_circuit_beats_lexical_match() {
        let entries = vec![
            entry("BBC One Extra", "https://cdn.cloudfront.net/extra.m3u8", "primary", None),
            entry("BBC 1", "http://other.example/bbc1", "b", Some("bbc1.uk")),
        ];
        let r = resolver(entries, Some(guide()));

        let found = r.resolve_scored("BBC One", true).unwrap();
        assert!(found.via_identity);
        assert_eq!(found.entry.url_str(), "http://other.example/bbc1");

        let lexical = r.resolve_scored("BBC One", false).unwrap();
        assert!(!lexical.via_identity);
        assert_eq!(lexical.entry.url_str(), "https://cdn.cloudfront.net/extra.m3u8");
    }

    #[test]
    fn test_key_identity_falls_back_to_guide() {
        let entries = vec![entry("BBC 1", "http://x/bbc1", "a", None)];
        let r = resolver(entries, Some(guide()));
        let found = r.resolve_scored("BBC One", true).unwrap();
        assert!(found.via_identity);
    }

    #[test]
    fn test_tie_breaks_by_insertion_order() {
        let entries = vec![
            entry("CNN", "http://first/cnn", "a", None),
            entry("CNN", "http://second/cnn", "a", None),
        ];
        let r = resolver(entries, None);
        for _ in 0..3 {
            assert_eq!(r.resolve("CNN", true).unwrap().url_str(), "http://first/cnn");
        }
    }

    #[test]
    fn test_no_candidates() {
        let r = resolver(vec![entry("CNN", "http://x/cnn", "a", None)], None);
        assert!(r.resolve("Discovery Science", true).is_none());
        assert!(r.resolve("", true).is_none());
    }

    #[test]
    fn test_fuzzy_name_without_guide() {
        let r = resolver(
            vec![entry("News24", "http://good.cdn/stream.m3u8", "a", Some("news24.id"))],
            None,
        );
        let target = ChannelEntry::new("News 24", None);
        let found = r.resolve_entry(&target, true).unwrap();
        assert_eq!(found.entry.url_str(), "http://good.cdn/stream.m3u8");
    }

    #[test]
    fn test_resolve_entry_skips_current_url() {
        let r = resolver(
            vec![
                entry("CNN", "http://dead/cnn", "a", None),
                entry("CNN", "http://alive/cnn", "b", None),
            ],
            None,
        );
        let mut target = ChannelEntry::new("CNN", Some("http://dead/cnn".to_string()));
        target.status = LinkStatus::Broken;
        assert_eq!(r.resolve_entry(&target, false).unwrap().entry.url_str(), "http://alive/cnn");
    }

    #[test]
    fn test_resolve_entry_never_proposes_original_url() {
        let r = resolver(
            vec![
                entry("CNN", "http://a/orig", "a", None),
                entry("CNN", "http://b/new", "a", None),
                entry("CNN", "http://c/third", "a", None),
            ],
            None,
        );
        let mut target = ChannelEntry::new("CNN", Some("http://b/new".to_string()));
        target.original_url = Some("http://a/orig".to_string());
        target.status = LinkStatus::Broken;
        assert_eq!(r.resolve_entry(&target, false).unwrap().entry.url_str(), "http://c/third");
    }
}
