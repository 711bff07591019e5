use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::models::GuideChannel;
use crate::services::m3u_parser::hash_url;

/// Persisted copy of a parsed guide catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideArtifact {
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
    pub channels: Vec<GuideChannel>,
}

impl GuideArtifact {
    pub fn new(source_url: impl Into<String>, channels: Vec<GuideChannel>) -> Self {
        Self {
            source_url: source_url.into(),
            fetched_at: Utc::now(),
            channels,
        }
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.fetched_at
    }

    /// True while the artifact is within the freshness window
    pub fn is_fresh(&self, max_age: chrono::Duration) -> bool {
        self.age() <= max_age
    }
}

/// Disk cache for guide catalogs, one `<sha1(url)>.guide.json` per catalog URL
#[derive(Debug, Clone)]
pub struct GuideCache {
    cache_dir: PathBuf,
}

impl GuideCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Read the artifact for `url`; missing or unreadable artifacts yield `None`
    pub async fn read(&self, url: &str) -> Option<GuideArtifact> {
        let path = self.artifact_path(url);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read guide cache {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<GuideArtifact>(&content) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                tracing::warn!("Failed to parse guide cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Persist an artifact (temp file + atomic rename)
    pub async fn write(&self, artifact: &GuideArtifact) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.cache_dir.display()))?;

        let path = self.artifact_path(&artifact.source_url);
        let tmp_path = self.artifact_tmp_path(&artifact.source_url);

        let file = File::create(&tmp_path).await?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);
        let content = serde_json::to_vec(artifact)?;
        writer.write_all(&content).await?;
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        drop(writer);

        // Atomic replace to avoid readers seeing partial writes
        let _ = fs::remove_file(&path).await;
        fs::rename(&tmp_path, &path).await?;

        tracing::debug!(
            "guide_cache_written" = %path.display(),
            "channels" = artifact.channels.len()
        );
        Ok(())
    }

    pub async fn remove(&self, url: &str) -> Result<()> {
        let _ = fs::remove_file(self.artifact_path(url)).await;
        let _ = fs::remove_file(self.artifact_tmp_path(url)).await;
        Ok(())
    }

    pub fn artifact_path(&self, url: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.guide.json", hash_url(url)))
    }

    fn artifact_tmp_path(&self, url: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.guide.json.tmp", hash_url(url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_channels() -> Vec<GuideChannel> {
        vec![GuideChannel {
            id: "bbc1.uk".to_string(),
            names: vec!["BBC One".to_string(), "BBC 1".to_string()],
            icon_url: None,
        }]
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GuideCache::new(dir.path().join("nested"));
        let artifact = GuideArtifact::new("http://guide.example/epg.xml", sample_channels());

        cache.write(&artifact).await.unwrap();
        let loaded = cache.read("http://guide.example/epg.xml").await.unwrap();

        assert_eq!(loaded.channels, artifact.channels);
        assert!(loaded.is_fresh(chrono::Duration::hours(1)));
        assert!(!cache.artifact_tmp_path("http://guide.example/epg.xml").exists());
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GuideCache::new(dir.path());
        assert!(cache.read("http://nowhere/epg.xml").await.is_none());

        std::fs::write(cache.artifact_path("http://broken/epg.xml"), b"{not json").unwrap();
        assert!(cache.read("http://broken/epg.xml").await.is_none());
    }

    #[test]
    fn test_freshness_window() {
        let mut artifact = GuideArtifact::new("http://guide.example/epg.xml", Vec::new());
        artifact.fetched_at = Utc::now() - chrono::Duration::days(8);
        assert!(!artifact.is_fresh(chrono::Duration::days(7)));
        assert!(artifact.is_fresh(chrono::Duration::days(9)));
    }
}
