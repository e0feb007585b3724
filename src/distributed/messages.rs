//! Versioned wire messages for the distributed mode.
//!
//! Tasks and results cross the broker as JSON carrying an explicit
//! `schema_version`; consumers reject versions they do not understand
//! rather than misparse them.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::PageArtifact;
use crate::frontier::FrontierEntry;
use crate::urlnorm::Normalizer;

pub const SCHEMA_VERSION: u32 = 1;

/// A URL to crawl, published on the `tasks` topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub url: String,
    pub depth: usize,
    pub discovered_from: Option<String>,
    pub priority_score: f64,
    pub inserted_at: DateTime<Utc>,
    pub schema_version: u32,
}

impl TaskMessage {
    #[must_use]
    pub fn from_entry(entry: &FrontierEntry) -> Self {
        Self {
            url: entry.url.to_string(),
            depth: entry.depth,
            discovered_from: entry.discovered_from.as_ref().map(ToString::to_string),
            priority_score: entry.priority_score,
            inserted_at: entry.inserted_at,
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Convert back into a frontier entry, re-normalizing the URL so a
    /// malformed or tampered message cannot smuggle in a non-canonical
    /// key.
    pub fn into_entry(self, normalizer: &Normalizer) -> Result<FrontierEntry> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported task schema version {}",
                self.schema_version
            ));
        }
        let url = normalizer
            .normalize(&self.url, None)
            .map_err(|e| anyhow!("task url rejected: {e}"))?;
        let discovered_from = self
            .discovered_from
            .and_then(|raw| normalizer.normalize(&raw, None).ok());

        let mut entry = FrontierEntry::new(url, self.depth, discovered_from);
        entry.priority_score = self.priority_score;
        entry.inserted_at = self.inserted_at;
        Ok(entry)
    }
}

/// A completed (or terminally failed) page, published on the `results`
/// topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMessage {
    pub url: String,
    pub final_url: Option<String>,
    pub http_status: Option<u16>,
    pub content_hash_hex: Option<String>,
    pub content_type: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub depth: usize,
    pub discovered: Vec<String>,
    pub error: Option<String>,
    pub schema_version: u32,
}

impl ResultMessage {
    #[must_use]
    pub fn from_artifact(artifact: &PageArtifact) -> Self {
        Self {
            url: artifact.url.to_string(),
            final_url: artifact.final_url.as_ref().map(ToString::to_string),
            http_status: artifact.http_status,
            content_hash_hex: artifact.content_hash_hex.clone(),
            content_type: artifact.content_type.clone(),
            fetched_at: artifact.fetched_at,
            depth: artifact.depth,
            discovered: artifact.discovered.iter().map(ToString::to_string).collect(),
            error: artifact.error.as_ref().map(|e| e.message.clone()),
            schema_version: SCHEMA_VERSION,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported result schema version {}",
                self.schema_version
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_roundtrip() {
        let normalizer = Normalizer::default();
        let entry = FrontierEntry::new(
            normalizer.normalize("http://s.test/a", None).unwrap(),
            2,
            Some(normalizer.normalize("http://s.test/", None).unwrap()),
        )
        .with_priority(0.7);

        let message = TaskMessage::from_entry(&entry);
        let json = serde_json::to_string(&message).unwrap();
        let parsed: TaskMessage = serde_json::from_str(&json).unwrap();
        let restored = parsed.into_entry(&normalizer).unwrap();

        assert_eq!(restored.url.as_str(), "http://s.test/a");
        assert_eq!(restored.depth, 2);
        assert_eq!(restored.priority_score, 0.7);
        assert_eq!(
            restored.discovered_from.unwrap().as_str(),
            "http://s.test/"
        );
    }

    #[test]
    fn wrong_schema_version_rejected() {
        let normalizer = Normalizer::default();
        let message = TaskMessage {
            url: "http://s.test/a".to_string(),
            depth: 0,
            discovered_from: None,
            priority_score: 0.0,
            inserted_at: Utc::now(),
            schema_version: 99,
        };
        assert!(message.into_entry(&normalizer).is_err());
    }

    #[test]
    fn task_url_renormalized() {
        let normalizer = Normalizer::default();
        let message = TaskMessage {
            url: "HTTP://S.Test:80/a/#frag".to_string(),
            depth: 0,
            discovered_from: None,
            priority_score: 0.0,
            inserted_at: Utc::now(),
            schema_version: SCHEMA_VERSION,
        };
        let entry = message.into_entry(&normalizer).unwrap();
        assert_eq!(entry.url.as_str(), "http://s.test/a");
    }
}
