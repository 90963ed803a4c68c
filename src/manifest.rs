use crate::constants::MANIFEST_FILE;
use crate::error::Result;
use crate::pipeline::StageCounts;
use crate::query::{PriceBin, QueryConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChecksumMeta {
    pub sha256: String,
}

impl ChecksumMeta {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            sha256: hex::encode(hasher.finalize()),
        }
    }
}

/// What was requested for one price bin and what came back
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FetchRecord {
    pub region_id: String,
    pub bin: PriceBin,
    pub url: String,
    pub status: Option<u16>,
    pub rows: usize,
    pub size_bytes: u64,
    pub checksum: ChecksumMeta,
    pub fetched_at: DateTime<Utc>,
}

/// Summary of one pipeline run, written next to the exported tables
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub query: Option<QueryConfig>,
    pub fetches: Vec<FetchRecord>,
    pub counts: StageCounts,
    pub artifacts: Vec<PathBuf>,
}

impl RunManifest {
    pub fn new(source: impl Into<String>, query: Option<QueryConfig>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source: source.into(),
            started_at: Utc::now(),
            finished_at: None,
            query,
            fetches: Vec::new(),
            counts: StageCounts::default(),
            artifacts: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(MANIFEST_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_hex_sha256() {
        let checksum = ChecksumMeta::of(b"abc");
        assert_eq!(
            checksum.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_manifest_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = RunManifest::new("redfin", Some(QueryConfig::default()));
        manifest.counts.fetched = 12;
        manifest.finish();

        let path = manifest.write(dir.path()).unwrap();
        let loaded: RunManifest =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded.run_id, manifest.run_id);
        assert_eq!(loaded.counts.fetched, 12);
        assert!(loaded.finished_at.is_some());
    }
}
