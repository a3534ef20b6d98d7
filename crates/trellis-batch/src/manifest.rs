use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::job::RunRecord;

#[derive(Debug, Serialize, Deserialize)]
pub struct RunManifest {
    pub created_at: DateTime<Utc>,
    pub kind: String,
    pub num_runs: usize,
    pub success: usize,
    pub failure: usize,
    pub runs: Vec<RunRecord>,
}

impl RunManifest {
    pub fn new(kind: &str, runs: Vec<RunRecord>) -> Self {
        let success = runs.iter().filter(|r| r.is_ok()).count();
        Self {
            created_at: Utc::now(),
            kind: kind.to_string(),
            num_runs: runs.len(),
            success,
            failure: runs.len() - success,
            runs,
        }
    }
}

pub fn write_run_manifest(path: &Path, manifest: &RunManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating manifest directory '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(manifest).context("serializing run manifest")?;
    fs::write(path, json)
        .with_context(|| format!("writing run manifest '{}'", path.display()))?;
    Ok(())
}

pub fn load_run_manifest(path: &Path) -> Result<RunManifest> {
    let file = fs::File::open(path)
        .with_context(|| format!("opening run manifest '{}'", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing run manifest '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_manifest_writes_and_reads_back() {
        let records = vec![
            RunRecord::ok("ws:sc1".into(), Some("sc1".into()), 40.0, 3.2e6),
            RunRecord::failed("ws:sc2".into(), Some("sc2".into()), "infeasible".into()),
        ];
        let manifest = RunManifest::new("wait-and-see", records);
        assert_eq!(manifest.success, 1);
        assert_eq!(manifest.failure, 1);

        let tmp = NamedTempFile::new().unwrap();
        write_run_manifest(tmp.path(), &manifest).unwrap();
        let parsed = load_run_manifest(tmp.path()).unwrap();
        assert_eq!(parsed.kind, "wait-and-see");
        assert_eq!(parsed.runs.len(), 2);
        assert_eq!(parsed.runs[0].run_id, "ws:sc1");
    }
}
