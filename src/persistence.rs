//! Persistence Layer: atomic whole-file JSON snapshot of the Primary
//! Store, plus backup/restore.
//!
//! Every write goes to a temporary path first, then `rename`s into
//! place, so a crash mid-write leaves the previous snapshot intact.
use crate::error::{VectorStoreError, VectorStoreResult};
use crate::record::Record;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const SNAPSHOT_FILE: &str = "vectors.json";

pub fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

/// Serialize `records` and write atomically: write to `<file>.tmp` then
/// rename over the destination. A crash mid-write leaves the previous
/// snapshot intact.
pub async fn write_snapshot(dir: &Path, records: &HashMap<String, Record>) -> VectorStoreResult<()> {
    fs::create_dir_all(dir).await?;
    let path = snapshot_path(dir);
    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec(records)?;
    fs::write(&tmp_path, &bytes).await?;
    fs::rename(&tmp_path, &path).await?;
    Ok(())
}

/// Load the snapshot at `<dir>/vectors.json`. A missing file is not an
/// error: it yields an empty map.
pub async fn load_snapshot(dir: &Path) -> VectorStoreResult<HashMap<String, Record>> {
    let path = snapshot_path(dir);
    match fs::read(&path).await {
        Ok(bytes) => {
            let records: HashMap<String, Record> = serde_json::from_slice(&bytes)
                .map_err(|e| VectorStoreError::IntegrityCheckFailed(e.to_string()))?;
            Ok(records)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

/// Validate the snapshot file exists and decodes, without loading its
/// contents into memory ("efficient-memory mode").
pub async fn validate_snapshot(dir: &Path) -> VectorStoreResult<()> {
    let path = snapshot_path(dir);
    match fs::read(&path).await {
        Ok(bytes) => {
            let _: HashMap<String, Record> = serde_json::from_slice(&bytes)
                .map_err(|e| VectorStoreError::IntegrityCheckFailed(e.to_string()))?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write a `.backup.<epoch-ms>`-suffixed sibling of the snapshot file.
/// Returns the backup's path.
pub async fn create_backup(dir: &Path, now_ms: i64, records: &HashMap<String, Record>) -> VectorStoreResult<PathBuf> {
    fs::create_dir_all(dir).await?;
    let backup_path = dir.join(format!("{SNAPSHOT_FILE}.backup.{now_ms}"));
    let tmp_path = dir.join(format!("{SNAPSHOT_FILE}.backup.{now_ms}.tmp"));
    let bytes = serde_json::to_vec(records)?;
    fs::write(&tmp_path, &bytes).await?;
    fs::rename(&tmp_path, &backup_path).await?;
    Ok(backup_path)
}

/// Restore a map from a specific backup path, or — if `None` — the most
/// recent `vectors.json.backup.*` sibling in `dir`.
pub async fn restore_from_backup(
    dir: &Path,
    backup_path: Option<&Path>,
) -> VectorStoreResult<HashMap<String, Record>> {
    let path = match backup_path {
        Some(p) => p.to_path_buf(),
        None => latest_backup(dir).await?.ok_or_else(|| {
            VectorStoreError::BackupNotFound(format!("no backups found under {}", dir.display()))
        })?,
    };
    let bytes = fs::read(&path)
        .await
        .map_err(|_| VectorStoreError::BackupNotFound(path.display().to_string()))?;
    let records: HashMap<String, Record> = serde_json::from_slice(&bytes)
        .map_err(|e| VectorStoreError::IntegrityCheckFailed(e.to_string()))?;
    Ok(records)
}

async fn latest_backup(dir: &Path) -> VectorStoreResult<Option<PathBuf>> {
    let prefix = format!("{SNAPSHOT_FILE}.backup.");
    let mut best: Option<(i64, PathBuf)> = None;
    let mut entries = match fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(suffix) = name.strip_prefix(&prefix) else { continue };
        if suffix.ends_with(".tmp") {
            continue;
        }
        if let Ok(epoch) = suffix.parse::<i64>() {
            if best.as_ref().map(|(e, _)| epoch > *e).unwrap_or(true) {
                best = Some((epoch, entry.path()));
            }
        }
    }
    Ok(best.map(|(_, p)| p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Metadata;
    use tempfile::TempDir;

    fn sample() -> HashMap<String, Record> {
        let mut map = HashMap::new();
        map.insert(
            "vec_1_aaaaaaaaa".to_string(),
            Record::new("vec_1_aaaaaaaaa".to_string(), vec![1.0, 2.0], Metadata::new()),
        );
        map
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let loaded = load_snapshot(dir.path()).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn write_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let records = sample();
        write_snapshot(dir.path(), &records).await.unwrap();
        let loaded = load_snapshot(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["vec_1_aaaaaaaaa"].vector, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn backup_and_restore_round_trips() {
        let dir = TempDir::new().unwrap();
        let records = sample();
        write_snapshot(dir.path(), &records).await.unwrap();
        let backup_path = create_backup(dir.path(), 1_700_000_000_000, &records).await.unwrap();
        assert!(backup_path.exists());

        let restored = restore_from_backup(dir.path(), None).await.unwrap();
        assert_eq!(restored.len(), 1);
    }

    #[tokio::test]
    async fn restore_picks_most_recent_backup() {
        let dir = TempDir::new().unwrap();
        let mut records = sample();
        create_backup(dir.path(), 100, &records).await.unwrap();
        records.insert(
            "vec_2_bbbbbbbbb".to_string(),
            Record::new("vec_2_bbbbbbbbb".to_string(), vec![3.0], Metadata::new()),
        );
        create_backup(dir.path(), 200, &records).await.unwrap();

        let restored = restore_from_backup(dir.path(), None).await.unwrap();
        assert_eq!(restored.len(), 2);
    }

    #[tokio::test]
    async fn restore_with_no_backups_fails() {
        let dir = TempDir::new().unwrap();
        let err = restore_from_backup(dir.path(), None).await;
        assert!(matches!(err, Err(VectorStoreError::BackupNotFound(_))));
    }
}
