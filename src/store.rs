use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Blocked user ids, mirrored to a JSON array on disk.
///
/// Every mutation rewrites the whole file while still holding the lock, so the
/// file always reflects the set as of the last mutation.
pub struct UserStore {
    path: PathBuf,
    users: Mutex<BTreeSet<i64>>,
}

impl UserStore {
    /// Load the set from `path`. A missing file is an empty set; a malformed
    /// one is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let users = load(&path).await?;
        info!(
            "User store loaded {} blocked user(s) from {}",
            users.len(),
            path.display()
        );
        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn contains(&self, user_id: i64) -> bool {
        self.users.lock().await.contains(&user_id)
    }

    /// Returns whether the id was newly added. The in-memory change is kept
    /// even if persisting it fails.
    pub async fn add(&self, user_id: i64) -> Result<bool> {
        let mut users = self.users.lock().await;
        let added = users.insert(user_id);
        save(&self.path, &users).await?;
        Ok(added)
    }

    /// Returns whether the id was present. Removing an absent id still
    /// rewrites the file.
    pub async fn remove(&self, user_id: i64) -> Result<bool> {
        let mut users = self.users.lock().await;
        let removed = users.remove(&user_id);
        save(&self.path, &users).await?;
        Ok(removed)
    }

    /// Blocked ids in ascending order.
    pub async fn list(&self) -> Vec<i64> {
        self.users.lock().await.iter().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }
}

async fn load(path: &Path) -> Result<BTreeSet<i64>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read users file: {}", path.display()))
        }
    };

    let ids: Vec<i64> = serde_json::from_str(&content)
        .with_context(|| format!("Malformed users file: {}", path.display()))?;
    Ok(ids.into_iter().collect())
}

/// Write to a sibling temp file, then rename it over the target.
async fn save(path: &Path, users: &BTreeSet<i64>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let ids: Vec<i64> = users.iter().copied().collect();
    let bytes = serde_json::to_vec(&ids).context("Failed to serialize users")?;

    let tmp = PathBuf::from(format!("{}{}", path.display(), TEMP_FILE_SUFFIX));
    tokio::fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    debug!("Saved {} blocked user(s) to {}", ids.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn on_disk(path: &Path) -> Vec<i64> {
        let content = tokio::fs::read_to_string(path).await.unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path().join("users.json")).await.unwrap();
        assert_eq!(store.len().await, 0);
        assert!(store.list().await.is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = UserStore::open(&path).await.err().unwrap();
        assert!(format!("{:#}", err).contains("Malformed users file"));
    }

    #[tokio::test]
    async fn test_loads_negative_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        tokio::fs::write(&path, b"[-1001234, 42]").await.unwrap();

        let store = UserStore::open(&path).await.unwrap();
        assert_eq!(store.list().await, vec![-1001234, 42]);
        assert!(store.contains(-1001234).await);

        store.remove(-1001234).await.unwrap();
        assert_eq!(on_disk(&path).await, vec![42]);
    }

    #[tokio::test]
    async fn test_loads_existing_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        tokio::fs::write(&path, b"[30, 10, 20, 10]").await.unwrap();

        let store = UserStore::open(&path).await.unwrap();
        assert_eq!(store.list().await, vec![10, 20, 30]);
        assert!(store.contains(20).await);
        assert!(!store.contains(40).await);
    }

    #[tokio::test]
    async fn test_file_matches_set_after_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("users.json");
        let store = UserStore::open(&path).await.unwrap();

        assert!(store.add(111).await.unwrap());
        assert!(!store.add(111).await.unwrap());
        assert!(store.add(5).await.unwrap());
        assert_eq!(on_disk(&path).await, vec![5, 111]);

        assert!(store.remove(111).await.unwrap());
        assert_eq!(on_disk(&path).await, vec![5]);

        assert!(!store.remove(999).await.unwrap());
        assert_eq!(on_disk(&path).await, store.list().await);

        let tmp = PathBuf::from(format!("{}{}", path.display(), TEMP_FILE_SUFFIX));
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn test_reopen_sees_persisted_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        {
            let store = UserStore::open(&path).await.unwrap();
            store.add(7).await.unwrap();
            store.add(3).await.unwrap();
        }
        let store = UserStore::open(&path).await.unwrap();
        assert_eq!(store.list().await, vec![3, 7]);
    }
}
