/// Disk-based blob storage
use crate::{
    blob_store::{is_staging_name, mime_type_for, StoredFile, MANAGED_EXTENSION},
    error::{CmsError, CmsResult},
};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::{fs, io::AsyncWriteExt};

/// Local blob store
///
/// Keeps every file flat under one root directory. Names are generated as
/// `<base>-<timestampMillis>-<suffix><ext>` and files are created with
/// exclusive-create semantics, so a name is never reused.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    /// Create a store rooted at `root`, issuing locators under `base_url`
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> CmsResult<Self> {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };

        Ok(Self {
            root: normalize(&root)
                .ok_or_else(|| CmsError::StorageAccess("Blob root must not contain '..'".into()))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL for a storage name
    pub fn locator_for(&self, name: &str) -> String {
        format!("{}/uploads/{}", self.base_url, name)
    }

    /// Generate a fresh storage name from a desired base and the client's filename
    pub fn generate_name(desired_name: &str, original_name: &str) -> String {
        let base: String = desired_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let base = if base.is_empty() { "file".to_string() } else { base };

        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| MANAGED_EXTENSION.to_string());

        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
        format!(
            "{}-{}-{:09}.{}",
            base,
            Utc::now().timestamp_millis(),
            suffix,
            ext
        )
    }

    /// Resolve a bare name, a locator or an absolute path to a path inside the root
    pub fn path_for(&self, reference: &str) -> CmsResult<PathBuf> {
        let name = self.name_from_reference(reference)?;
        Ok(self.root.join(name))
    }

    fn name_from_reference(&self, reference: &str) -> CmsResult<String> {
        let reference = reference.trim();
        let rest = reference.strip_prefix(&self.base_url).unwrap_or(reference);

        if let Some(name) = rest.strip_prefix("/uploads/") {
            return validate_name(name);
        }

        let path = Path::new(rest);
        if path.is_absolute() {
            let normalized = normalize(path).ok_or_else(|| {
                CmsError::StorageAccess(format!("Path escapes blob root: {}", reference))
            })?;

            return match (normalized.parent(), normalized.file_name()) {
                (Some(parent), Some(file_name)) if parent == self.root => {
                    validate_name(&file_name.to_string_lossy())
                }
                _ => Err(CmsError::StorageAccess(format!(
                    "Path is outside blob root: {}",
                    reference
                ))),
            };
        }

        validate_name(rest)
    }

    /// Ensure the root directory exists
    async fn ensure_root(&self) -> CmsResult<()> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            CmsError::StorageWrite(format!("Failed to create blob directory: {}", e))
        })
    }

    /// Store bytes under a freshly generated name
    pub async fn store(
        &self,
        data: &[u8],
        desired_name: &str,
        original_name: &str,
    ) -> CmsResult<StoredFile> {
        let name = Self::generate_name(desired_name, original_name);
        match self.store_as(&name, data).await {
            Err(CmsError::NameTaken(_)) => {
                tracing::warn!(name = %name, "Storage name collision, regenerating");
                self.store_as(&Self::generate_name(desired_name, original_name), data)
                    .await
            }
            result => result,
        }
    }

    /// Store bytes under an exact name; fails if the name is taken
    pub async fn store_as(&self, name: &str, data: &[u8]) -> CmsResult<StoredFile> {
        let name = validate_name(name)?;
        self.ensure_root().await?;
        let path = self.root.join(&name);

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => CmsError::NameTaken(name.clone()),
                _ => CmsError::StorageWrite(format!("Failed to create blob {}: {}", name, e)),
            })?;

        let written = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path).await {
                tracing::warn!(name = %name, error = %cleanup, "Failed to remove partial blob");
            }
            return Err(CmsError::StorageWrite(format!(
                "Failed to write blob {}: {}",
                name, e
            )));
        }

        tracing::debug!(name = %name, size = data.len(), "Stored blob");

        Ok(StoredFile {
            id: name.clone(),
            locator: self.locator_for(&name),
            mime_type: mime_type_for(&name).to_string(),
            size_bytes: data.len() as u64,
            created_at: Utc::now(),
            name,
        })
    }

    /// Rename a stored file inside the root
    pub async fn rename(&self, from: &str, to: &str) -> CmsResult<StoredFile> {
        let from_path = self.path_for(from)?;
        let to_path = self.path_for(to)?;

        if fs::try_exists(&to_path).await.unwrap_or(false) {
            return Err(CmsError::NameTaken(
                to_path.file_name().unwrap_or_default().to_string_lossy().into_owned(),
            ));
        }

        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| CmsError::StorageWrite(format!("Failed to rename blob: {}", e)))?;

        self.stat(to)
            .await?
            .ok_or_else(|| CmsError::StorageWrite("Renamed blob disappeared".to_string()))
    }

    /// Delete a stored file; a missing file is a no-op that returns `false`
    pub async fn delete(&self, reference: &str) -> CmsResult<bool> {
        let path = self.path_for(reference)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(reference = %reference, "Deleted blob");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(reference = %reference, "Blob already absent, nothing to delete");
                Ok(false)
            }
            Err(e) => Err(CmsError::StorageAccess(format!(
                "Failed to delete blob {}: {}",
                reference, e
            ))),
        }
    }

    /// Metadata for a stored file without reading its body
    pub async fn stat(&self, reference: &str) -> CmsResult<Option<StoredFile>> {
        let path = self.path_for(reference)?;

        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(Some(self.stored_file(name, &metadata)))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CmsError::StorageAccess(format!(
                "Failed to stat blob {}: {}",
                reference, e
            ))),
        }
    }

    /// All finished files with the managed extension
    pub async fn list(&self) -> CmsResult<Vec<StoredFile>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CmsError::StorageAccess(format!(
                    "Failed to read blob directory: {}",
                    e
                )))
            }
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_staging_name(&name) || !has_managed_extension(&name) {
                continue;
            }

            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                files.push(self.stored_file(name, &metadata));
            }
        }

        Ok(files)
    }

    /// Remove staging files older than `older_than`; returns how many were removed
    pub async fn cleanup_staging(&self, older_than: Duration) -> CmsResult<u64> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_staging_name(&name) {
                continue;
            }

            let age = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();

            if age < older_than {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(name = %name, error = %e, "Failed to remove staging file"),
            }
        }

        Ok(removed)
    }

    fn stored_file(&self, name: String, metadata: &std::fs::Metadata) -> StoredFile {
        let created_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        StoredFile {
            id: name.clone(),
            locator: self.locator_for(&name),
            mime_type: mime_type_for(&name).to_string(),
            size_bytes: metadata.len(),
            created_at,
            name,
        }
    }
}

fn has_managed_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(MANAGED_EXTENSION))
        .unwrap_or(false)
}

/// A storage name is a single, plain path segment
fn validate_name(name: &str) -> CmsResult<String> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0', ':']);

    if invalid {
        return Err(CmsError::StorageAccess(format!(
            "Invalid storage name: {:?}",
            name
        )));
    }

    Ok(name.to_string())
}

/// Lexically normalize an absolute path; `None` if it climbs with `..`
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => return None,
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}
