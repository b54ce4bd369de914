use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;

use litharvest_core::CanonicalRecord;

use crate::error::Result;
use crate::identifiers::ArxivId;
use crate::resolve::{doi_key, title_key};

/// Stable identity string for artifact filenames and audit rows: DOI key,
/// else arXiv id, else a hash of the normalized title, else a hash of the
/// landing URL.
pub fn record_identity(record: &CanonicalRecord) -> Option<String> {
    if let Some(key) = record.doi.as_deref().and_then(doi_key) {
        return Some(key);
    }
    if let Some(id) = ArxivId::for_record(record) {
        return Some(format!("arxiv:{}", id.id));
    }
    if let Some(key) = title_key(&record.title) {
        return Some(format!("title:{:016x}", hash_of(&key)));
    }
    record
        .url
        .as_deref()
        .map(|url| format!("url:{:016x}", hash_of(url)))
}

fn hash_of(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn safe_filename(identity: &str) -> String {
    let safe: String = identity
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(80)
        .collect();
    format!("{safe}.pdf")
}

// ─── ArtifactStore ────────────────────────────────────────────────────────────

/// Append-only PDF directory. Filenames derive from record identities, so
/// concurrent workers never contend on the same file.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Fails fast; without a writable output directory no record can finish.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, identity: &str) -> PathBuf {
        self.dir.join(safe_filename(identity))
    }

    /// Zero-length files from interrupted runs do not count as artifacts.
    pub fn existing(&self, identity: &str) -> Option<PathBuf> {
        let path = self.path_for(identity);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.len() > 0 => Some(path),
            _ => None,
        }
    }

    /// Writes through a temp name then renames, so a reader never observes
    /// a half-written PDF.
    pub async fn persist(&self, identity: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(identity);
        let tmp = path.with_extension("pdf.part");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(path)
    }
}
