//! Content digests for files, memoized in the cache.

use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use super::Cache;

/// Key prefix for file digests.
pub const DIGEST_PREFIX: &str = "file:digest:";

/// blake3 hex digest of a file's contents.
///
/// The cache key includes the path, length and modification time, so an
/// edited file is re-hashed while an untouched one is read at most once per
/// TTL window.
pub async fn digest_file(cache: &Cache, path: &Path) -> std::io::Result<String> {
    let metadata = tokio::fs::metadata(path).await?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let key = format!("{}{}:{}:{}", DIGEST_PREFIX, path.display(), metadata.len(), mtime);

    let owned = path.to_path_buf();
    cache
        .get_or_compute(&key, || async move {
            tokio::task::spawn_blocking(move || hash_file(&owned))
                .await
                .map_err(std::io::Error::other)?
        })
        .await
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
