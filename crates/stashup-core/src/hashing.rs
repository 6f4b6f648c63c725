//! SHA-1 content hashing for upload integrity checks.

use sha1::{Digest, Sha1};
use std::path::Path;
use tokio::io::AsyncReadExt;

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Lowercase hex SHA-1 of a byte slice.
pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Streams a file through SHA-1 and returns the lowercase hex digest.
pub async fn sha1_of_file(path: impl AsRef<Path>) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path.as_ref()).await?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; READ_BUFFER_BYTES];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Like [`sha1_of_file`], but an unreadable file hashes to the empty string.
pub async fn sha1_of_file_or_empty(path: impl AsRef<Path>) -> String {
    match sha1_of_file(path.as_ref()).await {
        Ok(hash) => hash,
        Err(e) => {
            tracing::warn!(
                path = %path.as_ref().display(),
                error = %e,
                "Could not read local file for hashing"
            );
            String::new()
        }
    }
}
