//! Content hashing for target/trigger files.
//!
//! Hashes are SHA-1 over raw file bytes. A missing file is retried up to two
//! times (three attempts total) at 100ms apart to tolerate a file being
//! rewritten mid-hash; three consecutive failures are fatal.

use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use pocketwalk_core::AppError;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Hash every path in `paths`, returning `path -> hex digest`.
///
/// Paths that cannot be read after [`MAX_ATTEMPTS`] retries propagate as
/// [`AppError::HashRetriesExhausted`]; any other IO error propagates
/// immediately without retry (only `NotFound` is considered transient).
pub async fn hash_files(paths: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();
    for path in paths {
        let digest = hash_one_with_retry(path).await?;
        hashes.insert(path.clone(), digest);
    }
    Ok(hashes)
}

async fn hash_one_with_retry(path: &str) -> anyhow::Result<String> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match hash_file(path) {
            Ok(digest) => return Ok(digest),
            Err(err) if is_not_found(&err) && attempts < MAX_ATTEMPTS => {
                tracing::debug!(path, attempts, "target file momentarily missing, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(err) if is_not_found(&err) => {
                return Err(AppError::HashRetriesExhausted {
                    path: path.to_string(),
                    attempts,
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn hash_file(path: &str) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    Ok(hex_encode(&hasher.finalize()))
}

fn is_not_found(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing to a String never fails");
    }
    out
}
