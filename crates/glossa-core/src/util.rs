//! Small shared helpers: opaque identifiers and timeout wrapping.

use std::fmt::Write as _;
use std::future::Future;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Build an opaque identifier: `<prefix>_<sha256_12>` over the seed.
///
/// The same seed always produces the same id, so callers mix in a nonce
/// when they need distinct ids for repeated inputs.
#[must_use]
pub fn opaque_id(prefix: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    let digest = hasher.finalize();
    let hex = digest.iter().take(6).fold(String::new(), |mut acc, b| {
        // write! to String is infallible
        let _ = write!(acc, "{b:02x}");
        acc
    });
    format!("{prefix}_{hex}")
}

/// Await a future with a deadline, surfacing elapse as [`Error::Transient`].
///
/// Retryable steps convert timeouts to transient failures; callers that
/// exhaust a total budget map to [`Error::Deadline`] themselves.
pub async fn with_timeout<T, F>(duration: Duration, label: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::Transient(format!(
            "{label} timed out after {}s",
            duration.as_secs()
        ))),
    }
}
