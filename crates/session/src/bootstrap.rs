//! One-time credential bootstrap.
//!
//! Before the first connection the bot needs a credential bundle. An
//! existing local bundle always wins and short-circuits without any
//! network traffic; otherwise the bundle is fetched once from the blob
//! store and persisted for every later process start.

use crate::fetch::{BlobStore, FetchError};
use crate::store::{CredentialBundle, SessionStore};

/// Prefix carried by session ids as they are handed out to users.
///
/// Stripped before the remainder is used as a blob store key.
pub const SESSION_ID_PREFIX: &str = "WIRE~";

/// Errors that abort the bootstrap (and therefore the process).
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// No local bundle exists and no session id was configured.
    #[error("No local credential bundle and SESSION_ID is not configured")]
    Missing,

    /// The remote fetch failed after its own bounded retries.
    #[error("Failed to fetch session bundle: {0}")]
    Fetch(#[from] FetchError),

    /// Reading or writing the local bundle failed.
    #[error("Failed to access local credential bundle: {0}")]
    Io(#[from] std::io::Error),
}

/// Produce a credential bundle, reusing the local copy when present.
///
/// Exactly one file write happens on the remote path; a later call with
/// the file in place performs zero fetches.
pub async fn bootstrap(
    store: &SessionStore,
    blobs: &dyn BlobStore,
    session_id: Option<&str>,
) -> Result<CredentialBundle, BootstrapError> {
    if let Some(bundle) = store.load()? {
        tracing::debug!(
            path = %store.creds_path().display(),
            "Reusing existing credential bundle",
        );
        return Ok(bundle);
    }

    let Some(session_id) = session_id else {
        return Err(BootstrapError::Missing);
    };
    let blob_id = session_id.strip_prefix(SESSION_ID_PREFIX).unwrap_or(session_id);

    tracing::info!("Downloading session bundle from blob store");
    let bytes = blobs.fetch(blob_id).await?;

    let bundle = CredentialBundle::from_bytes(bytes);
    store.persist(&bundle)?;
    tracing::info!(
        path = %store.creds_path().display(),
        "Session bundle downloaded and persisted",
    );

    Ok(bundle)
}
