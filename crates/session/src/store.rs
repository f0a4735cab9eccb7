//! File-backed storage for the opaque credential bundle.
//!
//! The bundle is written once by bootstrap and overwritten every time
//! the gateway rotates session material. Writes go through a temp file
//! plus rename so a crash mid-write never leaves a truncated bundle.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// File name of the persisted bundle inside the session directory.
pub const CREDS_FILE: &str = "creds.json";

/// An authenticated session blob for the messaging gateway.
///
/// The contents are produced and consumed by the gateway protocol layer;
/// this side never interprets them.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle(Vec<u8>);

impl CredentialBundle {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode the bundle for embedding in a JSON wire frame.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    /// Decode a bundle received in a JSON wire frame.
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        BASE64.decode(encoded).map(Self)
    }
}

// Session material is secret; show only the size.
impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CredentialBundle({} bytes)", self.0.len())
    }
}

/// Stores the credential bundle under a fixed directory.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the persisted bundle.
    pub fn creds_path(&self) -> PathBuf {
        self.dir.join(CREDS_FILE)
    }

    /// Directory holding session state.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the bundle from disk, or `None` when no bundle exists yet.
    pub fn load(&self) -> io::Result<Option<CredentialBundle>> {
        match fs::read(self.creds_path()) {
            Ok(bytes) => Ok(Some(CredentialBundle::from_bytes(bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write the bundle, creating the session directory if needed.
    ///
    /// The write is atomic with respect to readers of the final path:
    /// contents land in a temp file first and are renamed into place.
    pub fn persist(&self, bundle: &CredentialBundle) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!("{CREDS_FILE}.tmp"));
        fs::write(&tmp, bundle.as_bytes())?;
        fs::rename(&tmp, self.creds_path())
    }
}
