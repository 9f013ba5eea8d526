//! Durable, re-resolvable access to a user-chosen directory.
//!
//! A [`ScopedToken`] is minted once, right after the user grants a directory
//! through the picker, and persisted. On the next start it is resolved back
//! into an [`AccessGrant`], which keeps access open until it is dropped.

use serde::{Deserialize, Serialize};
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const TOKEN_VERSION: u32 = 1;

/// Identity of a directory on disk, independent of the name it is reached by.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
struct DirIdentity {
    dev: u64,
    ino: u64,
}

#[derive(Serialize, Deserialize, Debug)]
struct TokenBody {
    version: u32,
    id: String,
    path: PathBuf,
    #[serde(default)]
    identity: Option<DirIdentity>,
}

/// Opaque persisted credential for one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedToken(String);

impl ScopedToken {
    pub fn from_string(raw: String) -> Self {
        ScopedToken(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Live access to a resolved directory. Access ends when the grant is dropped.
#[derive(Debug)]
pub struct AccessGrant {
    id: String,
    path: PathBuf,
    live: Arc<AtomicUsize>,
}

impl AccessGrant {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for AccessGrant {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        log::debug!("Released access grant {} for {}", self.id, self.path.display());
    }
}

/// Mints and resolves scoped tokens, and tracks how many grants are live.
#[derive(Debug, Clone, Default)]
pub struct AccessTokenStore {
    live: Arc<AtomicUsize>,
}

impl AccessTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture enough about `path` to regain access later without prompting.
    ///
    /// Returns `None` (after logging why) when the path is not a readable
    /// directory or the token cannot be encoded.
    pub fn mint(&self, path: &Path) -> Option<ScopedToken> {
        match mint_token(path) {
            Ok(token) => Some(token),
            Err(e) => {
                log::warn!("Could not mint access token: {}", e);
                None
            }
        }
    }

    /// Re-establish access to the directory a token was minted for.
    ///
    /// Fails closed: a malformed token, a directory that vanished or was
    /// replaced, or a directory that can no longer be listed all yield `None`.
    pub fn resolve(&self, token: &ScopedToken) -> Option<AccessGrant> {
        match resolve_token(token) {
            Ok(path) => {
                self.live.fetch_add(1, Ordering::SeqCst);
                let grant = AccessGrant {
                    id: Uuid::new_v4().to_string(),
                    path,
                    live: Arc::clone(&self.live),
                };
                log::debug!("Opened access grant {} for {}", grant.id, grant.path.display());
                Some(grant)
            }
            Err(e) => {
                log::info!("Stored access token did not resolve: {}", e);
                None
            }
        }
    }

    /// Number of grants handed out and not yet dropped.
    pub fn live_grants(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

fn mint_token(path: &Path) -> Result<ScopedToken, String> {
    let canonical = fs::canonicalize(path)
        .map_err(|e| format!("Failed to canonicalize '{}': {}", path.display(), e))?;
    let metadata = fs::metadata(&canonical)
        .map_err(|e| format!("Failed to read metadata for '{}': {}", canonical.display(), e))?;
    if !metadata.is_dir() {
        return Err(format!("Not a directory: {}", canonical.display()));
    }
    begin_access(&canonical)?;

    let body = TokenBody {
        version: TOKEN_VERSION,
        id: Uuid::new_v4().to_string(),
        path: canonical,
        identity: identity_of(&metadata),
    };
    serde_json::to_string(&body)
        .map(ScopedToken)
        .map_err(|e| format!("Failed to encode access token: {}", e))
}

fn resolve_token(token: &ScopedToken) -> Result<PathBuf, String> {
    let body: TokenBody = serde_json::from_str(token.as_str())
        .map_err(|e| format!("Malformed access token: {}", e))?;
    if body.version != TOKEN_VERSION {
        return Err(format!("Unsupported access token version {}", body.version));
    }

    let canonical = fs::canonicalize(&body.path)
        .map_err(|e| format!("Failed to canonicalize '{}': {}", body.path.display(), e))?;
    if canonical != body.path {
        return Err(format!(
            "'{}' now resolves to '{}'",
            body.path.display(),
            canonical.display()
        ));
    }

    let metadata = fs::metadata(&canonical)
        .map_err(|e| format!("Failed to read metadata for '{}': {}", canonical.display(), e))?;
    if !metadata.is_dir() {
        return Err(format!("Not a directory: {}", canonical.display()));
    }
    if body.identity.is_some() && identity_of(&metadata) != body.identity {
        return Err(format!("'{}' was replaced", canonical.display()));
    }

    begin_access(&canonical)?;
    Ok(canonical)
}

/// Access begins once the directory can actually be listed.
fn begin_access(path: &Path) -> Result<(), String> {
    fs::read_dir(path)
        .map(|_| ())
        .map_err(|e| format!("Access to '{}' denied: {}", path.display(), e))
}

#[cfg(unix)]
fn identity_of(metadata: &Metadata) -> Option<DirIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some(DirIdentity {
        dev: metadata.dev(),
        ino: metadata.ino(),
    })
}

#[cfg(not(unix))]
fn identity_of(_metadata: &Metadata) -> Option<DirIdentity> {
    None
}
