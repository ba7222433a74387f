//! Temporary storage: isolated, collision-free locations for one request's
//! files, and their guaranteed removal.
//!
//! ## Naming
//!
//! Every artifact lives directly under the working directory and is named
//! `<request id>-<role>-<sanitised name>`. The request id already combines a
//! timestamp with a random UUID, so two concurrent uploads of `cv.docx`
//! never share a path, and a request only ever creates or deletes paths
//! carrying its own id. No cross-request locking is needed.
//!
//! ## Why is `release` synchronous?
//!
//! Cleanup must also run from `Drop` when a request is cancelled (the client
//! hangs up and the handler future is dropped). Like `tempfile`, removal is
//! therefore a plain blocking `std::fs` call; unlinking a file or a small
//! scratch tree is cheap.

use crate::error::ConvertError;
use crate::request::RequestId;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Longest sanitised name kept in an artifact path.
const MAX_NAME_LEN: usize = 80;

/// What an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactRole {
    /// The uploaded document.
    Input,
    /// The converted PDF.
    Output,
    /// A directory the backend may use for engine working files.
    Scratch,
}

impl ArtifactRole {
    fn tag(self) -> &'static str {
        match self {
            ArtifactRole::Input => "input",
            ArtifactRole::Output => "output",
            ArtifactRole::Scratch => "scratch",
        }
    }
}

/// A reserved filesystem location tied to one request.
///
/// Allocation only reserves the path; the owner creates the file (or, for
/// `Scratch`, the directory). `live` turns false once released.
#[derive(Debug)]
pub struct TemporaryArtifact {
    path: PathBuf,
    role: ArtifactRole,
    live: bool,
}

impl TemporaryArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn role(&self) -> ArtifactRole {
        self.role
    }

    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// Owner of the shared working directory.
#[derive(Debug, Clone)]
pub struct TempStore {
    root: PathBuf,
}

impl TempStore {
    /// Open the store rooted at `root`, creating it if needed.
    ///
    /// Called once at process start. Safe to race with other processes or
    /// stores: an existing directory is not an error.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ConvertError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| ConvertError::storage(&root, e))?;
        debug!("Working directory ready: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve a path for `role` within request `id`.
    ///
    /// Only computes the path. The directory is created by [`TempStore::open`]
    /// and is not checked again here.
    pub fn allocate(
        &self,
        id: &RequestId,
        role: ArtifactRole,
        suggested_name: &str,
    ) -> TemporaryArtifact {
        let name = sanitise_name(suggested_name);
        let path = self.root.join(format!("{id}-{}-{name}", role.tag()));
        debug!(request_id = %id, role = role.tag(), path = %path.display(), "allocated artifact");
        TemporaryArtifact {
            path,
            role,
            live: true,
        }
    }

    /// Remove the artifact if present. Idempotent.
    ///
    /// Returns `true` when something was actually deleted. Failures are
    /// logged and swallowed: they must never replace the request's result.
    pub fn release(&self, artifact: &mut TemporaryArtifact) -> bool {
        if !artifact.live {
            return false;
        }
        artifact.live = false;

        let result = match std::fs::symlink_metadata(&artifact.path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&artifact.path),
            Ok(_) => std::fs::remove_file(&artifact.path),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(path = %artifact.path.display(), "released artifact");
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(
                    path = %artifact.path.display(),
                    error = %e,
                    "failed to release artifact; leaving it behind"
                );
                false
            }
        }
    }

    /// Paths under the working directory that belong to request `id`.
    pub fn leftovers(&self, id: &RequestId) -> Vec<PathBuf> {
        let prefix = format!("{id}-");
        std::fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
                    .map(|e| e.path())
                    .collect()
            })
            .unwrap_or_default()
    }
}

static RE_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Reduce a client-supplied name to `[A-Za-z0-9._-]`, keeping the extension.
fn sanitise_name(raw: &str) -> String {
    let cleaned = RE_UNSAFE.replace_all(raw.trim(), "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        return "file".to_string();
    }
    if cleaned.len() <= MAX_NAME_LEN {
        return cleaned.to_string();
    }
    // Keep the tail so the extension survives truncation.
    let start = cleaned.len() - MAX_NAME_LEN;
    cleaned[start..].to_string()
}
