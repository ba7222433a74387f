//! The conversion lifecycle: validate → store → convert → hand off → clean.
//!
//! ## Ownership of cleanup
//!
//! Every request owns a [`RequestGuard`] holding its stage and artifacts.
//! The guard releases all artifacts exactly once when it is dropped,
//! whichever way that happens:
//!
//! * validation or conversion fails → dropped before
//!   [`Orchestrator::convert_upload`] returns
//! * the handler future is cancelled (client hung up) → dropped with it
//! * conversion succeeds → moved into the [`ConvertedDocument`], dropped
//!   after the last byte is read or when the transport discards the body
//!
//! Output files are therefore never deleted while still being streamed,
//! and a request that disappears mid-flight still leaves nothing behind.

use crate::backend::{build_backend, ConversionBackend, ConversionJob};
use crate::config::ServiceConfig;
use crate::delivery::ConvertedDocument;
use crate::error::{ConvertError, ErrorKind};
use crate::observer::{NoopObserver, Observer};
use crate::request::{ConversionRequest, RequestId, Stage};
use crate::storage::{ArtifactRole, TempStore, TemporaryArtifact};
use crate::validate::{client_filename, download_name, validate, ValidationPolicy};
use futures::{Stream, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Runs conversion requests. Cheap to clone; share one per process.
#[derive(Clone)]
pub struct Orchestrator {
    store: TempStore,
    policy: ValidationPolicy,
    backend: Arc<dyn ConversionBackend>,
    timeout: Duration,
    observer: Observer,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("work_dir", &self.store.root())
            .field("policy", &self.policy)
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Orchestrator {
    /// Create the working directory and the configured backend.
    ///
    /// Called once at startup; requests never re-check the directory.
    pub fn new(config: &ServiceConfig) -> Result<Self, ConvertError> {
        Self::with_backend(config, build_backend(config))
    }

    /// Like [`Orchestrator::new`] with a caller-supplied backend.
    pub fn with_backend(
        config: &ServiceConfig,
        backend: Arc<dyn ConversionBackend>,
    ) -> Result<Self, ConvertError> {
        let store = TempStore::open(&config.work_dir)?;
        let observer = config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver));
        info!(
            work_dir = %store.root().display(),
            backend = backend.name(),
            timeout_secs = config.conversion_timeout_secs,
            "orchestrator ready"
        );
        Ok(Self::with_parts(
            store,
            config.policy.clone(),
            backend,
            config.conversion_timeout(),
            observer,
        ))
    }

    pub fn with_parts(
        store: TempStore,
        policy: ValidationPolicy,
        backend: Arc<dyn ConversionBackend>,
        timeout: Duration,
        observer: Observer,
    ) -> Self {
        Self {
            store,
            policy,
            backend,
            timeout,
            observer,
        }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn work_dir(&self) -> &Path {
        self.store.root()
    }

    /// Paths still on disk for request `id`. Empty once it has been cleaned.
    pub fn leftovers(&self, id: &RequestId) -> Vec<PathBuf> {
        self.store.leftovers(id)
    }

    /// Run one upload through the lifecycle.
    ///
    /// `declared_size` is checked before `body` is polled; without it the
    /// size limit is enforced chunk by chunk and reading stops at the first
    /// chunk that crosses it. Errors yielded by `body` abort the request.
    ///
    /// On success the returned document still owns its artifacts; stream or
    /// read it to finish the request. On error everything is already
    /// cleaned up.
    pub async fn convert_upload<S, B>(
        &self,
        filename: &str,
        declared_size: Option<u64>,
        body: S,
    ) -> Result<ConvertedDocument, ConvertError>
    where
        S: Stream<Item = Result<B, ConvertError>>,
        B: AsRef<[u8]>,
    {
        let request = ConversionRequest::new(client_filename(filename), declared_size);
        let span = info_span!("conversion", request_id = %request.id);
        let mut guard = RequestGuard::new(
            self.store.clone(),
            request,
            Arc::clone(&self.observer),
            span.clone(),
        );

        match self
            .run(&mut guard, declared_size, body)
            .instrument(span)
            .await
        {
            Ok((output, size)) => Ok(ConvertedDocument::new(guard, output, size)),
            Err(e) => {
                guard.fail(&e);
                Err(e)
            }
        }
    }

    /// Convert a local file. Used by the CLI.
    pub async fn convert_path(&self, path: &Path) -> Result<ConvertedDocument, ConvertError> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| ConvertError::storage(path, e))?;
        let path = path.to_path_buf();
        let body = futures::stream::once(async move {
            tokio::fs::read(&path)
                .await
                .map_err(|e| ConvertError::storage(&path, e))
        });
        self.convert_upload(&filename, Some(meta.len()), body).await
    }

    async fn run<S, B>(
        &self,
        guard: &mut RequestGuard,
        declared_size: Option<u64>,
        body: S,
    ) -> Result<(PathBuf, u64), ConvertError>
    where
        S: Stream<Item = Result<B, ConvertError>>,
        B: AsRef<[u8]>,
    {
        // ── Received → Validated ─────────────────────────────────────────
        let accepted = validate(&guard.request.filename, declared_size, &self.policy)?;
        guard.request.extension = Some(accepted.extension.clone());
        guard.advance(Stage::Validated);

        // ── Validated → Stored ───────────────────────────────────────────
        let received = self.stage_input(guard, &accepted.filename, body).await?;
        guard.request.size = Some(received);
        guard.advance(Stage::Stored);
        debug!(bytes = received, "upload stored");

        // ── Stored → Converting → Converted ──────────────────────────────
        guard.allocate(ArtifactRole::Output, &download_name(&accepted.filename));
        guard.allocate(ArtifactRole::Scratch, "work");
        guard.advance(Stage::Converting);

        let started = Instant::now();
        let pdf = {
            let job = ConversionJob {
                request_id: &guard.request.id,
                filename: &accepted.filename,
                input: guard.artifact(ArtifactRole::Input)?,
                scratch: guard.artifact(ArtifactRole::Scratch)?,
            };
            match tokio::time::timeout(self.timeout, self.backend.convert(&job)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ConvertError::ConversionTimeout {
                        secs: self.timeout.as_secs(),
                    })
                }
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if pdf.is_empty() {
            return Err(ConvertError::OutputMissing);
        }
        let output = guard.artifact(ArtifactRole::Output)?.path().to_path_buf();
        tokio::fs::write(&output, &pdf)
            .await
            .map_err(|e| ConvertError::storage(&output, e))?;

        // Trust the filesystem, not the backend.
        let size = match tokio::fs::metadata(&output).await {
            Ok(m) if m.len() > 0 => m.len(),
            _ => return Err(ConvertError::OutputMissing),
        };
        guard.advance(Stage::Converted);
        info!(
            backend = self.backend.name(),
            input_bytes = received,
            output_bytes = size,
            elapsed_ms,
            "conversion finished"
        );
        Ok((output, size))
    }

    /// Stream `body` into a fresh Input artifact, enforcing the size limit.
    async fn stage_input<S, B>(
        &self,
        guard: &mut RequestGuard,
        filename: &str,
        body: S,
    ) -> Result<u64, ConvertError>
    where
        S: Stream<Item = Result<B, ConvertError>>,
        B: AsRef<[u8]>,
    {
        let path = guard
            .allocate(ArtifactRole::Input, filename)
            .path()
            .to_path_buf();
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| ConvertError::storage(&path, e))?;

        let mut body = std::pin::pin!(body);
        let mut received: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            let chunk = chunk.as_ref();
            received += chunk.len() as u64;
            self.policy.check_size(received)?;
            file.write_all(chunk)
                .await
                .map_err(|e| ConvertError::storage(&path, e))?;
        }
        file.flush()
            .await
            .map_err(|e| ConvertError::storage(&path, e))?;

        if received == 0 {
            return Err(ConvertError::MissingFile);
        }
        Ok(received)
    }
}

// ── Request guard ────────────────────────────────────────────────────────

/// Owns one request's stage and artifacts; cleans up on drop.
pub(crate) struct RequestGuard {
    store: TempStore,
    pub(crate) request: ConversionRequest,
    artifacts: Vec<TemporaryArtifact>,
    observer: Observer,
    span: Span,
    cleaned: bool,
}

impl RequestGuard {
    fn new(store: TempStore, request: ConversionRequest, observer: Observer, span: Span) -> Self {
        observer.on_stage(&request.id, Stage::Received);
        Self {
            store,
            request,
            artifacts: Vec::with_capacity(3),
            observer,
            span,
            cleaned: false,
        }
    }

    pub(crate) fn id(&self) -> &RequestId {
        &self.request.id
    }

    pub(crate) fn advance(&mut self, stage: Stage) {
        if self.request.advance(stage) {
            self.observer.on_stage(&self.request.id, stage);
        }
    }

    /// Record `err` as the request's terminal failure.
    pub(crate) fn fail(&mut self, err: &ConvertError) {
        let span = self.span.clone();
        let _enter = span.enter();
        if err.is_client_error() {
            warn!(kind = ?err.kind(), "request rejected: {err}");
        } else {
            error!(kind = ?err.kind(), "request failed: {err}");
        }
        self.advance(Stage::Failed(err.kind()));
    }

    fn allocate(&mut self, role: ArtifactRole, suggested_name: &str) -> &TemporaryArtifact {
        let artifact = self.store.allocate(&self.request.id, role, suggested_name);
        self.artifacts.push(artifact);
        &self.artifacts[self.artifacts.len() - 1]
    }

    pub(crate) fn artifact(&self, role: ArtifactRole) -> Result<&TemporaryArtifact, ConvertError> {
        self.artifacts
            .iter()
            .find(|a| a.role() == role)
            .ok_or_else(|| ConvertError::Internal(format!("No {role:?} artifact allocated")))
    }

    /// Release every artifact and move to `Cleaned`. Runs once.
    fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        let span = self.span.clone();
        let _enter = span.enter();

        let stage = self.request.stage();
        if !stage.is_terminal() {
            // Dropped mid-flight. Past `Converted` only delivery was left.
            let kind = if stage == Stage::Converted {
                ErrorKind::DeliveryError
            } else {
                ErrorKind::Cancelled
            };
            warn!(stage = %stage, "request abandoned before completion");
            self.advance(Stage::Failed(kind));
        }
        let final_stage = self.request.stage();

        let store = &self.store;
        let released = self
            .artifacts
            .iter_mut()
            .map(|a| store.release(a))
            .filter(|removed| *removed)
            .count();
        self.advance(Stage::Cleaned);
        self.observer
            .on_cleaned(&self.request.id, final_stage, released);
        debug!(final_stage = %final_stage, released, "request cleaned");
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}
