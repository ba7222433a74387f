//! Conversion backends: the capability that turns a stored document into
//! PDF bytes.
//!
//! Two implementations exist, selected once from [`ServiceConfig::backend`]:
//!
//! | Backend | Engine | Inputs |
//! |---------|--------|--------|
//! | [`NativeBackend`] | headless LibreOffice (`soffice`) | `.doc`, `.docx` |
//! | [`StructuralBackend`] | OOXML extraction → print template → PDF | `.docx` |
//!
//! Backends do not enforce timeouts. The orchestrator wraps every call in
//! `tokio::time::timeout` and drops the future on expiry; backends that
//! spawn processes set `kill_on_drop(true)` so the engine dies with it.

pub mod native;
pub mod structural;

pub use native::NativeBackend;
pub use structural::StructuralBackend;

use crate::config::{BackendKind, ServiceConfig};
use crate::error::ConvertError;
use crate::request::RequestId;
use crate::storage::TemporaryArtifact;
use async_trait::async_trait;
use std::sync::Arc;

/// Everything a backend may touch for one request.
#[derive(Debug)]
pub struct ConversionJob<'a> {
    pub request_id: &'a RequestId,
    /// Client filename, directory part stripped. Informational only.
    pub filename: &'a str,
    /// The uploaded document, fully written.
    pub input: &'a TemporaryArtifact,
    /// A reserved directory path for engine working files. Not yet created;
    /// the backend creates it if it needs it. Removed by the orchestrator.
    pub scratch: &'a TemporaryArtifact,
}

/// A document → PDF conversion strategy.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Short name for logs and the health endpoint.
    fn name(&self) -> &'static str;

    /// Convert `job.input` and return the PDF bytes.
    ///
    /// An `Ok` with an empty buffer is not treated as success by the
    /// orchestrator; it becomes `OutputMissing`.
    async fn convert(&self, job: &ConversionJob<'_>) -> Result<Vec<u8>, ConvertError>;
}

/// Instantiate the backend named by `config.backend`.
pub fn build_backend(config: &ServiceConfig) -> Arc<dyn ConversionBackend> {
    match config.backend {
        BackendKind::Native => Arc::new(NativeBackend::new(config.soffice_path.clone())),
        BackendKind::Structural => Arc::new(StructuralBackend::new(
            config.renderer,
            config.chromium_path.clone(),
            config.page_layout.clone(),
        )),
    }
}

/// Map an engine's exit status and stderr to a `Conversion` error.
pub(crate) fn engine_failure(
    engine: &str,
    status: std::process::ExitStatus,
    stderr: &[u8],
) -> ConvertError {
    let stderr = String::from_utf8_lossy(stderr);
    let tail: String = stderr
        .lines()
        .rev()
        .take(5)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join(" | ");
    ConvertError::conversion(format!("{engine} exited with {status}: {tail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererKind;

    #[test]
    fn build_selects_configured_backend() {
        let native = ServiceConfig::builder().build().unwrap();
        assert_eq!(build_backend(&native).name(), "libreoffice");

        let structural = ServiceConfig::builder()
            .backend(BackendKind::Structural)
            .build()
            .unwrap();
        assert_eq!(build_backend(&structural).name(), "structural-builtin");

        let chromium = ServiceConfig::builder()
            .backend(BackendKind::Structural)
            .renderer(RendererKind::Chromium)
            .build()
            .unwrap();
        assert_eq!(build_backend(&chromium).name(), "structural-chromium");
    }
}
