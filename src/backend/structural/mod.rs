//! Structural conversion: extract the document's text structure, pour it
//! into a fixed print template, render that to PDF.
//!
//! Only the content survives. Fonts, colours, images and page setup of the
//! source are replaced by the template, which makes output predictable and
//! needs no office suite on the host.

pub mod extract;
pub mod render;
pub mod template;

use super::{ConversionBackend, ConversionJob};
use crate::config::{PageLayout, RendererKind};
use crate::error::ConvertError;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// `.docx` → blocks → template → PDF.
#[derive(Debug, Clone)]
pub struct StructuralBackend {
    renderer: RendererKind,
    chromium_path: Option<PathBuf>,
    layout: PageLayout,
}

impl StructuralBackend {
    pub fn new(renderer: RendererKind, chromium_path: Option<PathBuf>, layout: PageLayout) -> Self {
        Self {
            renderer,
            chromium_path,
            layout,
        }
    }
}

#[async_trait]
impl ConversionBackend for StructuralBackend {
    fn name(&self) -> &'static str {
        match self.renderer {
            RendererKind::Builtin => "structural-builtin",
            RendererKind::Chromium => "structural-chromium",
        }
    }

    async fn convert(&self, job: &ConversionJob<'_>) -> Result<Vec<u8>, ConvertError> {
        let input = job.input.path().to_path_buf();
        let blocks = tokio::task::spawn_blocking(move || extract::extract_file(&input))
            .await
            .map_err(|e| ConvertError::Internal(format!("Extraction task panicked: {e}")))??;

        if blocks.is_empty() {
            return Err(ConvertError::EmptyContent);
        }
        debug!(request_id = %job.request_id, blocks = blocks.len(), "structure extracted");

        let title = match job.filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => job.filename.to_string(),
        };
        match self.renderer {
            RendererKind::Builtin => {
                let layout = self.layout.clone();
                tokio::task::spawn_blocking(move || render::render_builtin(&title, &blocks, &layout))
                    .await
                    .map_err(|e| ConvertError::Internal(format!("Render task panicked: {e}")))?
            }
            RendererKind::Chromium => {
                let html = template::render_html(&title, &blocks, &self.layout);
                render::render_chromium(self.chromium_path.as_deref(), &html, job.scratch.path())
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::extract::tests::docx_bytes;
    use super::*;
    use crate::request::RequestId;
    use crate::storage::{ArtifactRole, TempStore};

    async fn run(body: &[u8], renderer: RendererKind) -> Result<Vec<u8>, ConvertError> {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::open(dir.path()).unwrap();
        let id = RequestId::generate();
        let input = store.allocate(&id, ArtifactRole::Input, "doc.docx");
        std::fs::write(input.path(), body).unwrap();
        let scratch = store.allocate(&id, ArtifactRole::Scratch, "work");
        let backend = StructuralBackend::new(renderer, None, PageLayout::default());
        backend
            .convert(&ConversionJob {
                request_id: &id,
                filename: "doc.docx",
                input: &input,
                scratch: &scratch,
            })
            .await
    }

    #[tokio::test]
    async fn builtin_converts_docx() {
        let docx = docx_bytes(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Report</w:t></w:r></w:p>
               <w:p><w:r><w:t>Body text.</w:t></w:r></w:p>"#,
        );
        let pdf = run(&docx, RendererKind::Builtin).await.unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn empty_document_fails_fast() {
        let docx = docx_bytes("<w:p/><w:sectPr/>");
        let err = run(&docx, RendererKind::Builtin).await.unwrap_err();
        assert!(matches!(err, ConvertError::EmptyContent), "{err:?}");
    }

    #[tokio::test]
    async fn corrupt_package_is_conversion_error() {
        let err = run(b"PK\x03\x04 truncated", RendererKind::Builtin)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Conversion { .. }), "{err:?}");
    }
}
