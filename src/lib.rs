//! # docx2pdf
//!
//! Convert uploaded Word documents to PDF, with every temporary file
//! removed when the request ends, whether it succeeds, fails or is abandoned.
//!
//! ## Request lifecycle
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate  extension allow-list + size limit (before any disk write)
//!  ├─ 2. Store     stream the body into a uniquely named input file
//!  ├─ 3. Convert   backend → PDF bytes, bounded by a timeout
//!  ├─ 4. Deliver   stream the PDF to the client
//!  └─ 5. Clean     input, output and scratch removed exactly once
//! ```
//!
//! Two backends are available:
//!
//! * **native**: headless LibreOffice, faithful layout, needs `soffice`.
//! * **structural**: text, headings, lists and tables extracted from the
//!   `.docx` and laid out again, either by a built-in PDF writer or by
//!   headless Chromium printing an HTML template.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docx2pdf::{router, CorsPolicy, Orchestrator, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::default();
//!     let orchestrator = Orchestrator::new(&config)?;
//!
//!     // One-off conversion
//!     let doc = orchestrator.convert_path("letter.docx".as_ref()).await?;
//!     doc.save_to("letter.pdf".as_ref()).await?;
//!
//!     // Or serve POST /convertFile
//!     let app = router(orchestrator, &CorsPolicy::Permissive);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docx2pdf` binary (clap + anyhow + tracing-subscriber + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod delivery;
pub mod error;
pub mod observer;
pub mod orchestrator;
pub mod request;
pub mod server;
pub mod storage;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{ConversionBackend, ConversionJob, NativeBackend, StructuralBackend};
pub use config::{BackendKind, PageLayout, RendererKind, ServiceConfig, ServiceConfigBuilder};
pub use delivery::{ConvertedDocument, DeliveryStream};
pub use error::{ConvertError, ErrorKind};
pub use observer::{LifecycleObserver, NoopObserver, Observer};
pub use orchestrator::Orchestrator;
pub use request::{ConversionRequest, RequestId, Stage};
pub use server::{router, CorsPolicy};
pub use storage::{ArtifactRole, TempStore, TemporaryArtifact};
pub use validate::{validate, ValidationPolicy};
