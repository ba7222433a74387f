//! Configuration types for the conversion service.
//!
//! Everything the orchestrator consumes from the outside — working
//! directory, upload policy, backend selection, timeout, page layout — lives
//! in [`ServiceConfig`], built via its [`ServiceConfigBuilder`]. The HTTP
//! layer and the CLI only map their flags onto the builder.

use crate::error::ConvertError;
use crate::observer::Observer;
use crate::validate::ValidationPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the conversion service.
///
/// Built via [`ServiceConfig::builder()`] or using
/// [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use docx2pdf::{BackendKind, ServiceConfig};
///
/// let config = ServiceConfig::builder()
///     .work_dir("/tmp/docx2pdf")
///     .backend(BackendKind::Structural)
///     .conversion_timeout_secs(45)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Directory holding every request's temporary artifacts.
    /// Default: `<system temp>/docx2pdf`.
    pub work_dir: PathBuf,

    /// Allowed extensions and maximum upload size.
    pub policy: ValidationPolicy,

    /// Which conversion backend serves requests. Default: [`BackendKind::Native`].
    pub backend: BackendKind,

    /// Upper bound on one backend invocation in seconds. Default: 30.
    ///
    /// LibreOffice usually converts a few pages in 1–3 s, but a malformed
    /// document can make it spin forever. When this elapses the engine
    /// process is killed and the request fails with `ConversionTimeout`.
    pub conversion_timeout_secs: u64,

    /// Explicit `soffice` path. If None, discovered via `engine-locate`.
    pub soffice_path: Option<PathBuf>,

    /// Renderer used by the structural backend. Default: [`RendererKind::Builtin`].
    pub renderer: RendererKind,

    /// Explicit Chromium path for [`RendererKind::Chromium`].
    pub chromium_path: Option<PathBuf>,

    /// Page geometry used by the structural backend.
    pub page_layout: PageLayout,

    /// Lifecycle callback. If None, events are dropped.
    pub observer: Option<Observer>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("docx2pdf"),
            policy: ValidationPolicy::default(),
            backend: BackendKind::default(),
            conversion_timeout_secs: 30,
            soffice_path: None,
            renderer: RendererKind::default(),
            chromium_path: None,
            page_layout: PageLayout::default(),
            observer: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("work_dir", &self.work_dir)
            .field("policy", &self.policy)
            .field("backend", &self.backend)
            .field("conversion_timeout_secs", &self.conversion_timeout_secs)
            .field("soffice_path", &self.soffice_path)
            .field("renderer", &self.renderer)
            .field("chromium_path", &self.chromium_path)
            .field("page_layout", &self.page_layout)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn LifecycleObserver>"))
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_secs(self.conversion_timeout_secs)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn policy(mut self, policy: ValidationPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.config.backend = kind;
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = secs;
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = Some(path.into());
        self
    }

    pub fn renderer(mut self, kind: RendererKind) -> Self {
        self.config.renderer = kind;
        self
    }

    pub fn chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chromium_path = Some(path.into());
        self
    }

    pub fn page_layout(mut self, layout: PageLayout) -> Self {
        self.config.page_layout = layout;
        self
    }

    pub fn observer(mut self, observer: Observer) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ConvertError> {
        let c = &self.config;
        if c.policy.allowed_extensions().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "At least one allowed extension is required".into(),
            ));
        }
        if c.policy.max_bytes() == 0 {
            return Err(ConvertError::InvalidConfig(
                "Maximum upload size must be > 0".into(),
            ));
        }
        if c.conversion_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "Conversion timeout must be ≥ 1 second".into(),
            ));
        }
        if c.work_dir.as_os_str().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "Working directory must not be empty".into(),
            ));
        }
        c.page_layout.check()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Conversion strategy, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hand the file to headless LibreOffice. Handles `.doc` and `.docx`. (default)
    #[default]
    Native,
    /// Extract text structure, wrap it in the print template, render it.
    /// `.docx` only; no office suite needed.
    Structural,
}

impl FromStr for BackendKind {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "native" | "libreoffice" | "soffice" => Ok(BackendKind::Native),
            "structural" | "html" => Ok(BackendKind::Structural),
            other => Err(ConvertError::InvalidConfig(format!(
                "Unknown backend '{other}' (expected native or structural)"
            ))),
        }
    }
}

/// Engine that turns the structural template into PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// In-process text layout (lopdf). No external tools. (default)
    #[default]
    Builtin,
    /// Headless Chromium `--print-to-pdf` of the HTML template.
    Chromium,
}

impl FromStr for RendererKind {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "builtin" => Ok(RendererKind::Builtin),
            "chromium" | "chrome" => Ok(RendererKind::Chromium),
            other => Err(ConvertError::InvalidConfig(format!(
                "Unknown renderer '{other}' (expected builtin or chromium)"
            ))),
        }
    }
}

/// Fixed page geometry for structural rendering, in PostScript points.
///
/// Every document gets the same page size and margins regardless of what
/// the source file asked for; `print_background` keeps template background
/// colours in the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    /// Page width. Default: 595.28 (A4).
    pub width_pt: f32,
    /// Page height. Default: 841.89 (A4).
    pub height_pt: f32,
    /// Margin on all four sides. Default: 56.69 (20 mm).
    pub margin_pt: f32,
    /// Body font size. Default: 11.
    pub font_size_pt: f32,
    /// Paint the template background. Default: true.
    pub print_background: bool,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            width_pt: 595.28,
            height_pt: 841.89,
            margin_pt: 56.69,
            font_size_pt: 11.0,
            print_background: true,
        }
    }
}

impl PageLayout {
    /// Printable width between the margins.
    pub fn content_width(&self) -> f32 {
        self.width_pt - 2.0 * self.margin_pt
    }

    fn check(&self) -> Result<(), ConvertError> {
        if self.font_size_pt < 4.0 || self.font_size_pt > 72.0 {
            return Err(ConvertError::InvalidConfig(format!(
                "Font size must be 4–72 pt, got {}",
                self.font_size_pt
            )));
        }
        if self.content_width() < self.font_size_pt * 10.0
            || self.height_pt - 2.0 * self.margin_pt < self.font_size_pt * 4.0
        {
            return Err(ConvertError::InvalidConfig(
                "Margins leave no room for text".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let c = ServiceConfig::builder().build().unwrap();
        assert_eq!(c.backend, BackendKind::Native);
        assert_eq!(c.conversion_timeout(), Duration::from_secs(30));
        assert_eq!(c.policy.max_bytes(), 10_485_760);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = ServiceConfig::builder()
            .conversion_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
    }

    #[test]
    fn empty_allow_list_rejected() {
        let err = ServiceConfig::builder()
            .policy(ValidationPolicy::new(Vec::<String>::new(), 10))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("extension"));
    }

    #[test]
    fn zero_max_size_rejected() {
        assert!(ServiceConfig::builder()
            .policy(ValidationPolicy::new([".docx"], 0))
            .build()
            .is_err());
    }

    #[test]
    fn oversized_margins_rejected() {
        let layout = PageLayout {
            margin_pt: 290.0,
            ..PageLayout::default()
        };
        assert!(ServiceConfig::builder().page_layout(layout).build().is_err());
    }

    #[test]
    fn backend_kind_parses() {
        assert_eq!("LibreOffice".parse::<BackendKind>().unwrap(), BackendKind::Native);
        assert_eq!("structural".parse::<BackendKind>().unwrap(), BackendKind::Structural);
        assert!("pandoc".parse::<BackendKind>().is_err());
        assert_eq!("chrome".parse::<RendererKind>().unwrap(), RendererKind::Chromium);
    }

    #[test]
    fn debug_hides_observer() {
        let c = ServiceConfig::builder()
            .observer(std::sync::Arc::new(crate::observer::NoopObserver))
            .build()
            .unwrap();
        assert!(format!("{c:?}").contains("<dyn LifecycleObserver>"));
    }
}
