//! Native conversion: delegate to headless LibreOffice.
//!
//! ## Invocation
//!
//! ```text
//! soffice --headless --norestore --nolockcheck
//!         -env:UserInstallation=file://<scratch>/profile
//!         --convert-to pdf --outdir <scratch>/out <input>
//! ```
//!
//! LibreOffice refuses to run two instances against the same user profile,
//! so every request gets its own profile inside its scratch directory.
//! That costs a second or so of profile initialisation per call but lets
//! requests convert in parallel without a global lock.
//!
//! The PDF lands in `--outdir` named after the input's stem. A zero exit
//! with no file there is reported as `OutputMissing`; soffice does this for
//! documents it cannot load.

use super::{engine_failure, ConversionBackend, ConversionJob};
use crate::error::ConvertError;
use async_trait::async_trait;
use engine_locate::Engine;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, warn};

/// Converts via the LibreOffice `soffice` binary.
#[derive(Debug, Clone, Default)]
pub struct NativeBackend {
    soffice_path: Option<PathBuf>,
}

impl NativeBackend {
    /// `soffice_path` overrides discovery; `None` searches `SOFFICE_PATH`,
    /// `PATH` and the usual install locations on first use.
    pub fn new(soffice_path: Option<PathBuf>) -> Self {
        Self { soffice_path }
    }
}

#[async_trait]
impl ConversionBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "libreoffice"
    }

    async fn convert(&self, job: &ConversionJob<'_>) -> Result<Vec<u8>, ConvertError> {
        let soffice = engine_locate::locate(Engine::LibreOffice, self.soffice_path.as_deref())
            .map_err(|e| ConvertError::conversion(e.to_string()))?;

        let scratch = job.scratch.path();
        let outdir = scratch.join("out");
        let profile = scratch.join("profile");
        tokio::fs::create_dir_all(&outdir)
            .await
            .map_err(|e| ConvertError::storage(&outdir, e))?;

        let mut cmd = Command::new(&soffice);
        cmd.arg("--headless")
            .arg("--norestore")
            .arg("--nolockcheck")
            .arg(format!("-env:UserInstallation={}", file_url(&profile)))
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(&outdir)
            .arg(job.input.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(request_id = %job.request_id, soffice = %soffice.display(), "running soffice");
        let started = Instant::now();
        let output = cmd.output().await.map_err(|e| {
            ConvertError::conversion(format!("Failed to run {}: {e}", soffice.display()))
        })?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !output.status.success() {
            return Err(engine_failure("soffice", output.status, &output.stderr));
        }

        let produced = outdir.join(pdf_name_for(job.input.path()));
        match tokio::fs::read(&produced).await {
            Ok(bytes) => {
                debug!(
                    request_id = %job.request_id,
                    bytes = bytes.len(),
                    elapsed_ms,
                    "soffice finished"
                );
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    request_id = %job.request_id,
                    elapsed_ms,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "soffice exited cleanly without writing a PDF"
                );
                Err(ConvertError::OutputMissing)
            }
            Err(e) => Err(ConvertError::storage(&produced, e)),
        }
    }
}

/// `<dir>/abc-input-cv.docx` → `abc-input-cv.pdf`.
fn pdf_name_for(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}.pdf")
}

/// Absolute `file://` URL for a local path, as LibreOffice and Chromium expect.
pub(crate) fn file_url(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|d| d.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let s = absolute.to_string_lossy().replace('\\', "/").replace(' ', "%20");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_follows_input_stem() {
        assert_eq!(
            pdf_name_for(Path::new("/w/20260101-ab-input-cv.docx")),
            "20260101-ab-input-cv.pdf"
        );
        assert_eq!(pdf_name_for(Path::new("/w/a.b.doc")), "a.b.pdf");
    }

    #[test]
    fn file_url_is_absolute() {
        let url = file_url(Path::new("/tmp/docx2pdf/x y/profile"));
        assert_eq!(url, "file:///tmp/docx2pdf/x%20y/profile");
        assert!(file_url(Path::new("relative")).starts_with("file:///"));
    }

    #[tokio::test]
    async fn missing_engine_is_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::storage::TempStore::open(dir.path()).unwrap();
        let id = crate::request::RequestId::generate();
        let input = store.allocate(&id, crate::storage::ArtifactRole::Input, "a.docx");
        let scratch = store.allocate(&id, crate::storage::ArtifactRole::Scratch, "work");
        let backend = NativeBackend::new(Some(dir.path().join("no-such-soffice")));
        let job = ConversionJob {
            request_id: &id,
            filename: "cv.docx",
            input: &input,
            scratch: &scratch,
        };
        let err = backend.convert(&job).await.unwrap_err();
        assert!(matches!(err, ConvertError::Conversion { .. }), "{err:?}");
    }

    /// Drives the backend against shell scripts standing in for soffice.
    /// One test so no other test thread forks while a script is open for
    /// writing (ETXTBSY).
    #[cfg(unix)]
    #[tokio::test]
    async fn fake_soffice_scenarios() {
        use crate::request::RequestId;
        use crate::storage::{ArtifactRole, TempStore};
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let script = |name: &str, body: &str| -> PathBuf {
            let path = bin.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        };

        let ok = script(
            "soffice-ok",
            r#"out=""; prev=""; last=""
for a in "$@"; do
  if [ "$prev" = "--outdir" ]; then out="$a"; fi
  prev="$a"; last="$a"
done
base=$(basename "$last"); stem="${base%.*}"
printf '%%PDF-1.4 fake' > "$out/$stem.pdf""#,
        );
        let fails = script("soffice-fail", "echo 'Error: source file could not be loaded' >&2\nexit 1");
        let silent = script("soffice-silent", "exit 0");
        let hangs = script("soffice-hang", "exec sleep 30");

        let store = TempStore::open(dir.path().join("work")).unwrap();
        let id = RequestId::generate();
        let input = store.allocate(&id, ArtifactRole::Input, "cv.docx");
        std::fs::write(input.path(), b"PK fake docx").unwrap();
        let scratch = store.allocate(&id, ArtifactRole::Scratch, "work");
        let job = ConversionJob {
            request_id: &id,
            filename: "cv.docx",
            input: &input,
            scratch: &scratch,
        };

        let pdf = NativeBackend::new(Some(ok)).convert(&job).await.unwrap();
        assert_eq!(pdf, b"%PDF-1.4 fake");

        let err = NativeBackend::new(Some(fails)).convert(&job).await.unwrap_err();
        match err {
            ConvertError::Conversion { detail } => {
                assert!(detail.contains("could not be loaded"), "{detail}")
            }
            other => panic!("expected Conversion, got {other:?}"),
        }

        // Clear the PDF the first script left behind.
        std::fs::remove_dir_all(scratch.path().join("out")).unwrap();
        let err = NativeBackend::new(Some(silent)).convert(&job).await.unwrap_err();
        assert!(matches!(err, ConvertError::OutputMissing), "{err:?}");

        let started = Instant::now();
        let hung = tokio::time::timeout(
            std::time::Duration::from_millis(300),
            NativeBackend::new(Some(hangs)).convert(&job),
        )
        .await;
        assert!(hung.is_err());
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
