//! Input validation: decide whether an upload is worth converting.
//!
//! Validation is a pure function of the declared filename, the declared size
//! (when the transport provides one) and the [`ValidationPolicy`]. It runs
//! before any artifact is allocated, so a rejected request leaves nothing on
//! disk. When the size is not declared up front, the orchestrator enforces
//! the same limit while streaming with [`ValidationPolicy::check_size`].

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};

/// Default upload cap: 10 MiB.
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Extensions accepted when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".doc", ".docx"];

/// Immutable upload constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    allowed_extensions: Vec<String>,
    max_bytes: u64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied(), DEFAULT_MAX_BYTES)
    }
}

impl ValidationPolicy {
    /// Build a policy. Extensions are lower-cased and given a leading dot.
    pub fn new<I, S>(extensions: I, max_bytes: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed_extensions: Vec<String> = extensions
            .into_iter()
            .map(|e| {
                let e = e.as_ref().trim().to_lowercase();
                if e.starts_with('.') {
                    e
                } else {
                    format!(".{e}")
                }
            })
            .filter(|e| e.len() > 1)
            .collect();
        allowed_extensions.sort();
        allowed_extensions.dedup();
        Self {
            allowed_extensions,
            max_bytes,
        }
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Reject `size` if it is over the limit.
    pub fn check_size(&self, size: u64) -> Result<(), ConvertError> {
        if size > self.max_bytes {
            return Err(ConvertError::PayloadTooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}

/// Proof that a filename passed the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// Final path component of the client filename.
    pub filename: String,
    /// Lower-cased extension including the leading dot, e.g. `.docx`.
    pub extension: String,
    /// Size declared by the transport, already checked against the limit.
    pub declared_size: Option<u64>,
}

/// Check `filename` and `declared_size` against `policy`.
///
/// Extension is checked first, so a wrong-type upload of any size is
/// reported as `UnsupportedType`.
pub fn validate(
    filename: &str,
    declared_size: Option<u64>,
    policy: &ValidationPolicy,
) -> Result<Accepted, ConvertError> {
    let filename = client_filename(filename);
    if filename.is_empty() {
        return Err(ConvertError::MissingFile);
    }

    let extension = extension_of(&filename).unwrap_or_default();
    if !policy.allowed_extensions.iter().any(|e| *e == extension) {
        return Err(ConvertError::UnsupportedType { extension });
    }

    if let Some(size) = declared_size {
        policy.check_size(size)?;
    }

    Ok(Accepted {
        filename,
        extension,
        declared_size,
    })
}

/// Strip any directory part a client may send (`C:\docs\a.docx`, `../a.docx`).
pub fn client_filename(raw: &str) -> String {
    raw.rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Lower-cased extension with its dot, or `None` for `README` / `.bashrc`.
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_lowercase()))
}

/// `report.final.docx` → `report.final.pdf`.
pub fn download_name(filename: &str) -> String {
    let base = client_filename(filename);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base.as_str(),
    };
    let stem = if stem.is_empty() { "document" } else { stem };
    format!("{stem}.pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let p = ValidationPolicy::default();
        assert_eq!(p.allowed_extensions(), &[".doc", ".docx"]);
        assert_eq!(p.max_bytes(), 10_485_760);
    }

    #[test]
    fn policy_normalises_extensions() {
        let p = ValidationPolicy::new(["DOCX", ".Doc", "docx", ""], 5);
        assert_eq!(p.allowed_extensions(), &[".doc", ".docx"]);
    }

    #[test]
    fn accepts_word_documents() {
        let p = ValidationPolicy::default();
        let a = validate("Quarterly Report.DOCX", Some(1024), &p).unwrap();
        assert_eq!(a.extension, ".docx");
        assert_eq!(a.filename, "Quarterly Report.DOCX");
        assert!(validate("legacy.doc", None, &p).is_ok());
    }

    #[test]
    fn rejects_other_types() {
        let p = ValidationPolicy::default();
        for name in ["notes.txt", "scan.pdf", "archive.docx.zip", "README", ".docx"] {
            let err = validate(name, Some(10), &p).unwrap_err();
            assert!(
                matches!(err, ConvertError::UnsupportedType { .. }),
                "{name}: {err:?}"
            );
        }
    }

    #[test]
    fn rejects_oversized_declared_size() {
        let p = ValidationPolicy::new([".docx"], 100);
        assert!(validate("a.docx", Some(100), &p).is_ok());
        let err = validate("a.docx", Some(101), &p).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::PayloadTooLarge { size: 101, max: 100 }
        ));
    }

    #[test]
    fn type_checked_before_size() {
        let p = ValidationPolicy::new([".docx"], 1);
        let err = validate("movie.mp4", Some(1 << 30), &p).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedType { .. }));
    }

    #[test]
    fn empty_filename_is_missing_file() {
        let p = ValidationPolicy::default();
        assert!(matches!(
            validate("  ", None, &p),
            Err(ConvertError::MissingFile)
        ));
        assert!(matches!(
            validate("uploads/", None, &p),
            Err(ConvertError::MissingFile)
        ));
    }

    #[test]
    fn strips_client_directories() {
        assert_eq!(client_filename(r"C:\Users\me\cv.docx"), "cv.docx");
        assert_eq!(client_filename("../../etc/cv.docx"), "cv.docx");
        assert_eq!(client_filename("cv.docx"), "cv.docx");
    }

    #[test]
    fn extension_extraction() {
        assert_eq!(extension_of("a.DocX").as_deref(), Some(".docx"));
        assert_eq!(extension_of("a.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn download_name_replaces_extension() {
        assert_eq!(download_name("report.docx"), "report.pdf");
        assert_eq!(download_name("report.final.doc"), "report.final.pdf");
        assert_eq!(download_name("dir/letter.docx"), "letter.pdf");
        assert_eq!(download_name(".docx"), ".docx.pdf");
    }
}
