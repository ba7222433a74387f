//! # engine-locate
//!
//! Find the external engines that `docx2pdf` delegates to, so that operators
//! do not have to hard-code install paths per host.
//!
//! ## How it works
//!
//! On a call to [`locate`] for an [`Engine`]:
//!
//! 1. An explicit path passed by the caller wins (it must exist).
//! 2. The engine's environment override (`SOFFICE_PATH`, `CHROMIUM_PATH`).
//! 3. Every directory on `PATH`, trying each of the engine's program names.
//! 4. The platform install table (e.g. `/Applications/LibreOffice.app/...`).
//!
//! Steps 2–4 are cached per process in a [`OnceLock`], so concurrent
//! requests pay for the filesystem probes only once.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use engine_locate::{locate, Engine};
//!
//! let soffice = locate(Engine::LibreOffice, None).expect("LibreOffice not installed");
//! println!("using {}", soffice.display());
//! ```
//!
//! ## Platform support
//!
//! | OS      | LibreOffice                                          | Chromium |
//! |---------|------------------------------------------------------|----------|
//! | macOS   | `/Applications/LibreOffice.app/Contents/MacOS/soffice` | `/Applications/Google Chrome.app/...` |
//! | Linux   | `/usr/bin/soffice`, `/opt/libreoffice*/program/soffice` | `/usr/bin/chromium`, `/usr/bin/google-chrome` |
//! | Windows | `C:\Program Files\LibreOffice\program\soffice.exe`    | `C:\Program Files\Google\Chrome\Application\chrome.exe` |

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by engine discovery.
#[derive(Error, Debug)]
pub enum LocateError {
    /// An explicitly configured path does not point at a file.
    #[error("{engine} executable not found at configured path '{path}'")]
    ConfiguredPathMissing { engine: Engine, path: PathBuf },

    /// Nothing on `PATH` or in the platform install table matched.
    #[error("{engine} is not installed (searched PATH for {names:?} and {candidates} known install locations). Set {env_var} to override.")]
    NotInstalled {
        engine: Engine,
        names: &'static [&'static str],
        candidates: usize,
        env_var: &'static str,
    },
}

// ── Engines ──────────────────────────────────────────────────────────────────

/// An external program `docx2pdf` can delegate conversion work to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// LibreOffice in headless mode (`soffice --convert-to pdf`).
    LibreOffice,
    /// Chromium / Chrome in headless mode (`--print-to-pdf`).
    Chromium,
}

impl Engine {
    /// Environment variable that overrides discovery for this engine.
    pub fn env_var(self) -> &'static str {
        match self {
            Engine::LibreOffice => "SOFFICE_PATH",
            Engine::Chromium => "CHROMIUM_PATH",
        }
    }

    /// Program names probed on `PATH`, most specific first.
    pub fn program_names(self) -> &'static [&'static str] {
        match (self, cfg!(windows)) {
            (Engine::LibreOffice, false) => &["soffice", "libreoffice"],
            (Engine::LibreOffice, true) => &["soffice.exe", "soffice.com"],
            (Engine::Chromium, false) => &[
                "chromium",
                "chromium-browser",
                "google-chrome",
                "google-chrome-stable",
            ],
            (Engine::Chromium, true) => &["chrome.exe", "msedge.exe"],
        }
    }

    fn cache(self) -> &'static OnceLock<PathBuf> {
        static LIBREOFFICE: OnceLock<PathBuf> = OnceLock::new();
        static CHROMIUM: OnceLock<PathBuf> = OnceLock::new();
        match self {
            Engine::LibreOffice => &LIBREOFFICE,
            Engine::Chromium => &CHROMIUM,
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Engine::LibreOffice => f.write_str("LibreOffice"),
            Engine::Chromium => f.write_str("Chromium"),
        }
    }
}

// ── Internal: platform install table ─────────────────────────────────────────

/// Well-known install locations for the current OS.
fn platform_candidates(engine: Engine) -> Vec<PathBuf> {
    let os = std::env::consts::OS;
    let mut out: Vec<PathBuf> = match (engine, os) {
        (Engine::LibreOffice, "macos") => {
            vec!["/Applications/LibreOffice.app/Contents/MacOS/soffice".into()]
        }
        (Engine::LibreOffice, "windows") => vec![
            r"C:\Program Files\LibreOffice\program\soffice.exe".into(),
            r"C:\Program Files (x86)\LibreOffice\program\soffice.exe".into(),
        ],
        (Engine::LibreOffice, _) => {
            let mut v: Vec<PathBuf> = vec![
                "/usr/bin/soffice".into(),
                "/usr/local/bin/soffice".into(),
                "/usr/lib/libreoffice/program/soffice".into(),
                "/snap/bin/libreoffice".into(),
            ];
            // Vendor tarball installs: /opt/libreoffice7.6/program/soffice
            if let Ok(entries) = std::fs::read_dir("/opt") {
                let mut vendor: Vec<PathBuf> = entries
                    .filter_map(Result::ok)
                    .filter(|e| e.file_name().to_string_lossy().starts_with("libreoffice"))
                    .map(|e| e.path().join("program").join("soffice"))
                    .collect();
                vendor.sort();
                v.extend(vendor);
            }
            v
        }
        (Engine::Chromium, "macos") => vec![
            "/Applications/Chromium.app/Contents/MacOS/Chromium".into(),
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome".into(),
        ],
        (Engine::Chromium, "windows") => vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe".into(),
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe".into(),
        ],
        (Engine::Chromium, _) => vec![
            "/usr/bin/chromium".into(),
            "/usr/bin/chromium-browser".into(),
            "/usr/bin/google-chrome".into(),
            "/snap/bin/chromium".into(),
        ],
    };

    // Per-user installs.
    if let Some(home) = dirs::home_dir() {
        match (engine, os) {
            (Engine::LibreOffice, "macos") => {
                out.push(home.join("Applications/LibreOffice.app/Contents/MacOS/soffice"))
            }
            (_, "windows") => {}
            (_, _) => {
                for name in engine.program_names() {
                    out.push(home.join(".local/bin").join(name));
                }
            }
        }
    }

    out
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Resolve the executable for `engine`.
///
/// `explicit` is a caller-configured path; when given it must exist and no
/// other location is consulted. Otherwise the env override, `PATH` and the
/// platform table are tried in that order and the result is cached.
///
/// # Thread safety
///
/// Safe to call from many requests at once; racing callers may both probe
/// the filesystem but agree on the result.
pub fn locate(engine: Engine, explicit: Option<&Path>) -> Result<PathBuf, LocateError> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(LocateError::ConfiguredPathMissing {
                engine,
                path: path.to_path_buf(),
            })
        };
    }

    if let Some(path) = engine.cache().get() {
        return Ok(path.clone());
    }

    let path = discover(engine)?;
    let _ = engine.cache().set(path.clone());
    Ok(path)
}

/// Returns `true` when [`locate`] would succeed without an explicit path.
pub fn is_available(engine: Engine) -> bool {
    locate(engine, None).is_ok()
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn discover(engine: Engine) -> Result<PathBuf, LocateError> {
    // 1. Environment variable override.
    if let Ok(value) = std::env::var(engine.env_var()) {
        let p = PathBuf::from(value);
        if p.is_file() {
            return Ok(p);
        }
        return Err(LocateError::ConfiguredPathMissing { engine, path: p });
    }

    // 2. PATH search.
    if let Some(found) = search_path(engine.program_names(), std::env::var_os("PATH")) {
        return Ok(found);
    }

    // 3. Platform install table.
    let candidates = platform_candidates(engine);
    if let Some(found) = candidates.iter().find(|p| p.is_file()) {
        return Ok(found.clone());
    }

    Err(LocateError::NotInstalled {
        engine,
        names: engine.program_names(),
        candidates: candidates.len(),
        env_var: engine.env_var(),
    })
}

/// First `dir/name` on the given `PATH` value that is a regular file.
fn search_path(names: &[&str], path_var: Option<std::ffi::OsString>) -> Option<PathBuf> {
    let path_var = path_var?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
