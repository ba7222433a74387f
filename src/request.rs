//! Per-request identity and lifecycle stage.

use crate::error::ErrorKind;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Collision-resistant request identifier.
///
/// Rendered as `<UTC timestamp>-<uuid v4 simple>`, e.g.
/// `20261019T150502123-4f0c…`. The timestamp keeps the working directory
/// listing ordered; the UUID makes concurrent requests distinct even within
/// the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        let ts = Utc::now().format("%Y%m%dT%H%M%S%3f");
        Self(format!("{ts}-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a request in its lifecycle.
///
/// Stages only move forward. `Failed` is reachable from every
/// non-terminal stage; `Cleaned` follows both `Delivered` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "stage", content = "reason")]
pub enum Stage {
    Received,
    Validated,
    Stored,
    Converting,
    Converted,
    Delivered,
    Failed(ErrorKind),
    Cleaned,
}

impl Stage {
    fn rank(self) -> u8 {
        match self {
            Stage::Received => 0,
            Stage::Validated => 1,
            Stage::Stored => 2,
            Stage::Converting => 3,
            Stage::Converted => 4,
            Stage::Delivered | Stage::Failed(_) => 5,
            Stage::Cleaned => 6,
        }
    }

    /// `Delivered` or `Failed`: the request is done and only cleanup remains.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Delivered | Stage::Failed(_))
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Forward moves go one stage at a time. `Failed` is reachable from any
    /// non-terminal stage and `Cleaned` only from a terminal one.
    pub fn can_advance_to(self, next: Stage) -> bool {
        match (self, next) {
            (Stage::Cleaned, _) => false,
            (s, Stage::Failed(_)) => !s.is_terminal(),
            (s, Stage::Cleaned) => s.is_terminal(),
            (s, n) => n.rank() == s.rank() + 1 && !s.is_terminal(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Failed(kind) => write!(f, "failed({kind:?})"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// One in-flight conversion job, owned by a single orchestrator run.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub id: RequestId,
    /// Client filename as received (directory part already stripped).
    pub filename: String,
    /// Lower-cased extension, known once validation passes.
    pub extension: Option<String>,
    /// Bytes received so far (or the declared size before staging).
    pub size: Option<u64>,
    stage: Stage,
}

impl ConversionRequest {
    pub fn new(filename: impl Into<String>, declared_size: Option<u64>) -> Self {
        Self {
            id: RequestId::generate(),
            filename: filename.into(),
            extension: None,
            size: declared_size,
            stage: Stage::Received,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Move to `next`. Illegal transitions are ignored and reported as `false`.
    pub fn advance(&mut self, next: Stage) -> bool {
        if !self.stage.can_advance_to(next) {
            tracing::warn!(
                request_id = %self.id,
                from = %self.stage,
                to = %next,
                "ignored illegal stage transition"
            );
            return false;
        }
        tracing::debug!(request_id = %self.id, from = %self.stage, to = %next, "stage");
        self.stage = next;
        true
    }
}
