//! Breakpoint management.
//!
//! The debugger server owns the breakpoint table; this module only checks
//! requests against it and projects entries into reportable form. Internal
//! breakpoints (negative ids) are listed but can never be removed.

use dlvctl_rpc::{Breakpoint, BreakpointSpec};
use serde::Serialize;

use crate::backend::Backend;
use crate::error::DebugError;
use crate::format::{location_string, Payload};

/// Prefix of the server's error for a duplicate location.
const EXISTS_PREFIX: &str = "Breakpoint exists";

/// Reported state of a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointStatus {
    Enabled,
    Disabled,
    Hit,
}

impl BreakpointStatus {
    /// Disabled wins over hit, hit over enabled.
    pub fn of(bp: &Breakpoint) -> Self {
        if bp.disabled {
            BreakpointStatus::Disabled
        } else if bp.total_hit_count > 0 {
            BreakpointStatus::Hit
        } else {
            BreakpointStatus::Enabled
        }
    }
}

/// A breakpoint as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointInfo {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub file: String,
    pub line: i64,
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub hit_count: u64,
    /// Named `state` so it cannot shadow the envelope's `status`.
    pub state: BreakpointStatus,
    pub location: String,
    /// Set for the debugger's own breakpoints.
    pub internal: bool,
}

impl From<&Breakpoint> for BreakpointInfo {
    fn from(bp: &Breakpoint) -> Self {
        let function = if bp.function_name.is_empty() {
            "unknown".to_string()
        } else {
            bp.function_name.clone()
        };
        Self {
            id: bp.id,
            name: non_empty(&bp.name),
            file: bp.file.clone(),
            line: bp.line,
            location: location_string(&bp.file, bp.line, &function),
            function,
            condition: non_empty(&bp.cond),
            hit_count: bp.total_hit_count,
            state: BreakpointStatus::of(bp),
            internal: bp.id < 0,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

impl Payload for BreakpointInfo {}

/// Payload of `listBreakpoints`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakpointList {
    pub breakpoints: Vec<BreakpointInfo>,
}

impl Payload for BreakpointList {}

/// Payload of `removeBreakpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedBreakpoint {
    pub removed: BreakpointInfo,
}

impl Payload for RemovedBreakpoint {}

/// Whether two breakpoint locations name the same source line.
///
/// Paths match when equal or when one is a path-suffix of the other, so a
/// relative request collides with the absolute path the server resolved.
pub fn same_location(a_file: &str, a_line: i64, b_file: &str, b_line: i64) -> bool {
    if a_line != b_line {
        return false;
    }
    a_file == b_file || is_path_suffix(a_file, b_file) || is_path_suffix(b_file, a_file)
}

fn is_path_suffix(long: &str, short: &str) -> bool {
    let short = short.trim_start_matches("./");
    if short.is_empty() {
        return false;
    }
    long.ends_with(short)
        && (long.len() == short.len() || long[..long.len() - short.len()].ends_with('/'))
}

/// Breakpoint operations against one backend.
pub struct BreakpointManager<'a, B> {
    backend: &'a mut B,
}

impl<'a, B: Backend> BreakpointManager<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        Self { backend }
    }

    /// Set a breakpoint, optionally conditional.
    ///
    /// Fails with [`DebugError::BreakpointConflict`] when a user breakpoint
    /// already sits on the same line; the table is left untouched.
    pub async fn set(
        &mut self,
        file: &str,
        line: i64,
        condition: Option<&str>,
    ) -> Result<BreakpointInfo, DebugError> {
        let conflict = || DebugError::BreakpointConflict {
            file: file.to_string(),
            line,
        };

        let existing = self.backend.list_breakpoints().await?;
        if existing
            .iter()
            .any(|bp| bp.id > 0 && same_location(&bp.file, bp.line, file, line))
        {
            return Err(conflict());
        }

        let spec = BreakpointSpec {
            file: file.to_string(),
            line,
            cond: condition.map(str::trim).unwrap_or_default().to_string(),
        };
        match self.backend.create_breakpoint(&spec).await {
            Ok(bp) => {
                tracing::info!(id = bp.id, file = %bp.file, line = bp.line, "breakpoint set");
                Ok(BreakpointInfo::from(&bp))
            }
            Err(err) => match err.server_message() {
                Some(msg) if msg.starts_with(EXISTS_PREFIX) => Err(conflict()),
                Some(msg) => Err(DebugError::InvalidLocation {
                    file: file.to_string(),
                    line,
                    message: msg.to_string(),
                }),
                None => Err(err.into()),
            },
        }
    }

    /// Every breakpoint, internal ones included, ordered by id.
    pub async fn list(&mut self) -> Result<Vec<BreakpointInfo>, DebugError> {
        let mut list: Vec<BreakpointInfo> = self
            .backend
            .list_breakpoints()
            .await?
            .iter()
            .map(BreakpointInfo::from)
            .collect();
        list.sort_by_key(|bp| bp.id);
        Ok(list)
    }

    /// Remove a user breakpoint by id.
    pub async fn remove(&mut self, id: i64) -> Result<BreakpointInfo, DebugError> {
        if id <= 0 {
            return Err(DebugError::BreakpointNotFound(id));
        }
        let existing = self.backend.list_breakpoints().await?;
        if !existing.iter().any(|bp| bp.id == id) {
            return Err(DebugError::BreakpointNotFound(id));
        }
        match self.backend.clear_breakpoint(id).await {
            Ok(bp) => {
                tracing::info!(id, "breakpoint removed");
                Ok(BreakpointInfo::from(&bp))
            }
            Err(err) if err.server_message().is_some() => Err(DebugError::BreakpointNotFound(id)),
            Err(err) => Err(err.into()),
        }
    }
}
