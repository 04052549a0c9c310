//! Variable evaluation and rendering.
//!
//! Values come back from the debugger as trees already trimmed to the
//! requested load depth. Rendering walks that tree once more with the same
//! depth so composites past the limit collapse into a short summary instead
//! of showing whatever partial children happened to load.

use dlvctl_rpc::{EvalScope, Kind, LoadConfig, RpcError, Variable};
use serde::Serialize;

use crate::backend::Backend;
use crate::error::DebugError;

/// Expansion depth used when none is requested.
pub const DEFAULT_DEPTH: u32 = 1;

/// Where a variable lives relative to the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    Local,
    Argument,
}

/// A rendered variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableView {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<VariableScope>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<VariableView>,
}

/// Read-only access to variables of a halted target.
pub struct VariableInspector<'a, B> {
    backend: &'a mut B,
}

impl<'a, B: Backend> VariableInspector<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        Self { backend }
    }

    /// Evaluate `expression` in `scope`, expanding composites `depth` levels.
    pub async fn eval(
        &mut self,
        scope: EvalScope,
        expression: &str,
        depth: u32,
    ) -> Result<VariableView, DebugError> {
        let var = self
            .backend
            .eval(scope, expression, LoadConfig::with_depth(depth))
            .await
            .map_err(scope_error)?;
        let mut view = project(&var, depth);
        if view.name.is_empty() {
            view.name = expression.to_string();
        }
        Ok(view)
    }

    /// Arguments then locals of the frame in `scope`.
    pub async fn frame_variables(
        &mut self,
        scope: EvalScope,
        depth: u32,
    ) -> Result<Vec<VariableView>, DebugError> {
        let cfg = LoadConfig::with_depth(depth);
        let args = self.backend.function_args(scope, cfg).await?;
        let locals = self.backend.local_vars(scope, cfg).await?;

        let mut views = Vec::with_capacity(args.len() + locals.len());
        for var in &args {
            let mut view = project(var, depth);
            view.scope = Some(VariableScope::Argument);
            views.push(view);
        }
        for var in &locals {
            let mut view = project(var, depth);
            view.scope = Some(if var.is_argument() {
                VariableScope::Argument
            } else {
                VariableScope::Local
            });
            views.push(view);
        }
        Ok(views)
    }
}

/// Server rejections of an expression are scope errors; transport failures
/// stay backend failures.
fn scope_error(err: RpcError) -> DebugError {
    match err.server_message() {
        Some(message) => DebugError::ScopeError(message.to_string()),
        None => DebugError::from(err),
    }
}

/// Render `var` with composites expanded `depth` levels.
pub fn project(var: &Variable, depth: u32) -> VariableView {
    VariableView {
        name: var.name.clone(),
        value: render(var, depth),
        type_name: var.type_name.clone(),
        kind: var.kind().as_str(),
        scope: None,
        children: project_children(var, depth),
    }
}

fn project_children(var: &Variable, depth: u32) -> Vec<VariableView> {
    if !var.unreadable.is_empty() || depth == 0 {
        return Vec::new();
    }
    match var.kind() {
        Kind::Struct => var.children.iter().map(|c| project(c, depth - 1)).collect(),
        Kind::Array | Kind::Slice => var
            .children
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut view = project(c, depth - 1);
                view.name = format!("[{i}]");
                view
            })
            .collect(),
        Kind::Map => var
            .children
            .chunks(2)
            .filter_map(|pair| match pair {
                [key, value] => {
                    let mut view = project(value, depth - 1);
                    view.name = render(key, 0);
                    Some(view)
                }
                _ => None,
            })
            .collect(),
        Kind::Pointer => match pointee(var) {
            Some(target) if target.kind() != Kind::Pointer => project_children(target, depth),
            _ => Vec::new(),
        },
        Kind::Interface => match var.children.first() {
            Some(concrete) if concrete.kind() != Kind::Invalid => {
                project_children(concrete, depth)
            }
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Text form of a value.
pub fn render(var: &Variable, depth: u32) -> String {
    if !var.unreadable.is_empty() {
        return format!("(unreadable: {})", var.unreadable);
    }
    match var.kind() {
        Kind::String => quote(&var.value, var.len),
        Kind::Struct => {
            if depth == 0 {
                return format!("{} {{...}}", var.type_name);
            }
            let fields: Vec<String> = var
                .children
                .iter()
                .map(|c| format!("{}: {}", c.name, render(c, depth - 1)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
        Kind::Array | Kind::Slice => {
            if depth == 0 {
                return format!("{} len: {}", var.type_name, var.len);
            }
            let items: Vec<String> = var.children.iter().map(|c| render(c, depth - 1)).collect();
            bracket(items, var.len)
        }
        Kind::Map => {
            if depth == 0 {
                return format!("{} len: {}", var.type_name, var.len);
            }
            let entries: Vec<String> = var
                .children
                .chunks(2)
                .filter_map(|pair| match pair {
                    [key, value] => Some(format!(
                        "{}: {}",
                        render(key, depth - 1),
                        render(value, depth - 1)
                    )),
                    _ => None,
                })
                .collect();
            bracket(entries, var.len)
        }
        Kind::Pointer => match pointee(var) {
            None => "nil".to_string(),
            // One level of indirection only.
            Some(target) if target.kind() == Kind::Pointer => {
                format!("({}) {:#x}", var.type_name, target.addr)
            }
            Some(target) => format!("&{}", render(target, depth)),
        },
        Kind::Interface => match var.children.first() {
            Some(concrete) if concrete.kind() != Kind::Invalid => render(concrete, depth),
            _ => "nil".to_string(),
        },
        Kind::Chan | Kind::Func | Kind::UnsafePointer if var.value.is_empty() => {
            if var.addr == 0 {
                "nil".to_string()
            } else {
                format!("({}) {:#x}", var.type_name, var.addr)
            }
        }
        _ => var.value.clone(),
    }
}

fn pointee(var: &Variable) -> Option<&Variable> {
    var.children.first().filter(|target| target.addr != 0)
}

/// `len` is the full length in bytes, as the server reports it.
fn quote(value: &str, len: i64) -> String {
    let loaded = value.len() as i64;
    if len > loaded {
        format!("{value:?}...+{} more", len - loaded)
    } else {
        format!("{value:?}")
    }
}

fn bracket(items: Vec<String>, len: i64) -> String {
    let shown = items.len() as i64;
    if len > shown {
        format!("[{}, ...+{} more]", items.join(", "), len - shown)
    } else {
        format!("[{}]", items.join(", "))
    }
}
