use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn path_param(req: &Request, key: &str) -> Option<PathBuf> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(out_path) = path_param(req, "outPath") else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };

    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => {
            info!(
                out = %out_path.display(),
                sha256 = %summary.db_sha256,
                "workspace bundle exported"
            );
            ok(
                &req.id,
                json!({
                    "ok": true,
                    "path": out_path.to_string_lossy(),
                    "bundleFormat": summary.bundle_format,
                    "dbSha256": summary.db_sha256,
                    "dbBytes": summary.db_bytes,
                }),
            )
        }
        Err(e) => err(&req.id, "io_failed", format!("{e:#}"), None),
    }
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(in_path) = path_param(req, "inPath") else {
        return err(&req.id, "bad_params", "missing inPath", None);
    };
    let Some(workspace) = path_param(req, "workspacePath").or_else(|| state.workspace.clone())
    else {
        return err(
            &req.id,
            "bad_params",
            "missing workspacePath (and no workspace selected)",
            None,
        );
    };

    // The file is replaced underneath, so release the handle first.
    let previous = state.workspace.take();
    state.db = None;

    let summary = match backup::import_workspace_bundle(&in_path, &workspace) {
        Ok(s) => s,
        Err(e) => {
            warn!(bundle = %in_path.display(), error = %e, "workspace bundle import failed");
            if let Some(prev) = previous {
                if let Err(reopen) = open_workspace(state, &prev) {
                    warn!(workspace = %prev.display(), error = %reopen, "previous workspace not reopened");
                }
            }
            return err(&req.id, "io_failed", format!("{e:#}"), None);
        }
    };
    if let Err(e) = open_workspace(state, &workspace) {
        return err(&req.id, "db_open_failed", format!("{e:#}"), None);
    }
    info!(
        bundle = %in_path.display(),
        workspace = %workspace.display(),
        format = %summary.bundle_format_detected,
        "workspace bundle imported"
    );

    ok(
        &req.id,
        json!({
            "ok": true,
            "workspacePath": workspace.to_string_lossy(),
            "bundleFormatDetected": summary.bundle_format_detected,
            "dbSha256": summary.db_sha256,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "workspace.exportBundle" => Some(handle_export_bundle(state, req)),
        "workspace.importBundle" => Some(handle_import_bundle(state, req)),
        _ => None,
    }
}
