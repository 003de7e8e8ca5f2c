use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use tracing::{info, warn};
use uase_core_types::EngineError;

use action_primitives::ExecCtx;

use crate::ports::TelemetryPort;

/// Turns a scenario or step name into a single path component.
pub fn artifact_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

fn decode_screenshot(data: &str) -> Result<Vec<u8>, EngineError> {
    let payload = match data.strip_prefix("data:") {
        Some(url) => url.split_once(',').map(|(_, body)| body).unwrap_or(""),
        None => data,
    };
    Base64
        .decode(payload.trim())
        .map_err(|e| EngineError::driver(format!("screenshot is not valid base64: {}", e)))
}

/// Writes `<dir>/<scenario>/<step>.png` and `.txt`.
///
/// Each artifact is attempted independently; failures are logged and the
/// paths actually written are returned.
pub async fn capture_failure(
    ctx: &ExecCtx,
    port: &dyn TelemetryPort,
    dir: &Path,
    scenario: &str,
    step: &str,
) -> Vec<PathBuf> {
    let folder = dir.join(artifact_name(scenario));
    if let Err(err) = tokio::fs::create_dir_all(&folder).await {
        warn!(dir = %folder.display(), error = %err, "cannot create artifact directory");
        return Vec::new();
    }
    let stem = artifact_name(step);
    let mut written = Vec::new();

    let screenshot = async {
        let data = ctx.run(port.screenshot(ctx)).await?;
        decode_screenshot(&data)
    };
    match screenshot.await {
        Ok(png) => {
            let path = folder.join(format!("{}.png", stem));
            match tokio::fs::write(&path, png).await {
                Ok(()) => written.push(path),
                Err(err) => warn!(path = %path.display(), error = %err, "failed to write screenshot"),
            }
        }
        Err(err) => warn!(scenario, step, error = %err, "screenshot capture failed"),
    }

    match ctx.run(port.tree_dump(ctx)).await {
        Ok(dump) => {
            let path = folder.join(format!("{}.txt", stem));
            match tokio::fs::write(&path, dump).await {
                Ok(()) => written.push(path),
                Err(err) => warn!(path = %path.display(), error = %err, "failed to write tree dump"),
            }
        }
        Err(err) => warn!(scenario, step, error = %err, "tree dump failed"),
    }

    info!(scenario, step, artifacts = written.len(), "failure telemetry captured");
    written
}
