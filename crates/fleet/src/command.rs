use std::io::ErrorKind;

use tokio::process::Command;
use tracing::debug;

use crate::error::{FleetError, Result};

/// Run an external CLI and return its stdout.
///
/// A non-zero exit becomes [`FleetError::CommandFailed`] carrying stderr.
pub(crate) async fn run(program: &str, args: &[String]) -> Result<String> {
    debug!(program, args = ?args, "Running command");

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => FleetError::CommandNotFound(program.to_string()),
            _ => FleetError::Io(e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(FleetError::command_failed(
            format!("{} {}", program, args.join(" ")),
            stderr,
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Like [`run`], for the Azure CLI: a failure whose stderr shows the CLI's
/// login is missing or stale becomes [`FleetError::NotAuthenticated`].
pub(crate) async fn run_az(program: &str, args: &[String]) -> Result<String> {
    run(program, args).await.map_err(|err| match err {
        FleetError::CommandFailed { stderr, .. } if is_azure_login_failure(&stderr) => {
            FleetError::NotAuthenticated(stderr)
        }
        other => other,
    })
}

fn is_azure_login_failure(stderr: &str) -> bool {
    stderr.contains("AADSTS")
        || stderr.contains("az login")
        || stderr.contains("InteractionRequired")
}
