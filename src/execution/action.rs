//! Step Action Invocation
//!
//! Materializes one step command as a generated bash script and runs it.
//! The contract with the engine is strictly "zero exit status = ran";
//! whether the step is *complete* is decided by its predicate, never here.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, error, warn};
use once_cell::sync::Lazy;

/// Scratch directory for generated step scripts.
static SCRIPT_DIR: Lazy<PathBuf> = Lazy::new(|| {
    let dir = std::env::temp_dir().join("chunkalign_scripts");
    if let Err(e) = fs::create_dir_all(&dir) {
        warn!("Failed to create script directory {}: {}", dir.display(), e);
    }
    dir
});

/// Monotonic suffix so concurrent chunks never share a script file.
static SCRIPT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Runs one step command through bash.
///
/// # Arguments
///
/// * `scope` - Owning workflow label, used in the script name and messages
/// * `step_name` - Step name within the workflow
/// * `command` - The opaque command text
/// * `working_dir` - Optional working directory for relative paths
///
/// # Returns
///
/// * `Ok(())` - Command exited zero
/// * `Err(message)` - Non-zero exit or spawn failure, with captured stderr
pub fn run_command(
    scope: &str,
    step_name: &str,
    command: &str,
    working_dir: Option<&Path>,
) -> Result<(), String> {
    let script_path = write_script(scope, step_name, command)
        .map_err(|e| format!("failed to write step script: {}", e))?;

    let mut cmd = Command::new("bash");
    cmd.arg(&script_path);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
        debug!("Executing '{}' in {}", step_name, dir.display());
    }

    let output = cmd
        .output()
        .map_err(|e| format!("failed to spawn bash: {}", e));

    if let Err(e) = fs::remove_file(&script_path) {
        warn!(
            "Failed to clean up script {}: {}",
            script_path.display(),
            e
        );
    }

    let output = output?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("[{}] step '{}' output:\n{}", scope, step_name, stdout);
        }
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(
            "[{}] step '{}' exited with {:?}",
            scope,
            step_name,
            output.status.code()
        );
        if !stderr.trim().is_empty() {
            error!("stderr:\n{}", stderr);
        }

        Err(match output.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        })
    }
}

/// Writes the command into a uniquely named bash script.
fn write_script(scope: &str, step_name: &str, command: &str) -> std::io::Result<PathBuf> {
    fs::create_dir_all(&*SCRIPT_DIR)?;

    let seq = SCRIPT_SEQ.fetch_add(1, Ordering::Relaxed);
    let script_path = SCRIPT_DIR.join(format!(
        "{}_{}_{}_{}.sh",
        std::process::id(),
        seq,
        sanitize(scope),
        sanitize(step_name)
    ));

    let mut file = File::create(&script_path)?;
    writeln!(file, "#!/bin/bash")?;
    writeln!(file, "set -e")?;
    writeln!(file, "{}", command)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(script_path)
}

/// Keeps script file names to a safe character set.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
