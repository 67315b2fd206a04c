use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

/// Lines of ffmpeg stderr kept in error messages
const STDERR_TAIL_LINES: usize = 6;

/// ffmpeg from `PATH`, or the bare name and let the OS look it up
pub fn default_binary() -> PathBuf {
    which::which("ffmpeg").unwrap_or_else(|_| PathBuf::from("ffmpeg"))
}

/// Run ffmpeg to completion. On failure the error is the tail of stderr.
pub fn run(ffmpeg: &Path, args: &[OsString]) -> Result<(), String> {
    debug!(
        "{} {}",
        ffmpeg.display(),
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let output = Command::new(ffmpeg)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| format!("could not start {}: {e}", ffmpeg.display()))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
    Err(format!("ffmpeg exited with {}: {tail}", output.status))
}
