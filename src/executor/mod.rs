//! A tool for executing external commands, such as `ffmpeg` and `yt-dlp`.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Represents a command executor.
///
/// # Example
///
/// ```rust,no_run
/// # use yt_merge::utils;
/// # use std::path::PathBuf;
/// # use std::time::Duration;
/// # use yt_merge::executor::Executor;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let executor = Executor {
///     executable_path: PathBuf::from("ffmpeg"),
///     timeout: Duration::from_secs(30),
///     args: utils::to_owned(vec!["-version"]),
/// };
///
/// let output = executor.execute().await?;
/// println!("Output: {}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Executor {
    /// The path to the command executable.
    pub executable_path: PathBuf,
    /// The timeout for the process.
    pub timeout: Duration,

    /// The arguments to pass to the command.
    pub args: Vec<String>,
}

/// Represents the output of a process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    /// The stdout of the process.
    pub stdout: String,
    /// The stderr of the process.
    pub stderr: String,
    /// The exit code of the process.
    pub code: i32,
}

impl Executor {
    /// Executes the command and returns its output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] with the captured diagnostic output if the process exits
    /// unsuccessfully, [`Error::Timeout`] if it outlives the timeout (the process is killed),
    /// or an IO error if it could not be spawned.
    pub async fn execute(&self) -> Result<ProcessOutput> {
        log::debug!(
            "Executing command: {} {}",
            self.executable_path.display(),
            self.args.join(" ")
        );

        let mut command = tokio::process::Command::new(&self.executable_path);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "windows")]
        {
            command.creation_flags(0x08000000);
        }

        let mut child = command.spawn()?;

        // Both pipes are drained concurrently, otherwise a chatty process fills one and blocks.
        let mut stdout_handle = child
            .stdout
            .take()
            .ok_or_else(|| Error::Unknown("Failed to capture stdout".to_string()))?;
        let mut stderr_handle = child
            .stderr
            .take()
            .ok_or_else(|| Error::Unknown("Failed to capture stderr".to_string()))?;

        let stdout_task = tokio::spawn(async move {
            let mut buffer = Vec::new();
            stdout_handle.read_to_end(&mut buffer).await?;
            Ok::<Vec<u8>, std::io::Error>(buffer)
        });
        let stderr_task = tokio::spawn(async move {
            let mut buffer = Vec::new();
            stderr_handle.read_to_end(&mut buffer).await?;
            Ok::<Vec<u8>, std::io::Error>(buffer)
        });

        let exit_status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(result) => result?,
            Err(_) => {
                log::warn!("Process timed out after {:?}, killing it", self.timeout);
                if let Err(e) = child.kill().await {
                    log::error!("Failed to kill process after timeout: {}", e);
                }

                return Err(Error::Timeout(self.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_task.await??).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_task.await??).into_owned();

        let code = exit_status.code().unwrap_or(-1);
        if exit_status.success() {
            return Ok(ProcessOutput {
                stdout,
                stderr,
                code,
            });
        }

        let diagnostic = if stderr.trim().is_empty() { stdout } else { stderr };
        Err(Error::Command {
            code,
            stderr: diagnostic.trim().to_string(),
        })
    }
}
