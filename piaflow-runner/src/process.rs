//! Subprocess helpers
//!
//! Every external tool (git, sh, kubectl, helm) is driven through these two
//! functions. `run_combined` interleaves stdout and stderr in arrival order
//! for the run log; `run_captured` keeps them apart for commands whose
//! stdout is parsed.

use std::io;
use std::process::{ExitStatus, Output, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::CommandError;

/// Exit status plus interleaved stdout and stderr
#[derive(Debug)]
pub struct CombinedOutput {
    pub status: ExitStatus,
    pub output: String,
}

impl CombinedOutput {
    /// Converts a non-zero exit into an error; output stays in the log
    pub fn check(&self) -> Result<(), CommandError> {
        if self.status.success() {
            Ok(())
        } else {
            Err(CommandError::Exit {
                status: self.status,
            })
        }
    }
}

fn program_name(command: &Command) -> String {
    command.as_std().get_program().to_string_lossy().into_owned()
}

/// Runs a command to completion, capturing stdout and stderr as one stream
pub async fn run_combined(mut command: Command) -> Result<CombinedOutput, CommandError> {
    let program = program_name(&command);
    debug!(program = %program, "spawning process");

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| CommandError::Spawn {
        program: program.clone(),
        source,
    })?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
    }
    drop(tx);

    let mut bytes = Vec::new();
    while let Some(chunk) = rx.recv().await {
        bytes.extend_from_slice(&chunk);
    }
    for reader in readers {
        if let Err(e) = reader.await {
            warn!(program = %program, "output reader task failed: {}", e);
        }
    }

    let status = child.wait().await.map_err(|source| CommandError::Spawn {
        program: program.clone(),
        source,
    })?;
    debug!(program = %program, %status, "process exited");

    Ok(CombinedOutput {
        status,
        output: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(line.clone()).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("error reading process output: {}", e);
                break;
            }
        }
    }
}

/// Runs a command with optional stdin, keeping stdout and stderr apart
///
/// Fails with the trimmed stderr when the command exits non-zero.
pub async fn run_captured(
    mut command: Command,
    stdin: Option<Vec<u8>>,
) -> Result<Output, CommandError> {
    let program = program_name(&command);
    debug!(program = %program, "spawning process");

    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let spawn_error = |source: io::Error| CommandError::Spawn {
        program: program.clone(),
        source,
    };

    let mut child = command.spawn().map_err(spawn_error)?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(&input).await {
                warn!("error writing process stdin: {}", e);
            }
        });
    }

    let output = child.wait_with_output().await.map_err(spawn_error)?;
    if !output.status.success() {
        return Err(CommandError::exit(
            output.status,
            &String::from_utf8_lossy(&output.stderr),
        ));
    }

    Ok(output)
}
