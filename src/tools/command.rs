//! Spawning the external programs most tasks delegate to.

use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};

use camino::Utf8Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use crate::TaskContext;

/// Errors that can occur when running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started at all.
    #[error("Couldn't start `{program}`, is it installed?\n{source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and returned a non-zero exit code.
    #[error("`{program}` exited with {status}")]
    Failed { program: String, status: ExitStatus },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Prepare a command for `program`, running in the project root with the
/// context's mode exported as `NODE_ENV` and the configured `PORT`.
///
/// `node_modules/.bin` of the project, when present, is searched before the
/// inherited `PATH`.
pub(crate) fn command(ctx: &TaskContext, program: &str) -> Command {
    let env = &ctx.env;

    let mut cmd = Command::new(program);
    cmd.current_dir(&env.root)
        .env("NODE_ENV", ctx.mode.as_str())
        .env("PORT", env.config.settings.port.to_string())
        .kill_on_drop(true);

    if let Some(path) = search_path(&env.root) {
        cmd.env("PATH", path);
    }

    cmd
}

fn search_path(root: &Utf8Path) -> Option<OsString> {
    let bin = root.join("node_modules/.bin").canonicalize_utf8().ok()?;
    let current = std::env::var_os("PATH").unwrap_or_default();

    let paths = std::iter::once(bin.into_std_path_buf()).chain(std::env::split_paths(&current));
    std::env::join_paths(paths).ok()
}

fn program_of(cmd: &Command) -> String {
    cmd.as_std().get_program().to_string_lossy().into_owned()
}

/// Start a command without waiting for it.
pub(crate) fn spawn(cmd: &mut Command) -> Result<Child, ToolError> {
    tracing::debug!(command = ?cmd.as_std(), "spawning");
    cmd.spawn().map_err(|source| ToolError::Spawn {
        program: program_of(cmd),
        source,
    })
}

/// Run a command to completion with inherited output.
pub(crate) async fn run(mut cmd: Command) -> Result<(), ToolError> {
    let program = program_of(&cmd);
    tracing::debug!(command = ?cmd.as_std(), "spawning");

    let status = cmd
        .status()
        .await
        .map_err(|source| ToolError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !status.success() {
        return Err(ToolError::Failed { program, status });
    }

    Ok(())
}

/// Run a command feeding `input` to its stdin and collecting its stdout.
pub(crate) async fn pipe(mut cmd: Command, input: Vec<u8>) -> Result<Vec<u8>, ToolError> {
    let program = program_of(&cmd);
    tracing::debug!(command = ?cmd.as_std(), "spawning");

    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| ToolError::Spawn {
            program: program.clone(),
            source,
        })?;

    let mut stdin = child.stdin.take();
    let feed = async move {
        if let Some(stdin) = stdin.as_mut() {
            stdin.write_all(&input).await?;
            stdin.shutdown().await?;
        }
        drop(stdin);
        Ok::<_, std::io::Error>(())
    };

    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            program,
            status: output.status,
        });
    }

    fed?;
    Ok(output.stdout)
}
