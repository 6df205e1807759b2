//! Long-running development processes: the application server and the
//! debugger front end.

use std::process::ExitStatus;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use tokio::process::Child;

use crate::TaskContext;
use crate::config::Config;
use crate::manifest::Group;
use crate::task::{Task, TaskResult};
use crate::tools::command;
use crate::watch::FileWatcher;

/// Server-side files whose changes restart the application.
const SERVER: &[Group] = &[Group::ServerViews, Group::ServerJs, Group::ServerConfig];

/// Supervises `node <nodeArgs> <script>` and restarts it whenever a server
/// file with a watched extension changes. Never completes on its own.
pub struct Nodemon;

/// Runs `node-inspector` with the configured options.
pub struct NodeInspector;

enum Signal {
    Exited(std::io::Result<ExitStatus>),
    Changed(Option<Vec<Utf8PathBuf>>),
}

/// The node flags, with a bare `--debug` bound to the port node-inspector
/// attaches to.
fn node_args(config: &Config) -> Vec<String> {
    config
        .server
        .node_args
        .iter()
        .map(|arg| match arg.as_str() {
            "--debug" => format!("--debug={}", config.inspector.debug_port),
            _ => arg.clone(),
        })
        .collect()
}

fn start(ctx: &TaskContext) -> anyhow::Result<Child> {
    let config = ctx.config();

    let mut cmd = command::command(ctx, &config.tools.node);
    cmd.args(node_args(config)).arg(&config.server.script);

    tracing::info!("starting `{}` ({} mode)", config.server.script, ctx.mode);
    Ok(command::spawn(&mut cmd)?)
}

async fn wait(app: &mut Option<Child>) -> std::io::Result<ExitStatus> {
    match app {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}

fn has_extension(path: &Utf8Path, extensions: &[String]) -> bool {
    path.extension()
        .is_some_and(|ext| extensions.iter().any(|e| e == ext))
}

#[async_trait]
impl Task for Nodemon {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let config = ctx.config();
        let globs = config.assets.union(SERVER);
        let mut watcher = FileWatcher::new(&ctx.env.root, globs)?;

        let mut app = Some(start(ctx)?);

        loop {
            let signal = tokio::select! {
                status = wait(&mut app) => Signal::Exited(status),
                changed = watcher.next() => Signal::Changed(changed),
            };

            match signal {
                Signal::Exited(status) => {
                    app = None;
                    match status {
                        Ok(status) if status.success() => tracing::info!("app exited cleanly"),
                        Ok(status) => tracing::warn!("app crashed ({status})"),
                        Err(e) => tracing::warn!("lost track of the app: {e}"),
                    }
                    tracing::info!("waiting for file changes before starting...");
                }
                Signal::Changed(None) => return Ok(()),
                Signal::Changed(Some(files)) => {
                    let Some(file) = files
                        .iter()
                        .find(|file| has_extension(file, &config.server.ext))
                    else {
                        continue;
                    };

                    tracing::info!("restarting due to changes in {file}");
                    if let Some(mut child) = app.take() {
                        child.kill().await?;
                    }
                    app = Some(start(ctx)?);
                }
            }
        }
    }
}

#[async_trait]
impl Task for NodeInspector {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let config = ctx.config();
        let options = &config.inspector;

        let mut cmd = command::command(ctx, &config.tools.node_inspector);
        cmd.arg(format!("--web-port={}", options.web_port))
            .arg(format!("--web-host={}", options.web_host))
            .arg(format!("--debug-port={}", options.debug_port))
            .arg(format!("--stack-trace-limit={}", options.stack_trace_limit));

        if options.save_live_edit {
            cmd.arg("--save-live-edit");
        }
        if options.no_preload {
            cmd.arg("--no-preload");
        }

        tracing::info!(
            "debugger at http://{}:{}/?port={}",
            options.web_host,
            options.web_port,
            options.debug_port
        );
        command::run(cmd).await?;
        Ok(())
    }
}
