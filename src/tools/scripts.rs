use async_trait::async_trait;

use crate::TaskContext;
use crate::manifest::Group;
use crate::task::{Task, TaskResult};
use crate::tools::command;

/// Concatenates `client.js` in manifest order and writes the minified
/// script bundle.
///
/// Identifiers are never renamed, so AngularJS dependency injection keeps
/// working on functions without explicit annotations.
pub struct Uglify;

#[async_trait]
impl Task for Uglify {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let files = ctx.expand(&[Group::ClientJs])?;
        if files.is_empty() {
            tracing::info!("no client scripts to bundle");
            return Ok(());
        }

        // A file without a trailing semicolon must not run into the next one.
        let source = crate::io::concat(&files, "\n;\n")?;

        let mut cmd = command::command(ctx, &ctx.config().tools.esbuild);
        cmd.args([
            "--loader=js",
            "--minify-whitespace",
            "--minify-syntax",
            "--log-level=warning",
        ]);
        let bundle = command::pipe(cmd, source.into_bytes()).await?;

        let output = &ctx.config().output;
        let output = ctx.env.path(&output.dir).join(&output.script);
        crate::io::write_artifact(&output, &bundle)?;

        tracing::info!("wrote {output} ({} bytes from {} files)", bundle.len(), files.len());
        Ok(())
    }
}
