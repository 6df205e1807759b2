use async_trait::async_trait;

use crate::TaskContext;
use crate::manifest::Group;
use crate::task::{Task, TaskResult};
use crate::tools::command;

/// Every script the project owns, tests included.
pub(crate) const SCRIPTS: &[Group] = &[
    Group::ServerJs,
    Group::ClientJs,
    Group::TestsServer,
    Group::TestsClient,
    Group::TestsE2e,
];

/// Runs `jshint` over every project script. `jshint` picks up the nearest
/// `.jshintrc` on its own.
pub struct Jshint;

/// Runs `csslint` over `client.css` with the configured `.csslintrc`.
pub struct Csslint;

#[async_trait]
impl Task for Jshint {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let files = ctx.expand(SCRIPTS)?;
        if files.is_empty() {
            tracing::info!("no scripts to lint");
            return Ok(());
        }

        let mut cmd = command::command(ctx, &ctx.config().tools.jshint);
        cmd.args(files.iter().map(|f| f.as_str()));
        command::run(cmd).await?;

        tracing::info!("{} scripts lint free", files.len());
        Ok(())
    }
}

#[async_trait]
impl Task for Csslint {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let files = ctx.expand(&[Group::ClientCss])?;
        if files.is_empty() {
            tracing::info!("no style sheets to lint");
            return Ok(());
        }

        let mut cmd = command::command(ctx, &ctx.config().tools.csslint);
        let rc = ctx.env.path(&ctx.config().lint.csslintrc);
        if rc.is_file() {
            cmd.arg(format!("--config={rc}"));
        }
        cmd.args(files.iter().map(|f| f.as_str()));
        command::run(cmd).await?;

        tracing::info!("{} style sheets lint free", files.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use camino::Utf8Path;

    use super::*;
    use crate::config::Config;
    use crate::core::{EnvMode, Environment};
    use crate::task::Registry;

    fn context(root: &Utf8Path, jshint: &str, csslint: &str) -> TaskContext {
        let mut config = Config::default();
        config.tools.jshint = jshint.into();
        config.tools.csslint = csslint.into();

        let env = Environment::new(root, config);
        TaskContext::new(EnvMode::Development, Arc::new(env), Arc::new(Registry::new()))
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in ["modules/core/client/css/core.css", "modules/core/client/core.js"] {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_clean_lint_passes() {
        let dir = project();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let ctx = context(root, "true", "true");

        Jshint.run(&ctx).await.unwrap();
        Csslint.run(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_violations_fail_the_task() {
        let dir = project();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let ctx = context(root, "true", "false");

        let err = Csslint.run(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("exited"));
    }

    #[tokio::test]
    async fn test_nothing_to_lint() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        // The tools are never started for empty file sets.
        let ctx = context(root, "false", "false");
        Jshint.run(&ctx).await.unwrap();
        Csslint.run(&ctx).await.unwrap();
    }
}
