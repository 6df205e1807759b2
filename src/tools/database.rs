//! Database bootstrap run before the test suites.

use std::sync::Arc;

use async_trait::async_trait;

use crate::TaskContext;
use crate::task::{Task, TaskResult};
use crate::tools::command;

/// Connects to the database and loads the application models.
///
/// The returned future resolves once the connection is established.
#[async_trait]
pub trait Bootstrap: Send + Sync {
    async fn connect(&self, ctx: &TaskContext) -> anyhow::Result<()>;
}

/// Calls the `connect(callback)` export of the project's bootstrap module
/// with `node`, in the context's mode.
pub struct NodeBootstrap;

#[async_trait]
impl Bootstrap for NodeBootstrap {
    async fn connect(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        let module = ctx.env.path(&ctx.config().database.bootstrap);
        if !module.is_file() {
            anyhow::bail!("database bootstrap module '{module}' not found");
        }

        let module = module.canonicalize_utf8()?;
        let script = format!(
            "require({}).connect(function () {{ process.exit(0); }});",
            serde_json::to_string(module.as_str())?
        );

        let mut cmd = command::command(ctx, &ctx.config().tools.node);
        cmd.arg("-e").arg(script);
        command::run(cmd).await?;

        Ok(())
    }
}

/// Task running a [`Bootstrap`].
pub struct Mongoose {
    bootstrap: Arc<dyn Bootstrap>,
}

impl Mongoose {
    pub fn new(bootstrap: impl Bootstrap + 'static) -> Self {
        Self {
            bootstrap: Arc::new(bootstrap),
        }
    }
}

impl Default for Mongoose {
    fn default() -> Self {
        Self::new(NodeBootstrap)
    }
}

#[async_trait]
impl Task for Mongoose {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        tracing::info!("connecting to the database ({} mode)", ctx.mode);
        self.bootstrap.connect(ctx).await?;
        tracing::info!("database connected, models loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use camino::Utf8Path;

    use super::*;
    use crate::config::Config;
    use crate::core::{EnvMode, Environment};
    use crate::task::Registry;

    struct Recording(Arc<Mutex<Vec<EnvMode>>>);

    #[async_trait]
    impl Bootstrap for Recording {
        async fn connect(&self, ctx: &TaskContext) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(ctx.mode);
            Ok(())
        }
    }

    fn context(root: &Utf8Path, mode: EnvMode) -> TaskContext {
        let env = Environment::new(root, Config::default());
        TaskContext::new(mode, Arc::new(env), Arc::new(Registry::new()))
    }

    #[tokio::test]
    async fn test_mongoose_uses_bootstrap() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = Mongoose::new(Recording(seen.clone()));

        task.run(&context(Utf8Path::new("."), EnvMode::Test))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![EnvMode::Test]);
    }

    #[tokio::test]
    async fn test_node_bootstrap_requires_module() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let err = Mongoose::default()
            .run(&context(root, EnvMode::Test))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("config/lib/mongoose.js"));
    }
}
