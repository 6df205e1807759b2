use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{ManifestError, PipelineError};
use crate::manifest::Group;
use crate::task::{Registry, TaskId};

/// A 32-byte BLAKE3 hash of file contents.
///
/// The watcher uses it to drop change events for files whose bytes did not
/// actually change, e.g. an editor saving an untouched buffer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    #[cfg(test)]
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub(crate) fn hash_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        Ok(blake3::Hasher::new().update_mmap(path)?.finalize().into())
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32(")?;
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "…)")
    }
}

/// The environment mode a pipeline step runs under.
///
/// Downstream tools read it through the `NODE_ENV` variable of the processes
/// spawned for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvMode {
    Test,
    #[default]
    Development,
    Production,
}

impl EnvMode {
    pub const ALL: [EnvMode; 3] = [EnvMode::Test, EnvMode::Development, EnvMode::Production];

    pub fn as_str(self) -> &'static str {
        match self {
            EnvMode::Test => "test",
            EnvMode::Development => "development",
            EnvMode::Production => "production",
        }
    }

    /// Reads the mode from a `NODE_ENV` value, falling back to development
    /// when it is unset or unknown.
    pub fn from_node_env(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl Display for EnvMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(EnvMode::Test),
            "dev" | "development" => Ok(EnvMode::Development),
            "prod" | "production" => Ok(EnvMode::Production),
            other => Err(format!(
                "unknown mode '{other}', expected one of: test, development, production"
            )),
        }
    }
}

/// Everything a pipeline run is configured with.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Project root; globs and relative paths are resolved against it.
    pub root: Utf8PathBuf,
    /// Resolved configuration.
    pub config: Config,
    /// Mode in effect before the first mode step of an alias.
    pub mode: EnvMode,
    /// Report lint violations without aborting the pipeline.
    pub force: bool,
}

impl Environment {
    pub fn new(root: impl Into<Utf8PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
            mode: EnvMode::default(),
            force: false,
        }
    }

    pub fn with_mode(mut self, mode: EnvMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Resolve a path relative to the project root.
    pub fn path(&self, path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        self.root.join(path)
    }
}

/// The context passed to every task invocation.
///
/// It carries the mode set by the most recent mode step of the running
/// alias, so a task never has to consult process-wide state.
#[derive(Clone)]
pub struct TaskContext {
    /// The environment mode this invocation runs under.
    pub mode: EnvMode,
    /// Shared configuration of the run.
    pub env: Arc<Environment>,
    pub(crate) registry: Arc<Registry>,
}

impl TaskContext {
    pub(crate) fn new(mode: EnvMode, env: Arc<Environment>, registry: Arc<Registry>) -> Self {
        Self {
            mode,
            env,
            registry,
        }
    }

    pub fn config(&self) -> &Config {
        &self.env.config
    }

    /// Expand manifest groups into existing files under the project root.
    pub fn expand(&self, groups: &[Group]) -> Result<Vec<Utf8PathBuf>, ManifestError> {
        self.env.config.assets.expand(&self.env.root, groups)
    }

    /// Run another registered task with this context.
    pub async fn run_task(&self, id: TaskId) -> anyhow::Result<()> {
        let task = self
            .registry
            .get(id)
            .ok_or(PipelineError::Unregistered(id))?;

        task.run(self).await
    }
}
