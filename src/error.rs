use camino::Utf8PathBuf;
use thiserror::Error;

use crate::engine::Alias;
use crate::task::TaskId;

#[derive(Debug, Error)]
pub enum SagyouError {
    #[error("Failed to build runtime")]
    RuntimeBuild(#[from] std::io::Error),

    #[error("Error while loading configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[error("Error while running the pipeline:\n{0}")]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't parse '{path}'.\n{source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {0}: {1}")]
    Override(&'static str, String),
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Task '{task}' is used by alias '{alias}' but has no registered handler")]
    Undefined { task: TaskId, alias: Alias },

    #[error("Task '{0}' has no registered handler")]
    Unregistered(TaskId),

    #[error("Task '{task}':\n{source}")]
    Task {
        task: TaskId,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error("Path is not valid UTF-8: {0}")]
    PathFormat(#[from] camino::FromPathBufError),
}
