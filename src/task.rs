use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::TaskContext;

/// Result from a single executed task.
pub type TaskResult = anyhow::Result<()>;

/// Identifier of every task the pipelines know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    Sass,
    Less,
    Jshint,
    Csslint,
    Uglify,
    Cssmin,
    Mongoose,
    Mocha,
    Karma,
    Protractor,
    WebdriverUpdate,
    Nodemon,
    Watch,
    NodeInspector,
}

/// What a task does, which decides how its failures are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Style and code checks; failures can be tolerated with `--force`.
    Lint,
    Compile,
    Bundle,
    Bootstrap,
    Test,
    /// Long-running processes that only finish with the run.
    Serve,
}

impl TaskId {
    pub const ALL: [TaskId; 14] = [
        TaskId::Sass,
        TaskId::Less,
        TaskId::Jshint,
        TaskId::Csslint,
        TaskId::Uglify,
        TaskId::Cssmin,
        TaskId::Mongoose,
        TaskId::Mocha,
        TaskId::Karma,
        TaskId::Protractor,
        TaskId::WebdriverUpdate,
        TaskId::Nodemon,
        TaskId::Watch,
        TaskId::NodeInspector,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskId::Sass => "sass",
            TaskId::Less => "less",
            TaskId::Jshint => "jshint",
            TaskId::Csslint => "csslint",
            TaskId::Uglify => "uglify",
            TaskId::Cssmin => "cssmin",
            TaskId::Mongoose => "mongoose",
            TaskId::Mocha => "mocha",
            TaskId::Karma => "karma",
            TaskId::Protractor => "protractor",
            TaskId::WebdriverUpdate => "webdriver-update",
            TaskId::Nodemon => "nodemon",
            TaskId::Watch => "watch",
            TaskId::NodeInspector => "node-inspector",
        }
    }

    pub fn kind(self) -> TaskKind {
        match self {
            TaskId::Jshint | TaskId::Csslint => TaskKind::Lint,
            TaskId::Sass | TaskId::Less => TaskKind::Compile,
            TaskId::Uglify | TaskId::Cssmin => TaskKind::Bundle,
            TaskId::Mongoose | TaskId::WebdriverUpdate => TaskKind::Bootstrap,
            TaskId::Mocha | TaskId::Karma | TaskId::Protractor => TaskKind::Test,
            TaskId::Nodemon | TaskId::Watch | TaskId::NodeInspector => TaskKind::Serve,
        }
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskId::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = TaskId::ALL.iter().map(|id| id.name()).collect();
                format!("unknown task '{s}', expected one of: {}", names.join(", "))
            })
    }
}

/// A unit of work in a pipeline.
///
/// A task completes when its future resolves. Long-running tasks such as the
/// development server only resolve when they fail or the process shuts down.
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, ctx: &TaskContext) -> TaskResult;
}

/// Wraps a closure returning a future, so it can be registered as a [`Task`].
pub struct FnTask<F>(F);

/// Create a task from a closure taking an owned [`TaskContext`].
///
/// ```rust,no_run
/// # use sagyou::{Blueprint, TaskId, task};
/// let mut blueprint = Blueprint::new();
/// blueprint.register(TaskId::Jshint, task::from_fn(|ctx| async move {
///     println!("linting in {} mode", ctx.mode);
///     Ok(())
/// }));
/// ```
pub fn from_fn<F, Fut>(func: F) -> FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = TaskResult> + Send,
{
    FnTask(func)
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = TaskResult> + Send,
{
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        (self.0)(ctx.clone()).await
    }
}

/// Handlers keyed by task identifier.
#[derive(Default, Clone)]
pub struct Registry {
    tasks: HashMap<TaskId, Arc<dyn Task>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. An existing handler for the same id is replaced
    /// and returned.
    pub fn register(&mut self, id: TaskId, task: Arc<dyn Task>) -> Option<Arc<dyn Task>> {
        let previous = self.tasks.insert(id, task);
        if previous.is_some() {
            tracing::debug!(task = %id, "task redefined");
        }
        previous
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<dyn Task>> {
        self.tasks.get(&id).cloned()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.tasks.keys().collect();
        ids.sort();
        f.debug_set().entries(ids).finish()
    }
}
