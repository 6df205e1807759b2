use std::sync::Arc;

use crate::core::Environment;
use crate::engine::Pipeline;
use crate::task::{Registry, Task, TaskId};
use crate::tools;

/// The set of task handlers a [`Pipeline`] is built from.
///
/// Handlers are keyed by [`TaskId`]. Registering an id twice silently replaces
/// the first handler, so a project can start from the built-in tasks and
/// swap out the ones it needs to.
///
/// # Example
///
/// ```rust,no_run
/// use sagyou::{Alias, Blueprint, Config, Environment, TaskId, task};
///
/// let mut blueprint = Blueprint::with_builtin_tasks();
/// blueprint.register(TaskId::Karma, task::from_fn(|_| async { Ok(()) }));
///
/// let pipeline = blueprint.finish(Environment::new(".", Config::default()));
/// let plan = pipeline.validate(Alias::Test).unwrap();
/// println!("{plan}");
/// ```
#[derive(Debug, Default)]
pub struct Blueprint {
    registry: Registry,
}

impl Blueprint {
    /// Creates a blueprint with no tasks registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a blueprint with a handler for every [`TaskId`].
    pub fn with_builtin_tasks() -> Self {
        let mut blueprint = Self::new();
        tools::register_builtin(&mut blueprint);
        blueprint
    }

    pub fn register(&mut self, id: TaskId, task: impl Task + 'static) -> &mut Self {
        self.registry.register(id, Arc::new(task));
        self
    }

    pub fn finish(self, env: Environment) -> Pipeline {
        Pipeline {
            registry: Arc::new(self.registry),
            env: Arc::new(env),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_builtin_tasks_cover_every_alias() {
        let env = Environment::new(".", Config::default());
        let pipeline = Blueprint::with_builtin_tasks().finish(env);
        assert!(pipeline.check().is_ok());

        for id in TaskId::ALL {
            assert!(pipeline.registry.contains(id), "{id}");
        }
    }
}
