mod diagnostics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{Instrument, Level};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::{EnvMode, Environment, TaskContext};
use crate::engine::{Alias, Plan, Stage};
use crate::error::PipelineError;
use crate::task::{Registry, TaskId, TaskKind};

pub use diagnostics::{Diagnostics, Outcome, TaskExecution};

/// A registry bound to an environment, ready to run aliases.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub(crate) registry: Arc<Registry>,
    pub(crate) env: Arc<Environment>,
}

impl Pipeline {
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Resolve the plan of an alias and check that every task in it has a
    /// handler.
    pub fn validate(&self, alias: Alias) -> Result<Plan, PipelineError> {
        let plan = alias.plan();

        if let Some(task) = plan.tasks().find(|&id| !self.registry.contains(id)) {
            return Err(PipelineError::Undefined { task, alias });
        }

        Ok(plan)
    }

    /// Validate every alias.
    pub fn check(&self) -> Result<Vec<Plan>, PipelineError> {
        Alias::ALL.into_iter().map(|alias| self.validate(alias)).collect()
    }

    /// Run an alias to completion.
    ///
    /// Stages run strictly in order. The tasks of a group are polled
    /// concurrently and the next stage starts only once all of them have
    /// finished. The first failure ends the run: members of the same group
    /// that are still running are dropped, and nothing after the failing
    /// stage is started.
    pub async fn run(&self, alias: Alias) -> Result<Diagnostics, PipelineError> {
        let plan = self.validate(alias)?;

        let span = tracing::span!(Level::INFO, "pipeline", alias = %alias);
        span.pb_set_length(plan.tasks().count() as u64);
        if let Ok(style) = crate::utils::get_style_pipeline() {
            span.pb_set_style(&style);
        }
        span.pb_set_message(&format!("Running {alias}"));

        self.run_plan(&plan).instrument(span).await
    }

    /// Run a single task under the environment's initial mode.
    pub async fn run_task(&self, id: TaskId) -> Result<Diagnostics, PipelineError> {
        if !self.registry.contains(id) {
            return Err(PipelineError::Unregistered(id));
        }

        let mut diagnostics = Diagnostics::new();
        let ctx = self.context(self.env.mode);
        self.invoke(&ctx, id, &mut diagnostics).await?;
        Ok(diagnostics)
    }

    async fn run_plan(&self, plan: &Plan) -> Result<Diagnostics, PipelineError> {
        let mut diagnostics = Diagnostics::new();
        let mut mode = self.env.mode;

        for stage in &plan.stages {
            match stage {
                Stage::Mode(next) => {
                    tracing::info!("environment set to {next}");
                    mode = *next;
                }
                Stage::Run(ids) => {
                    let ctx = self.context(mode);
                    let settled = self.run_group(&ctx, ids).await;

                    for (&id, result) in ids.iter().zip(settled) {
                        if let Some(result) = result {
                            diagnostics.record(id, result?);
                        }
                    }
                }
            }
        }

        tracing::info!("{} finished {}", plan.alias, diagnostics.summary());
        Ok(diagnostics)
    }

    /// Run the members of a group concurrently. A fatal failure is settled
    /// (and logged) as soon as it happens, and stops the members that are
    /// still pending; those yield `None`.
    async fn run_group(
        &self,
        ctx: &TaskContext,
        ids: &[TaskId],
    ) -> Vec<Option<Result<TaskExecution, PipelineError>>> {
        let (halt, halted) = watch::channel(false);
        let halt = &halt;

        let members = ids.iter().map(|&id| {
            let mut halted = halted.clone();
            async move {
                let member = async {
                    let settled = self.settle(id, self.execute(ctx, id).await);
                    if settled.is_err() {
                        halt.send_replace(true);
                    }
                    settled
                };

                tokio::select! {
                    biased;
                    settled = member => Some(settled),
                    _ = halted.wait_for(|&stop| stop) => {
                        tracing::warn!("stopping {id}, a sibling task failed");
                        None
                    }
                }
            }
        });

        join_all(members).await
    }

    async fn invoke(
        &self,
        ctx: &TaskContext,
        id: TaskId,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), PipelineError> {
        let result = self.execute(ctx, id).await;
        diagnostics.record(id, self.settle(id, result)?);
        Ok(())
    }

    /// Run one task inside its own span, timing it.
    async fn execute(
        &self,
        ctx: &TaskContext,
        id: TaskId,
    ) -> (TaskExecution, anyhow::Result<()>) {
        let span = tracing::span!(Level::INFO, "task", name = %id);
        if let Ok(style) = crate::utils::get_style_task() {
            span.pb_set_style(&style);
        }
        span.pb_set_message(&format!("Running {id}"));

        let start = Instant::now();
        let result = match self.registry.get(id) {
            Some(task) => task.run(ctx).instrument(span).await,
            None => Err(PipelineError::Unregistered(id).into()),
        };

        let execution = TaskExecution {
            start,
            duration: start.elapsed(),
            outcome: Outcome::Ok,
        };

        tracing::Span::current().pb_inc(1);
        (execution, result)
    }

    /// Decide whether a finished task lets the pipeline continue.
    fn settle(
        &self,
        id: TaskId,
        (mut execution, result): (TaskExecution, anyhow::Result<()>),
    ) -> Result<TaskExecution, PipelineError> {
        match result {
            Ok(()) => {
                tracing::info!("finished {id} {}", format_duration(execution.duration));
                Ok(execution)
            }
            Err(err) if self.env.force && id.kind() == TaskKind::Lint => {
                tracing::warn!("{id} reported problems, continuing (forced): {err:#}");
                execution.outcome = Outcome::Tolerated;
                Ok(execution)
            }
            Err(source) => {
                let elapsed = format_duration(execution.duration);
                tracing::error!("{id} failed after {elapsed}: {source:#}");
                Err(PipelineError::Task { task: id, source })
            }
        }
    }

    fn context(&self, mode: EnvMode) -> TaskContext {
        TaskContext::new(mode, self.env.clone(), self.registry.clone())
    }
}

fn format_duration(duration: Duration) -> String {
    format!("(+{}ms)", duration.as_millis())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::Barrier;

    use super::*;
    use crate::Blueprint;
    use crate::config::Config;
    use crate::manifest::Group;
    use crate::task;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, label: &'static str) -> impl crate::task::Task + 'static {
        let log = log.clone();
        task::from_fn(move |ctx| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("{label}@{}", ctx.mode));
                Ok(())
            }
        })
    }

    fn failing(log: &Log, label: &'static str) -> impl crate::task::Task + 'static {
        let log = log.clone();
        task::from_fn(move |_| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(label.to_string());
                anyhow::bail!("{label} failed")
            }
        })
    }

    fn stubbed(log: &Log) -> Blueprint {
        let mut blueprint = Blueprint::new();
        for id in TaskId::ALL {
            blueprint.register(id, recorder(log, id.name()));
        }
        blueprint
    }

    fn pipeline(blueprint: Blueprint) -> Pipeline {
        blueprint.finish(Environment::new(".", Config::default()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_aliases_run_in_declared_order() {
        for alias in Alias::ALL {
            let log = Log::default();
            pipeline(stubbed(&log)).run(alias).await.unwrap();

            let names: Vec<_> = entries(&log)
                .into_iter()
                .map(|entry| entry.split('@').next().unwrap().to_string())
                .collect();
            let expected: Vec<_> = alias.plan().tasks().map(|id| id.to_string()).collect();

            assert_eq!(names, expected, "{alias}");
        }
    }

    #[tokio::test]
    async fn test_mode_is_visible_to_later_steps() {
        let log = Log::default();
        let env = Environment::new(".", Config::default()).with_mode(EnvMode::Production);
        stubbed(&log).finish(env).run(Alias::Test).await.unwrap();

        assert_eq!(
            entries(&log),
            vec!["mongoose@test", "karma@test", "mocha@test"]
        );
    }

    #[tokio::test]
    async fn test_prod_switches_mode_after_build() {
        let log = Log::default();
        pipeline(stubbed(&log)).run(Alias::Prod).await.unwrap();

        assert_eq!(
            entries(&log),
            vec![
                "less@development",
                "sass@development",
                "csslint@development",
                "jshint@development",
                "uglify@development",
                "cssmin@development",
                "nodemon@production",
                "watch@production",
            ]
        );
    }

    #[tokio::test]
    async fn test_lint_without_mode_step_uses_initial_mode() {
        let log = Log::default();
        let env = Environment::new(".", Config::default()).with_mode(EnvMode::Test);
        stubbed(&log).finish(env).run(Alias::Lint).await.unwrap();

        assert!(entries(&log).iter().all(|entry| entry.ends_with("@test")));
    }

    #[tokio::test]
    async fn test_failure_halts_pipeline() {
        let log = Log::default();
        let mut blueprint = stubbed(&log);
        blueprint.register(TaskId::Mongoose, failing(&log, "mongoose"));

        let err = pipeline(blueprint).run(Alias::Test).await.unwrap_err();

        assert!(matches!(err, PipelineError::Task { task: TaskId::Mongoose, .. }));
        assert_eq!(entries(&log), vec!["mongoose"]);
    }

    #[tokio::test]
    async fn test_group_failure_halts_after_started_members() {
        let log = Log::default();
        let mut blueprint = stubbed(&log);
        blueprint.register(TaskId::Csslint, failing(&log, "csslint"));

        let err = pipeline(blueprint).run(Alias::Build).await.unwrap_err();

        assert!(matches!(err, PipelineError::Task { task: TaskId::Csslint, .. }));
        assert_eq!(
            entries(&log),
            vec![
                "less@development",
                "sass@development",
                "csslint",
                "jshint@development",
            ]
        );
    }

    #[tokio::test]
    async fn test_group_failure_surfaces_while_sibling_runs() {
        let log = Log::default();
        let mut blueprint = stubbed(&log);

        let server_log = log.clone();
        blueprint.register(
            TaskId::Nodemon,
            task::from_fn(move |_| {
                let log = server_log.clone();
                async move {
                    log.lock().unwrap().push("nodemon:start".into());
                    std::future::pending::<()>().await;
                    log.lock().unwrap().push("nodemon:end".into());
                    Ok(())
                }
            }),
        );
        blueprint.register(TaskId::Watch, failing(&log, "watch"));

        let pipeline = pipeline(blueprint);
        let err = tokio::time::timeout(Duration::from_secs(5), pipeline.run(Alias::Default))
            .await
            .expect("failure was not surfaced while nodemon was running")
            .unwrap_err();

        assert!(matches!(err, PipelineError::Task { task: TaskId::Watch, .. }));
        let log = entries(&log);
        assert!(log.contains(&"nodemon:start".to_string()), "{log:?}");
        assert!(!log.contains(&"nodemon:end".to_string()), "{log:?}");
        assert_eq!(log.last().map(String::as_str), Some("watch"));
    }

    #[tokio::test]
    async fn test_redefinition_uses_last_registration() {
        let log = Log::default();
        let mut blueprint = stubbed(&log);
        blueprint.register(TaskId::Less, failing(&log, "less-first"));
        blueprint.register(TaskId::Less, recorder(&log, "less-second"));

        pipeline(blueprint).run(Alias::Lint).await.unwrap();

        let log = entries(&log);
        assert_eq!(log[0], "less-second@development");
        assert!(!log.iter().any(|entry| entry.starts_with("less-first")));
    }

    #[tokio::test]
    async fn test_group_members_run_concurrently() {
        let log = Log::default();
        let barrier = Arc::new(Barrier::new(2));
        let mut blueprint = stubbed(&log);

        for id in [TaskId::Karma, TaskId::Mocha] {
            let log = log.clone();
            let barrier = barrier.clone();
            blueprint.register(
                id,
                task::from_fn(move |_| {
                    let log = log.clone();
                    let barrier = barrier.clone();
                    async move {
                        log.lock().unwrap().push(format!("{id}:start"));
                        // Only passes once both members of the group have started.
                        barrier.wait().await;
                        tokio::task::yield_now().await;
                        log.lock().unwrap().push(format!("{id}:end"));
                        Ok(())
                    }
                }),
            );
        }

        let pipeline = pipeline(blueprint);
        tokio::time::timeout(Duration::from_secs(5), pipeline.run(Alias::Test))
            .await
            .expect("group members were not run concurrently")
            .unwrap();

        let log = entries(&log);
        assert_eq!(log[0], "mongoose@test");
        assert_eq!(log[1], "karma:start");
        assert_eq!(log[2], "mocha:start");
        assert_eq!(log.len(), 5);
    }

    #[tokio::test]
    async fn test_next_stage_waits_for_whole_group() {
        let log = Log::default();
        let mut blueprint = stubbed(&log);

        let slow_log = log.clone();
        blueprint.register(
            TaskId::Jshint,
            task::from_fn(move |_| {
                let log = slow_log.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    log.lock().unwrap().push("jshint:done".into());
                    Ok(())
                }
            }),
        );

        pipeline(blueprint).run(Alias::Build).await.unwrap();

        let log = entries(&log);
        let done = log.iter().position(|e| e == "jshint:done").unwrap();
        let uglify = log.iter().position(|e| e.starts_with("uglify")).unwrap();
        assert!(done < uglify, "{log:?}");
    }

    #[tokio::test]
    async fn test_undefined_task_fails_before_any_step() {
        let log = Log::default();
        let mut blueprint = Blueprint::new();
        blueprint.register(TaskId::Less, recorder(&log, "less"));
        blueprint.register(TaskId::Sass, recorder(&log, "sass"));
        blueprint.register(TaskId::Csslint, recorder(&log, "csslint"));

        let err = pipeline(blueprint).run(Alias::Lint).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Undefined {
                task: TaskId::Jshint,
                alias: Alias::Lint
            }
        ));
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_force_tolerates_lint_failures_only() {
        let log = Log::default();
        let mut blueprint = stubbed(&log);
        blueprint.register(TaskId::Jshint, failing(&log, "jshint"));
        let env = Environment::new(".", Config::default()).with_force(true);

        let diagnostics = blueprint.finish(env.clone()).run(Alias::Lint).await.unwrap();
        assert_eq!(diagnostics.tolerated(), vec![TaskId::Jshint]);

        let mut blueprint = stubbed(&log);
        blueprint.register(TaskId::Sass, failing(&log, "sass"));
        let err = blueprint.finish(env).run(Alias::Lint).await.unwrap_err();
        assert!(matches!(err, PipelineError::Task { task: TaskId::Sass, .. }));
    }

    #[tokio::test]
    async fn test_check_reports_missing_handlers() {
        let log = Log::default();
        assert_eq!(pipeline(stubbed(&log)).check().unwrap().len(), 6);
        assert!(pipeline(Blueprint::new()).check().is_err());
    }

    #[tokio::test]
    async fn test_run_single_task() {
        let log = Log::default();
        let env = Environment::new(".", Config::default()).with_mode(EnvMode::Test);
        let diagnostics = stubbed(&log)
            .finish(env)
            .run_task(TaskId::Protractor)
            .await
            .unwrap();

        assert_eq!(entries(&log), vec!["protractor@test"]);
        assert_eq!(diagnostics.executions.len(), 1);
    }

    fn compiler(output: &'static str) -> impl crate::task::Task + 'static {
        task::from_fn(move |ctx| async move {
            crate::io::write_artifact(&ctx.env.path(output), ".compiled {}")?;
            Ok(())
        })
    }

    fn counter(
        log: &Log,
        label: &'static str,
        groups: &'static [Group],
    ) -> impl crate::task::Task + 'static {
        let log = log.clone();
        task::from_fn(move |ctx| {
            let log = log.clone();
            async move {
                let files = ctx.expand(groups)?;
                log.lock().unwrap().push(format!("{label}:{}", files.len()));
                Ok(())
            }
        })
    }

    fn lint_project() -> (tempfile::TempDir, Blueprint, Log) {
        let dir = tempfile::tempdir().unwrap();
        for file in [
            "modules/core/client/less/theme.less",
            "modules/core/client/scss/layout.scss",
            "modules/core/client/css/core.css",
            "modules/core/client/core.client.module.js",
            "modules/core/server/routes/core.server.routes.js",
        ] {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }

        let log = Log::default();
        let mut blueprint = Blueprint::new();
        blueprint
            .register(TaskId::Less, compiler("modules/core/client/css/theme.css"))
            .register(TaskId::Sass, compiler("modules/core/client/css/layout.css"))
            .register(TaskId::Csslint, counter(&log, "csslint", &[Group::ClientCss]))
            .register(TaskId::Jshint, counter(&log, "jshint", &[Group::ServerJs, Group::ClientJs]));

        (dir, blueprint, log)
    }

    #[tokio::test]
    async fn test_lint_checks_compiled_styles() {
        let (dir, blueprint, log) = lint_project();
        let root = camino::Utf8Path::from_path(dir.path()).unwrap();

        let diagnostics = blueprint
            .finish(Environment::new(root, Config::default()))
            .run(Alias::Lint)
            .await
            .unwrap();

        let mut checks = entries(&log);
        checks.sort();
        assert_eq!(checks, vec!["csslint:3", "jshint:2"]);
        assert_eq!(diagnostics.executions.len(), 4);
    }

    #[tokio::test]
    async fn test_lint_fails_when_a_check_fails() {
        let (dir, mut blueprint, log) = lint_project();
        let root = camino::Utf8Path::from_path(dir.path()).unwrap();
        blueprint.register(TaskId::Jshint, failing(&log, "jshint"));

        let err = blueprint
            .finish(Environment::new(root, Config::default()))
            .run(Alias::Lint)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Task { task: TaskId::Jshint, .. }));
        assert!(entries(&log).contains(&"csslint:3".to_string()));
    }
}
