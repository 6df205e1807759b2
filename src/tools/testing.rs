use async_trait::async_trait;
use tokio::process::Command;

use crate::TaskContext;
use crate::error::ManifestError;
use crate::manifest::Group;
use crate::task::{Task, TaskResult};
use crate::tools::command;

/// Server-side tests with `mocha`.
pub struct Mocha;

/// Client-side tests with a single `karma` run.
pub struct Karma;

/// End-to-end tests with `protractor`.
pub struct Protractor;

/// Updates the Selenium standalone server and browser drivers.
pub struct WebdriverUpdate;

/// `mocha --reporter <reporter> <files>`, or nothing when there are no
/// server tests.
fn mocha(ctx: &TaskContext) -> Result<Option<Command>, ManifestError> {
    let files = ctx.expand(&[Group::TestsServer])?;
    if files.is_empty() {
        return Ok(None);
    }

    let mut cmd = command::command(ctx, &ctx.config().tools.mocha);
    cmd.arg("--reporter")
        .arg(&ctx.config().testing.mocha_reporter)
        .args(files.iter().map(|f| f.as_str()));

    Ok(Some(cmd))
}

fn karma(ctx: &TaskContext) -> Command {
    let mut cmd = command::command(ctx, &ctx.config().tools.karma);
    cmd.arg("start")
        .arg(ctx.config().testing.karma_config.as_str())
        .arg("--single-run");
    cmd
}

fn protractor(ctx: &TaskContext) -> Command {
    let mut cmd = command::command(ctx, &ctx.config().tools.protractor);
    cmd.arg(ctx.config().testing.protractor_config.as_str());
    cmd
}

fn webdriver_update(ctx: &TaskContext) -> Command {
    let mut cmd = command::command(ctx, &ctx.config().tools.webdriver_manager);
    cmd.arg("update");
    cmd
}

#[async_trait]
impl Task for Mocha {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let Some(cmd) = mocha(ctx)? else {
            tracing::info!("no server tests found");
            return Ok(());
        };

        command::run(cmd).await?;
        Ok(())
    }
}

#[async_trait]
impl Task for Karma {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        command::run(karma(ctx)).await?;
        Ok(())
    }
}

#[async_trait]
impl Task for Protractor {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        command::run(protractor(ctx)).await?;
        Ok(())
    }
}

#[async_trait]
impl Task for WebdriverUpdate {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        command::run(webdriver_update(ctx)).await?;
        Ok(())
    }
}
