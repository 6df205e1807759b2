//! The watch task: re-runs the tasks bound to a group of files when one of
//! them changes, then tells connected browsers to reload.

mod reload;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;

use crate::TaskContext;
use crate::manifest::{AssetManifest, Group};
use crate::task::{Task, TaskId, TaskResult};
use crate::watch::{FileWatcher, resolve_watch_path};

use self::reload::LiveReload;

/// A manifest group and the tasks re-run when any of its files change.
#[derive(Debug)]
pub struct WatchRule {
    pub name: &'static str,
    pub group: Group,
    pub tasks: &'static [TaskId],
}

/// Every rule notifies live reload once its tasks succeed.
pub static RULES: [WatchRule; 7] = [
    WatchRule {
        name: "serverViews",
        group: Group::ServerViews,
        tasks: &[],
    },
    WatchRule {
        name: "serverJS",
        group: Group::ServerJs,
        tasks: &[TaskId::Jshint],
    },
    WatchRule {
        name: "clientViews",
        group: Group::ClientViews,
        tasks: &[],
    },
    WatchRule {
        name: "clientJS",
        group: Group::ClientJs,
        tasks: &[TaskId::Jshint],
    },
    WatchRule {
        name: "clientCSS",
        group: Group::ClientCss,
        tasks: &[TaskId::Csslint],
    },
    WatchRule {
        name: "clientSCSS",
        group: Group::ClientSass,
        tasks: &[TaskId::Sass, TaskId::Csslint],
    },
    WatchRule {
        name: "clientLESS",
        group: Group::ClientLess,
        tasks: &[TaskId::Less, TaskId::Csslint],
    },
];

/// Watches every rule's files and serves the LiveReload protocol. Never
/// completes unless the file watcher stops.
pub struct Watch;

struct Matcher {
    rule: &'static WatchRule,
    patterns: Vec<Pattern>,
}

impl Matcher {
    fn matches(&self, path: &Utf8Path) -> bool {
        self.patterns.iter().any(|p| p.matches(path.as_str()))
    }
}

fn matchers(root: &Utf8Path, assets: &AssetManifest) -> Vec<Matcher> {
    RULES
        .iter()
        .map(|rule| Matcher {
            rule,
            patterns: assets
                .patterns(rule.group)
                .iter()
                .filter_map(|glob| resolve_watch_path(root, glob).ok())
                .map(|(_, pattern)| pattern)
                .collect(),
        })
        .collect()
}

/// Rules with at least one matching changed file, in declaration order.
fn triggered<'a>(
    matchers: &'a [Matcher],
    files: &'a [Utf8PathBuf],
) -> Vec<(&'static WatchRule, Vec<&'a Utf8PathBuf>)> {
    matchers
        .iter()
        .filter_map(|matcher| {
            let matched: Vec<_> = files.iter().filter(|f| matcher.matches(f)).collect();
            (!matched.is_empty()).then_some((matcher.rule, matched))
        })
        .collect()
}

/// Run the tasks of a rule one after another. Returns whether all of them
/// succeeded.
async fn run_rule(ctx: &TaskContext, rule: &WatchRule) -> bool {
    for &id in rule.tasks {
        if let Err(e) = ctx.run_task(id).await {
            tracing::error!("{}: task '{id}' failed:\n{e:#}", rule.name);
            return false;
        }
    }

    true
}

#[async_trait]
impl Task for Watch {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let config = ctx.config();
        let root = ctx.env.root.canonicalize_utf8()?;

        let server = LiveReload::start(config.livereload.port)?;
        tracing::info!("live reload listening on port {}", server.port());

        let groups: Vec<_> = RULES.iter().map(|rule| rule.group).collect();
        let mut watcher = FileWatcher::new(&root, config.assets.union(&groups))?;
        let matchers = matchers(&root, &config.assets);

        while let Some(files) = watcher.next().await {
            for (rule, changed) in triggered(&matchers, &files) {
                tracing::info!("{}: {} files changed", rule.name, changed.len());

                if !run_rule(ctx, rule).await {
                    continue;
                }

                for file in changed {
                    let path = file.strip_prefix(&root).unwrap_or(file);
                    server.reload(path.as_str());
                }
            }
        }

        Ok(())
    }
}
