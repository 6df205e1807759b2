//! Aliases and the plans they resolve to.
//!
//! An alias is a statically authored list of [`Step`]s. Resolving it flattens
//! nested aliases into a linear list of [`Stage`]s, which the runner executes
//! one after another.

mod runner;

use std::fmt::Display;
use std::str::FromStr;

use crate::core::EnvMode;
use crate::task::TaskId;

pub use runner::{Diagnostics, Outcome, Pipeline, TaskExecution};

/// A named pipeline exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alias {
    /// Compile style sheets, then lint CSS and JavaScript.
    Lint,
    /// Lint the project and minify it into two production bundles.
    Build,
    /// Run the server and client test suites.
    Test,
    /// Run the project in development mode.
    Default,
    /// Run the project in development mode with the debugger attached.
    Debug,
    /// Build, then run the project in production mode.
    Prod,
}

/// One element of an alias definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Switch the environment mode for every following step.
    Mode(EnvMode),
    Task(TaskId),
    /// Inline the steps of another alias.
    Alias(Alias),
    /// Tasks started together; the group ends when all of them have.
    Group(&'static [TaskId]),
}

const LINT: &[Step] = &[
    Step::Task(TaskId::Less),
    Step::Task(TaskId::Sass),
    Step::Group(&[TaskId::Csslint, TaskId::Jshint]),
];

const BUILD: &[Step] = &[
    Step::Mode(EnvMode::Development),
    Step::Alias(Alias::Lint),
    Step::Group(&[TaskId::Uglify, TaskId::Cssmin]),
];

const TEST: &[Step] = &[
    Step::Mode(EnvMode::Test),
    Step::Task(TaskId::Mongoose),
    Step::Group(&[TaskId::Karma, TaskId::Mocha]),
];

const DEFAULT: &[Step] = &[
    Step::Mode(EnvMode::Development),
    Step::Alias(Alias::Lint),
    Step::Group(&[TaskId::Nodemon, TaskId::Watch]),
];

const DEBUG: &[Step] = &[
    Step::Mode(EnvMode::Development),
    Step::Alias(Alias::Lint),
    Step::Group(&[TaskId::Nodemon, TaskId::Watch, TaskId::NodeInspector]),
];

const PROD: &[Step] = &[
    Step::Alias(Alias::Build),
    Step::Mode(EnvMode::Production),
    Step::Group(&[TaskId::Nodemon, TaskId::Watch]),
];

impl Alias {
    pub const ALL: [Alias; 6] = [
        Alias::Lint,
        Alias::Build,
        Alias::Test,
        Alias::Default,
        Alias::Debug,
        Alias::Prod,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Alias::Lint => "lint",
            Alias::Build => "build",
            Alias::Test => "test",
            Alias::Default => "default",
            Alias::Debug => "debug",
            Alias::Prod => "prod",
        }
    }

    pub fn steps(self) -> &'static [Step] {
        match self {
            Alias::Lint => LINT,
            Alias::Build => BUILD,
            Alias::Test => TEST,
            Alias::Default => DEFAULT,
            Alias::Debug => DEBUG,
            Alias::Prod => PROD,
        }
    }

    /// Flatten this alias into its execution plan.
    pub fn plan(self) -> Plan {
        let mut stages = Vec::new();
        flatten(self.steps(), &mut stages);
        Plan {
            alias: self,
            stages,
        }
    }
}

fn flatten(steps: &[Step], stages: &mut Vec<Stage>) {
    for step in steps {
        match *step {
            Step::Mode(mode) => stages.push(Stage::Mode(mode)),
            Step::Task(id) => stages.push(Stage::Run(vec![id])),
            Step::Alias(alias) => flatten(alias.steps(), stages),
            Step::Group(ids) => stages.push(Stage::Run(ids.to_vec())),
        }
    }
}

impl Display for Alias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Alias {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Alias::ALL
            .into_iter()
            .find(|alias| alias.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Alias::ALL.iter().map(|a| a.name()).collect();
                format!("unknown alias '{s}', expected one of: {}", names.join(", "))
            })
    }
}

/// A resolved unit of execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Mode(EnvMode),
    /// A single task, or a concurrent group when it holds several.
    Run(Vec<TaskId>),
}

/// The flattened stages of an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub alias: Alias,
    pub stages: Vec<Stage>,
}

impl Plan {
    /// Every task invocation of the plan, in order.
    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.stages
            .iter()
            .flat_map(|stage| match stage {
                Stage::Mode(_) => &[][..],
                Stage::Run(ids) => ids.as_slice(),
            })
            .copied()
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.alias)?;

        for (i, stage) in self.stages.iter().enumerate() {
            let sep = if i == 0 { " " } else { " -> " };
            match stage {
                Stage::Mode(mode) => write!(f, "{sep}env:{mode}")?,
                Stage::Run(ids) if ids.len() == 1 => write!(f, "{sep}{}", ids[0])?,
                Stage::Run(ids) => {
                    let names: Vec<_> = ids.iter().map(|id| id.name()).collect();
                    write!(f, "{sep}[{}]", names.join(" | "))?
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lint_plan() {
        assert_eq!(
            Alias::Lint.plan().stages,
            vec![
                Stage::Run(vec![TaskId::Less]),
                Stage::Run(vec![TaskId::Sass]),
                Stage::Run(vec![TaskId::Csslint, TaskId::Jshint]),
            ]
        );
    }

    #[test]
    fn test_prod_inlines_build_before_mode_switch() {
        let plan = Alias::Prod.plan();
        assert_eq!(
            plan.to_string(),
            "prod: env:development -> less -> sass -> [csslint | jshint] -> \
             [uglify | cssmin] -> env:production -> [nodemon | watch]"
        );
    }

    #[test]
    fn test_mode_steps_come_first() {
        for alias in [Alias::Build, Alias::Test, Alias::Default, Alias::Debug] {
            assert!(matches!(alias.plan().stages[0], Stage::Mode(_)), "{alias}");
        }
    }

    #[test]
    fn test_plan_tasks() {
        let tasks: Vec<_> = Alias::Test.plan().tasks().collect();
        assert_eq!(tasks, vec![TaskId::Mongoose, TaskId::Karma, TaskId::Mocha]);
    }

    #[test]
    fn test_alias_names_parse() {
        for alias in Alias::ALL {
            assert_eq!(alias.name().parse(), Ok(alias));
        }
        assert!("serve".parse::<Alias>().is_err());
    }
}
