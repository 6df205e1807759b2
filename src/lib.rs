#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod blueprint;
mod config;
mod core;
mod engine;
mod error;
mod io;
pub mod live;
mod manifest;
pub mod task;
pub mod tools;
mod utils;
mod watch;

pub use crate::blueprint::Blueprint;
pub use crate::config::{
    AppInfo, CONFIG_FILE, Config, DatabaseOptions, InspectorOptions, LintOptions,
    LiveReloadOptions, OutputOptions, ServerOptions, Settings, TestOptions, ToolPaths,
};
pub use crate::core::{EnvMode, Environment, TaskContext};
pub use crate::engine::{
    Alias, Diagnostics, Outcome, Pipeline, Plan, Stage, Step, TaskExecution,
};
pub use crate::error::*;
pub use crate::manifest::{AssetManifest, ClientAssets, Group, ServerAssets, TestAssets};
pub use crate::task::{Task, TaskId, TaskKind};
