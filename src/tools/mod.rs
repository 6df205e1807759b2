//! Built-in task handlers.
//!
//! Most of them declare a set of files from the asset manifest and hand them
//! to an external tool; style compilation and minification run in-process.

pub(crate) mod command;
mod database;
mod lint;
mod scripts;
mod serve;
mod styles;
mod testing;

pub use command::ToolError;
pub use database::{Bootstrap, Mongoose, NodeBootstrap};
pub use lint::{Csslint, Jshint};
pub use scripts::Uglify;
pub use serve::{NodeInspector, Nodemon};
pub use styles::{Cssmin, Less, Sass, StyleError};
pub use testing::{Karma, Mocha, Protractor, WebdriverUpdate};

use crate::Blueprint;
use crate::live::Watch;
use crate::task::TaskId;

/// Register a handler for every [`TaskId`].
pub(crate) fn register_builtin(blueprint: &mut Blueprint) {
    blueprint
        .register(TaskId::Sass, Sass)
        .register(TaskId::Less, Less)
        .register(TaskId::Jshint, Jshint)
        .register(TaskId::Csslint, Csslint)
        .register(TaskId::Uglify, Uglify)
        .register(TaskId::Cssmin, Cssmin)
        .register(TaskId::Mongoose, Mongoose::default())
        .register(TaskId::Mocha, Mocha)
        .register(TaskId::Karma, Karma)
        .register(TaskId::Protractor, Protractor)
        .register(TaskId::WebdriverUpdate, WebdriverUpdate)
        .register(TaskId::Nodemon, Nodemon)
        .register(TaskId::Watch, Watch)
        .register(TaskId::NodeInspector, NodeInspector);
}
