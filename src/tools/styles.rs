use async_trait::async_trait;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use futures::future::try_join_all;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use thiserror::Error;

use crate::TaskContext;
use crate::manifest::Group;
use crate::task::{Task, TaskResult};
use crate::tools::command;

/// Errors that can occur when compiling stylesheets.
#[derive(Debug, Error)]
pub enum StyleError {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A Sass compilation error occurred.
    #[error("Sass compilation error in '{0}':\n{1}")]
    Sass(Utf8PathBuf, Box<grass::Error>),

    /// The concatenated CSS bundle could not be compressed.
    #[error("Couldn't minify CSS bundle:\n{0}")]
    Minify(Box<grass::Error>),
}

/// Compiles every non-partial `client.sass` file next to its source, with
/// the `scss` directory swapped for `css`.
pub struct Sass;

/// Compiles every `client.less` file with `lessc`, with the `less` directory
/// swapped for `css`.
pub struct Less;

/// Concatenates `client.css` and writes the compressed style bundle.
pub struct Cssmin;

#[async_trait]
impl Task for Sass {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let root = ctx.env.root.clone();
        let files: Vec<_> = ctx
            .expand(&[Group::ClientSass])?
            .into_iter()
            .filter(|file| !is_partial(file))
            .collect();

        if files.is_empty() {
            tracing::info!("no sass files to compile");
            return Ok(());
        }

        let count = files.len();
        tokio::task::spawn_blocking(move || compile_sass(&root, files)).await??;

        tracing::info!("compiled {count} sass files");
        Ok(())
    }
}

fn compile_sass(root: &Utf8Path, files: Vec<Utf8PathBuf>) -> Result<(), StyleError> {
    files.into_par_iter().try_for_each(|file| {
        // Options borrow a file system and a logger that are not `Sync`.
        let options = grass::Options::default();
        let css = grass::from_path(&file, &options)
            .map_err(|e| StyleError::Sass(file.clone(), e))?;
        let output = compiled_path(root, &file, "scss");

        crate::io::write_artifact(&output, css)?;
        tracing::debug!("{file} -> {output}");
        Ok(())
    })
}

#[async_trait]
impl Task for Less {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let files = ctx.expand(&[Group::ClientLess])?;

        if files.is_empty() {
            tracing::info!("no less files to compile");
            return Ok(());
        }

        let lessc = &ctx.config().tools.lessc;
        let jobs = files.iter().map(|file| {
            let output = compiled_path(&ctx.env.root, file, "less");
            let mut cmd = command::command(ctx, lessc);
            cmd.arg(file.as_str()).arg(output.as_str());

            async move {
                if let Some(dir) = output.parent() {
                    tokio::fs::create_dir_all(dir).await?;
                }
                command::run(cmd).await
            }
        });

        try_join_all(jobs).await?;

        tracing::info!("compiled {} less files", files.len());
        Ok(())
    }
}

#[async_trait]
impl Task for Cssmin {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let files = ctx.expand(&[Group::ClientCss])?;

        if files.is_empty() {
            tracing::info!("no css files to bundle");
            return Ok(());
        }

        let output = &ctx.config().output;
        let output = ctx.env.path(&output.dir).join(&output.style);

        let bundle = tokio::task::spawn_blocking(move || minify_css(&files)).await??;
        crate::io::write_artifact(&output, &bundle)?;

        tracing::info!("wrote {output} ({} bytes)", bundle.len());
        Ok(())
    }
}

fn minify_css(files: &[Utf8PathBuf]) -> Result<String, StyleError> {
    let source = crate::io::concat(files, "\n")?;
    let options = grass::Options::default().style(grass::OutputStyle::Compressed);

    grass::from_string(source, &options).map_err(StyleError::Minify)
}

/// Sass partials (`_name.scss`) are only compiled through imports.
fn is_partial(path: &Utf8Path) -> bool {
    path.file_name().is_some_and(|name| name.starts_with('_'))
}

/// Output path of a compiled style sheet: the first directory named `from`
/// is swapped for `css`, and the extension becomes `.css`.
///
/// Only the part of the path below `root` is rewritten.
pub(crate) fn compiled_path(root: &Utf8Path, file: &Utf8Path, from: &str) -> Utf8PathBuf {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let mut components: Vec<_> = relative.components().collect();
    let dirs = components.len().saturating_sub(1);

    if let Some(i) = components[..dirs]
        .iter()
        .position(|c| matches!(c, Utf8Component::Normal(name) if *name == from))
    {
        components[i] = Utf8Component::Normal("css");
    }

    let relative: Utf8PathBuf = components.iter().collect();
    let output = if file.starts_with(root) {
        root.join(relative)
    } else {
        relative
    };

    output.with_extension("css")
}
