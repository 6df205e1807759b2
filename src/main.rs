use camino::Utf8PathBuf;
use clap::Parser;
use console::style;
use sagyou::{
    Alias, Blueprint, Config, Diagnostics, EnvMode, Environment, Pipeline, SagyouError, TaskId,
};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
struct Args {
    /// Alias to run: lint, build, test, default, debug or prod.
    #[clap(index = 1, default_value = "default")]
    alias: Alias,

    /// Project root containing `sagyou.json`.
    #[clap(short = 'C', long, default_value = ".")]
    root: Utf8PathBuf,

    /// Keep going when linters report problems.
    #[clap(long)]
    force: bool,

    /// Initial environment mode, overriding `NODE_ENV`.
    #[clap(long)]
    mode: Option<EnvMode>,

    /// Run a single task instead of an alias.
    #[clap(long, conflicts_with = "alias")]
    task: Option<TaskId>,

    /// Print the resolved plan of the alias and exit.
    #[clap(long)]
    plan: bool,

    /// Check that every alias resolves to registered tasks and exit.
    #[clap(long)]
    check: bool,

    /// Print the effective configuration as JSON and exit.
    #[clap(long)]
    print_config: bool,
}

fn init_logging() {
    let indicatif_layer = IndicatifLayer::new();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_target(false)
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(indicatif_layer)
        .init();
}

async fn execute(pipeline: &Pipeline, args: &Args) -> anyhow::Result<Diagnostics> {
    let diagnostics = match args.task {
        Some(id) => pipeline.run_task(id).await?,
        None => pipeline.run(args.alias).await?,
    };

    Ok(diagnostics)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    let config = Config::load(&args.root).map_err(SagyouError::from)?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let mode = args.mode.unwrap_or_else(|| {
        let node_env = std::env::var("NODE_ENV").ok();
        EnvMode::from_node_env(node_env.as_deref())
    });

    let env = Environment::new(&args.root, config)
        .with_mode(mode)
        .with_force(args.force);
    let pipeline = Blueprint::with_builtin_tasks().finish(env);

    if args.check {
        for plan in pipeline.check()? {
            println!("{plan}");
        }
        return Ok(());
    }

    if args.plan {
        println!("{}", pipeline.validate(args.alias)?);
        return Ok(());
    }

    let target = match args.task {
        Some(id) => format!("task {id}"),
        None => args.alias.to_string(),
    };
    eprintln!(
        "{} {} {}",
        style(env!("CARGO_PKG_NAME")).bold().cyan(),
        style(&target).bold(),
        style(format!("({mode})")).dim()
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(SagyouError::RuntimeBuild)?;

    let diagnostics = runtime.block_on(async {
        tokio::select! {
            result = execute(&pipeline, &args) => result.map(Some),
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, stopping {target}");
                Ok(None)
            }
        }
    })?;

    if let Some(diagnostics) = diagnostics {
        tracing::debug!("\n{diagnostics}");
        tracing::info!("finished {target}: {}", diagnostics.summary());
    }

    Ok(())
}
