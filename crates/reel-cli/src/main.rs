//! `reel` - operator tooling for reel task stores

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use reel_core::{EngineConfig, SplitMode, TaskId, TextSplitter};
use reel_store::FsStore;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn cli() -> Command {
    Command::new("reel")
        .version(reel_core::VERSION)
        .about("Inspect reel video tasks and scripts")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Engine configuration file (TOML)"),
        )
        .subcommand(
            Command::new("split")
                .about("Split a script the way fixed mode does")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Script file"),
                )
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .default_value("paragraph")
                        .value_parser(["paragraph", "line", "sentence"])
                        .help("Split strategy"),
                ),
        )
        .subcommand(Command::new("list").about("List persisted tasks, newest first"))
        .subcommand(
            Command::new("show")
                .about("Show one persisted task")
                .arg(Arg::new("task_id").required(true).help("Task id"))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the raw metadata document"),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> Result<EngineConfig> {
    let path = matches
        .subcommand()
        .and_then(|(_, args)| args.get_one::<PathBuf>("config"))
        .or_else(|| matches.get_one::<PathBuf>("config"));
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(EngineConfig::new()),
    }
}

fn split(args: &ArgMatches) -> Result<()> {
    let file = args
        .get_one::<PathBuf>("file")
        .context("missing script file")?;
    let mode: SplitMode = args
        .get_one::<String>("mode")
        .map_or("paragraph", String::as_str)
        .parse()?;

    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let segments = TextSplitter::split_text(&text, mode);
    tracing::info!(segments = segments.len(), ?mode, "Script split");

    for (i, segment) in segments.iter().enumerate() {
        println!("[{}] {}", i + 1, segment.replace('\n', " "));
    }
    Ok(())
}

async fn list(store: &FsStore) -> Result<()> {
    let tasks = store.list_tasks().await?;
    if tasks.is_empty() {
        println!("No tasks under {}", store.root().display());
        return Ok(());
    }

    for task in tasks {
        let title = task.input.get("title").and_then(|t| t.as_str()).unwrap_or("-");
        println!(
            "{}  {}  {:>3} scenes  {:>7.1}s  {}",
            task.task_id,
            task.created_at.format("%Y-%m-%d %H:%M:%S"),
            task.result.n_frames,
            task.result.duration,
            title
        );
    }
    Ok(())
}

async fn show(store: &FsStore, args: &ArgMatches) -> Result<()> {
    let raw = args.get_one::<String>("task_id").context("missing task id")?;
    let task_id: TaskId = raw
        .parse()
        .with_context(|| format!("invalid task id '{raw}'"))?;
    let metadata = store.load_metadata(task_id).await?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    println!("Task:      {}", metadata.task_id);
    println!("Status:    {}", metadata.status);
    println!("Created:   {}", metadata.created_at);
    if let Some(completed) = metadata.completed_at {
        println!("Completed: {completed}");
    }
    if let Some(title) = metadata.input.get("title").and_then(|t| t.as_str()) {
        println!("Title:     {title}");
    }
    println!("Video:     {}", metadata.result.video_path.display());
    println!("Duration:  {:.1}s", metadata.result.duration);
    println!("Scenes:    {}", metadata.result.n_frames);
    println!("Size:      {} bytes", metadata.result.file_size);

    if let Ok(storyboard) = store.load_storyboard(task_id).await {
        println!();
        for frame in &storyboard.frames {
            println!("  {:>2}. ({:.1}s) {}", frame.index + 1, frame.duration, frame.narration);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    let store = FsStore::new(&config.tasks_root);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match matches.subcommand() {
            Some(("split", args)) => split(args),
            Some(("list", _)) => list(&store).await,
            Some(("show", args)) => show(&store, args).await,
            _ => {
                cli().print_help()?;
                Ok(())
            }
        }
    })
}
