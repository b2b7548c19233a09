use std::{
    io::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    session::LoadStatus, transport::HttpBackend, AssetStore, DocumentStore, GenerationBackend,
    JobOutcome, MissingGenerationBackend, Orchestrator, SaveOutcome, WorkflowError,
};
use shared::domain::{bare_identifier, Asset, Category};
use storage::LocalStore;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod events;

use commands::{parse_command, ConsoleCommand, HELP};
use config::{load_settings, Overrides, Settings};
use events::{describe_error, describe_event};

#[derive(Parser, Debug)]
#[command(name = "console", about = "Authoring console for character and environment documents")]
struct Args {
    /// Config file; defaults to ./console.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    backend_url: Option<String>,
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    outputs_dir: Option<PathBuf>,
    /// Ignore any configured backend and work on the local data directory.
    #[arg(long, global = true)]
    offline: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the documents of a category and exit.
    List { category: Category },
    /// Refresh the gallery, print it and exit.
    Gallery {
        /// Only assets whose name contains this document identifier.
        #[arg(long)]
        filter: Option<String>,
    },
}

/// Where asset files can be opened from.
enum AssetLinks {
    Remote(HttpBackend),
    Local(PathBuf),
}

impl AssetLinks {
    fn locate(&self, asset: &Asset) -> String {
        match self {
            AssetLinks::Remote(backend) => backend
                .asset_url(asset)
                .map(|url| url.to_string())
                .unwrap_or_else(|| asset.path.clone()),
            AssetLinks::Local(outputs_dir) => outputs_dir.join(&asset.name).display().to_string(),
        }
    }
}

struct Collaborators {
    documents: Arc<dyn DocumentStore>,
    generator: Arc<dyn GenerationBackend>,
    assets: Arc<dyn AssetStore>,
    links: AssetLinks,
}

fn connect(settings: &Settings) -> Result<Collaborators> {
    match settings.backend()? {
        Some(url) => {
            let backend = HttpBackend::new(url.as_str())
                .map_err(|err| anyhow::anyhow!("{err}"))
                .context("failed to configure backend")?;
            info!(%url, "using authoring backend");
            let shared = Arc::new(backend.clone());
            Ok(Collaborators {
                documents: shared.clone(),
                generator: shared.clone(),
                assets: shared,
                links: AssetLinks::Remote(backend),
            })
        }
        None => {
            info!(
                data_dir = %settings.data_dir.display(),
                outputs_dir = %settings.outputs_dir.display(),
                "no backend configured; using local data directory"
            );
            let store = Arc::new(LocalStore::new(&settings.data_dir, &settings.outputs_dir));
            Ok(Collaborators {
                documents: store.clone(),
                generator: Arc::new(MissingGenerationBackend),
                assets: store,
                links: AssetLinks::Local(settings.outputs_dir.clone()),
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(
        args.config.clone(),
        Overrides {
            backend_url: args.backend_url.clone(),
            data_dir: args.data_dir.clone(),
            outputs_dir: args.outputs_dir.clone(),
            offline: args.offline,
        },
    );

    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let collaborators = connect(&settings)?;
    let orchestrator = Orchestrator::new(
        collaborators.documents.clone(),
        collaborators.generator.clone(),
        collaborators.assets.clone(),
    );

    match args.command {
        Some(Command::List { category }) => list_once(&orchestrator, category).await,
        Some(Command::Gallery { filter }) => {
            gallery_once(&orchestrator, &collaborators.links, filter.as_deref()).await
        }
        None => run_console(orchestrator, collaborators.links).await,
    }
}

async fn list_once(orchestrator: &Orchestrator, category: Category) -> Result<()> {
    if !category.has_documents() {
        bail!("category '{category}' has no documents");
    }
    let listed = if orchestrator.active_category().await == category {
        orchestrator.refresh_documents().await
    } else {
        orchestrator.select_category(category).await
    };
    listed.map_err(|err| anyhow::anyhow!(describe_error(&err)))?;
    for identifier in orchestrator.documents().await {
        println!("{identifier}");
    }
    Ok(())
}

async fn gallery_once(
    orchestrator: &Orchestrator,
    links: &AssetLinks,
    filter: Option<&str>,
) -> Result<()> {
    orchestrator
        .refresh_gallery()
        .await
        .map_err(|err| anyhow::anyhow!(describe_error(&err)))?;
    let needle = filter.map(bare_identifier);
    for asset in orchestrator.gallery().await {
        if needle.is_some_and(|needle| !asset.name.contains(needle)) {
            continue;
        }
        println!("{}\t{:?}\t{}", asset.name, asset.media_type, links.locate(&asset));
    }
    Ok(())
}

async fn run_console(orchestrator: Arc<Orchestrator>, links: AssetLinks) -> Result<()> {
    let mut notices = orchestrator.subscribe_events();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(event) => {
                    debug!(?event, "workflow event");
                    if let Some(line) = describe_event(&event) {
                        println!("  · {line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Err(err) = orchestrator.initialize().await {
        println!("{}", describe_error(&err));
    }
    println!("type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("failed to flush stdout")?;
        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            break;
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        if command == ConsoleCommand::Quit {
            break;
        }
        if let Err(err) = execute(&orchestrator, &links, command).await {
            match err.downcast_ref::<WorkflowError>() {
                Some(workflow) => println!("{}", describe_error(workflow)),
                None => println!("error: {err:#}"),
            }
        }
    }
    Ok(())
}

async fn execute(
    orchestrator: &Orchestrator,
    links: &AssetLinks,
    command: ConsoleCommand,
) -> Result<()> {
    match command {
        ConsoleCommand::Category(category) => orchestrator.select_category(category).await?,
        ConsoleCommand::List => print_documents(orchestrator).await,
        ConsoleCommand::Open(identifier) => {
            orchestrator.open_document(&identifier).await?;
            print_buffer(orchestrator).await;
        }
        ConsoleCommand::New => {
            orchestrator.begin_new().await?;
            print_buffer(orchestrator).await;
        }
        ConsoleCommand::Cancel => orchestrator.cancel_new().await?,
        ConsoleCommand::Edit(text) => orchestrator.edit(text).await?,
        ConsoleCommand::Load(path) => {
            let text = read_local(&path).await?;
            orchestrator.edit(text).await?;
        }
        ConsoleCommand::Show => print_buffer(orchestrator).await,
        ConsoleCommand::Save(name) => match orchestrator.save(name.as_deref()).await? {
            SaveOutcome::Saved(document) => println!("saved {document}"),
            SaveOutcome::AlreadyRunning => println!("a save is already running"),
        },
        ConsoleCommand::Generate(prompt) => {
            match orchestrator.synthesize_document(&prompt).await? {
                JobOutcome::Completed => print_buffer(orchestrator).await,
                JobOutcome::AlreadyRunning => println!("a document is already being generated"),
                JobOutcome::Discarded => {
                    println!("the open document changed; generated content was discarded")
                }
            }
        }
        ConsoleCommand::Style(None) => {
            let snapshot = orchestrator.snapshot().await;
            println!("current: {}", snapshot.style_override);
            for style in snapshot.styles {
                println!("  {style}");
            }
        }
        ConsoleCommand::Style(Some(name)) => orchestrator.set_style_override(&name).await?,
        ConsoleCommand::Render => match orchestrator.render().await? {
            JobOutcome::AlreadyRunning => println!("a render is already running"),
            JobOutcome::Completed | JobOutcome::Discarded => print_assets(
                links,
                &orchestrator.latest_results().await,
            ),
        },
        ConsoleCommand::Gallery { all } => {
            let assets = if all {
                orchestrator.gallery().await
            } else {
                orchestrator.latest_results().await
            };
            print_assets(links, &assets);
        }
        ConsoleCommand::Refresh => {
            if orchestrator.active_category().await.has_documents() {
                orchestrator.refresh_documents().await?;
            }
            orchestrator.refresh_gallery().await?;
        }
        ConsoleCommand::Status => print_status(orchestrator).await,
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

async fn read_local(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

async fn print_documents(orchestrator: &Orchestrator) {
    let snapshot = orchestrator.snapshot().await;
    let open = snapshot
        .session
        .document
        .as_ref()
        .map(|document| document.identifier.as_str());
    for identifier in &snapshot.documents {
        let marker = if Some(identifier.as_str()) == open { "*" } else { " " };
        println!("{marker} {identifier}");
    }
}

async fn print_buffer(orchestrator: &Orchestrator) {
    match orchestrator.buffer().await {
        Some(content) => println!("{content}"),
        None => println!("(loading)"),
    }
}

fn print_assets(links: &AssetLinks, assets: &[Asset]) {
    if assets.is_empty() {
        println!("(no assets)");
    }
    for asset in assets {
        println!("{}\t{}", asset.name, links.locate(asset));
    }
}

async fn print_status(orchestrator: &Orchestrator) {
    let snapshot = orchestrator.snapshot().await;
    let session = &snapshot.session;
    let document = match (&session.document, session.is_new) {
        (_, true) => "(new, unsaved)".to_string(),
        (Some(document), false) => document.to_string(),
        (None, false) => "(none)".to_string(),
    };
    println!("category: {}", snapshot.category);
    println!("document: {document}");
    if session.load_status == LoadStatus::Failed {
        println!("load:     failed");
    }
    println!("save:     {:?}", session.save_status);
    println!("style:    {}", snapshot.style_override);
    println!(
        "busy:     loading={} saving={} generating={} rendering={}",
        snapshot.busy.loading,
        snapshot.busy.saving,
        snapshot.busy.synthesizing_document,
        snapshot.busy.rendering
    );
    match snapshot.gallery_refreshed_at {
        Some(at) => println!(
            "assets:   {} (refreshed {})",
            snapshot.asset_count,
            at.format("%H:%M:%S")
        ),
        None => println!("assets:   {} (never refreshed)", snapshot.asset_count),
    }
    if let Some(err) = &snapshot.last_error {
        println!("{}", describe_error(err));
    }
}
