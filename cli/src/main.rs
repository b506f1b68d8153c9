//! Command line front end: aggregate new releases and either export them or
//! push them to a streaming service in one go.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use api::{config::CONFIG, globals::build_services};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use cratedigger::{
    export::{matches_to_csv, tracks_to_csv},
    progress,
    traits::expand_date,
    CredentialStore, Credentials, JsonFileCredentialStore, Orchestrator, OrchestratorBuilder,
    Services, SyncRequest,
};
use shared::PlaylistResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cratedigger")]
#[command(about = "Collect fresh releases from music stores into a playlist", long_about = None)]
struct Cli {
    /// Credential file shared by `login` and `sync`
    #[arg(long, global = true, env = "CRATEDIGGER_CREDENTIALS", default_value = "credentials.json")]
    credentials: PathBuf,

    /// Owner the stored tokens belong to
    #[arg(long, global = true, default_value = "local")]
    owner: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered sources and destinations
    Sources,
    /// Store an access token for a destination
    Login {
        #[arg(short, long)]
        destination: String,
        #[arg(long, env = "CRATEDIGGER_ACCESS_TOKEN")]
        access_token: String,
        #[arg(long, env = "CRATEDIGGER_REFRESH_TOKEN")]
        refresh_token: Option<String>,
        /// Lifetime of the access token in seconds
        #[arg(long)]
        expires_in: Option<i64>,
    },
    /// Fetch tracks and build a playlist
    Sync(SyncArgs),
}

#[derive(Args)]
struct SyncArgs {
    #[arg(short, long, default_value = "New Music {date}")]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Source ids to query; all sources when omitted
    #[arg(short, long = "source")]
    sources: Vec<String>,
    #[arg(short, long)]
    genre: Option<String>,
    #[arg(short, long, default_value_t = 14)]
    days: u32,
    #[arg(short, long)]
    limit: Option<usize>,
    #[arg(long)]
    min_score: Option<f64>,
    #[arg(long)]
    public: bool,
    /// Skip the destination and only export what was found
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    destination: Option<String>,
    /// CSV output path
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,cratedigger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let services = build_services(&CONFIG)?;
    let store: Arc<dyn CredentialStore> = Arc::new(JsonFileCredentialStore::new(&cli.credentials));

    match cli.command {
        Commands::Sources => list(&services),
        Commands::Login {
            destination,
            access_token,
            refresh_token,
            expires_in,
        } => {
            if services.destination(Some(&destination)).is_none() {
                bail!("unknown destination '{destination}'");
            }
            let credentials = Credentials {
                access_token,
                refresh_token,
                expires_at: expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            };
            store.save(&cli.owner, &destination, &credentials).await?;
            println!("Saved {} credentials to {}", destination, cli.credentials.display());
            Ok(())
        }
        Commands::Sync(args) => sync(&services, store, &cli.owner, args).await,
    }
}

fn list(services: &Services) -> anyhow::Result<()> {
    println!("Sources:");
    for source in services.sources() {
        let genres = source.available_genres();
        if genres.is_empty() {
            println!("  {:<12} {}", source.id(), source.description());
        } else {
            println!(
                "  {:<12} {} (genres: {})",
                source.id(),
                source.description(),
                genres.join(", ")
            );
        }
    }
    println!("Destinations:");
    for (id, name) in services.list_destinations() {
        println!("  {:<12} {}", id, name);
    }
    Ok(())
}

async fn sync(
    services: &Services,
    store: Arc<dyn CredentialStore>,
    owner: &str,
    args: SyncArgs,
) -> anyhow::Result<()> {
    let sources = if args.sources.is_empty() {
        services.sources()
    } else {
        for id in &args.sources {
            if services.source(id).is_none() {
                bail!("unknown source '{id}'");
            }
        }
        services.select_sources(&args.sources)
    };

    let request = SyncRequest {
        name: args.name,
        description: args.description,
        genre: args.genre,
        days: args.days,
        public: args.public,
        limit: args.limit.unwrap_or(CONFIG.default_limit),
        min_match_score: args.min_score.unwrap_or(CONFIG.default_min_match_score),
    };
    request.validate()?;

    let orchestrator: Orchestrator = OrchestratorBuilder::new()
        .batch_pause(CONFIG.fetch_batch_pause())
        .source_timeout(CONFIG.source_timeout())
        .build();

    let (tx, mut rx) = progress::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("[{}/{}] {}", event.current, event.total, event.message);
        }
    });

    let outcome = if args.dry_run {
        orchestrator
            .aggregate(&sources, request.genre.as_deref(), request.days, request.limit, Some(&tx))
            .await
            .map(Outcome::Tracks)
    } else {
        let factory = services
            .destination(args.destination.as_deref())
            .ok_or_else(|| anyhow!("no destination configured"))?;
        let destination = factory.for_owner(owner, store)?;
        orchestrator
            .synchronize(&sources, Some(destination), &request, Some(tx.clone()))
            .await
            .map(Outcome::Playlist)
    };
    drop(tx);
    printer.await.ok();

    let playlist_name = expand_date(&request.name);
    match outcome? {
        Outcome::Tracks(tracks) => {
            println!("Found {} tracks for '{}'", tracks.len(), playlist_name);
            for track in &tracks {
                println!("  {} - {} [{}]", track.artist, track.title, track.source);
            }
            if let Some(path) = args.output {
                write_csv(&path, &tracks_to_csv(&tracks)).await?;
            }
        }
        Outcome::Playlist(result) => {
            if !result.success {
                bail!("playlist '{}' failed: {}", playlist_name, result.message);
            }
            println!("{}", result.message);
            if !result.playlist_url.is_empty() {
                println!("{}", result.playlist_url);
            }
            if let Some(path) = args.output {
                write_csv(&path, &csv_of(&result)).await?;
            }
        }
    }
    Ok(())
}

enum Outcome {
    Tracks(Vec<shared::Track>),
    Playlist(PlaylistResult),
}

fn csv_of(result: &PlaylistResult) -> String {
    result
        .csv_data
        .clone()
        .unwrap_or_else(|| matches_to_csv(&result.added_tracks, &result.unmatched_tracks))
}

async fn write_csv(path: &Path, csv: &str) -> anyhow::Result<()> {
    tokio::fs::write(path, csv)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
