//! stashup: queue files for chunked upload to a MediaWiki media repository and
//! drain the queue.
//!
//! Configuration comes from STASHUP_* environment variables (or a .env file).

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use stashup_cli::{
    default_wikitext, init_tracing, parse_caption, remote_filename, scan_bucket, truncate_string,
};
use stashup_client::{MediaWikiClient, StructuredDataClient};
use stashup_core::hashing::sha1_of_file;
use stashup_core::models::{Contribution, ContributionState, LatLng, PlaceTarget};
use stashup_core::{ActionedImages, Config, ContributionStore, ImageSelector, SelectorConfig};
use stashup_db::{
    setup_database, ContributionRepository, NotForUploadRepository, PlaceRepository,
    UploadedStatusRepository,
};
use stashup_worker::{UploadContext, UploadWorker, WorkerOutcome};

#[derive(Parser)]
#[command(name = "stashup", about = "Resumable chunked uploads to a media repository")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a local file for upload
    Enqueue(EnqueueArgs),
    /// List contributions
    List {
        /// Filter by state: queued, in_progress, paused, failed, completed
        #[arg(long)]
        state: Option<String>,
        /// Print full records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload queued contributions
    Drain {
        /// Keep polling for new contributions until interrupted
        #[arg(long)]
        follow: bool,
    },
    /// Put failed or paused contributions back in the queue
    Retry {
        /// Page id of the contribution
        #[arg(required_unless_present = "all_failed")]
        page_id: Option<String>,
        /// Re-queue every failed contribution
        #[arg(long, conflicts_with = "page_id")]
        all_failed: bool,
        /// Also accept a contribution stuck in progress after an aborted drain.
        /// Only use while no drain is running.
        #[arg(long, requires = "page_id")]
        in_progress: bool,
    },
    /// Show the images of a folder and whether they were already handled
    Gallery {
        dir: PathBuf,
        /// Hide images that were uploaded, queued or marked
        #[arg(long)]
        hide_actioned: bool,
    },
    /// Mark a file as not meant for upload
    Mark { file: PathBuf },
}

#[derive(Args)]
struct EnqueueArgs {
    /// Path to the file
    file: PathBuf,
    /// Remote file name (defaults to the local name)
    #[arg(long)]
    title: Option<String>,
    /// Page text committed with the file
    #[arg(long)]
    wikitext: Option<String>,
    /// Entity the file should become the primary image of, e.g. Q243
    #[arg(long)]
    place_id: Option<String>,
    #[arg(long, requires = "place_id")]
    place_name: Option<String>,
    /// Existing primary image of the place, if any
    #[arg(long, requires = "place_id")]
    place_image: Option<String>,
    #[arg(long, requires_all = ["place_id", "lon"])]
    lat: Option<f64>,
    #[arg(long, requires_all = ["place_id", "lat"])]
    lon: Option<f64>,
    /// Caption as lang=text (repeatable)
    #[arg(long = "caption")]
    captions: Vec<String>,
    /// Depicted entity id (repeatable)
    #[arg(long = "depicts")]
    depictions: Vec<String>,
}

async fn enqueue(
    repo: &ContributionRepository,
    config: &Config,
    args: EnqueueArgs,
) -> anyhow::Result<()> {
    let EnqueueArgs {
        file,
        title,
        wikitext,
        place_id,
        place_name,
        place_image,
        lat,
        lon,
        captions,
        depictions,
    } = args;

    let path = tokio::fs::canonicalize(&file)
        .await
        .with_context(|| format!("File not found: {}", file.display()))?;
    let filename = remote_filename(&path, title.as_deref())?;
    let sha1 = sha1_of_file(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let local_path = path.to_string_lossy().to_string();

    let mut contribution = Contribution::new_queued(
        uuid::Uuid::new_v4().to_string(),
        filename,
        local_path.clone(),
        sha1,
    );
    contribution.content_uri = Some(format!("file://{}", local_path));
    contribution.captions = captions
        .iter()
        .map(|raw| parse_caption(raw))
        .collect::<anyhow::Result<BTreeMap<_, _>>>()?;
    contribution.depictions = depictions;
    contribution.wikitext = wikitext.unwrap_or_else(|| {
        let description = contribution
            .captions
            .values()
            .next()
            .cloned()
            .unwrap_or_else(|| contribution.display_title.clone());
        default_wikitext(
            &description,
            config.worker.username.as_deref(),
            contribution.date_created,
        )
    });
    contribution.place = place_id.map(|id| PlaceTarget {
        name: place_name.unwrap_or_else(|| id.clone()),
        id,
        image_value: place_image,
        location: lat.zip(lon).map(|(latitude, longitude)| LatLng {
            latitude,
            longitude,
        }),
    });

    repo.save(&contribution)
        .await
        .context("Failed to queue contribution")?;
    println!("{}\t{}", contribution.page_id, contribution.filename);
    Ok(())
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

async fn list(
    repo: &ContributionRepository,
    state: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let contributions = match state {
        Some(state) => {
            let state: ContributionState = state.parse()?;
            repo.list_by_state(&[state]).await?
        }
        None => repo.list_all().await?,
    };
    if json {
        return print_json(&contributions);
    }

    println!(
        "{:<36}  {:<11}  {:>10}  {:<40}  {}",
        "PAGE ID", "STATE", "BYTES", "FILE", "ERROR"
    );
    for c in contributions {
        println!(
            "{:<36}  {:<11}  {:>10}  {:<40}  {}",
            c.page_id,
            c.state,
            c.transferred,
            truncate_string(&c.filename, 40),
            truncate_string(c.error_info.as_deref().unwrap_or(""), 60),
        );
    }
    Ok(())
}

async fn drain(config: &Config, pool: SqlitePool, follow: bool) -> anyhow::Result<()> {
    config.validate().context("Invalid configuration")?;

    let media = MediaWikiClient::new(&config.client).context("Failed to build API client")?;
    let structured_data = StructuredDataClient::new(&config.client, media.clone())
        .context("Failed to build structured data client")?;
    let media = Arc::new(media);
    let ctx = UploadContext::new(
        Arc::new(ContributionRepository::new(pool.clone())),
        Arc::new(UploadedStatusRepository::new(pool.clone())),
        Arc::new(PlaceRepository::new(pool)),
        media.clone(),
        Arc::new(structured_data),
        media,
    );
    let worker = UploadWorker::new(ctx, config.worker.clone());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, stopping after the current chunk");
                cancel.cancel();
            }
        });
    }

    if follow {
        worker.follow(cancel).await;
        return Ok(());
    }

    let report = worker.run(&cancel).await;
    println!(
        "started={} completed={} failed={} paused={} cancelled={}",
        report.uploads_started, report.completed, report.failed, report.paused, report.cancelled
    );
    match report.outcome {
        WorkerOutcome::Failure(message) => Err(anyhow::anyhow!("Drain failed: {}", message)),
        WorkerOutcome::Reschedule => {
            println!("Contributions remain queued; run drain again");
            Ok(())
        }
        WorkerOutcome::Done | WorkerOutcome::AlreadyRunning => Ok(()),
    }
}

async fn gallery(pool: SqlitePool, dir: PathBuf, hide_actioned: bool) -> anyhow::Result<()> {
    let images = scan_bucket(&dir, 0).await?;
    let uploaded = UploadedStatusRepository::new(pool.clone()).list_all().await?;
    let marked = NotForUploadRepository::new(pool.clone()).list_all().await?;
    let pending = ContributionRepository::new(pool)
        .list_by_state(&ContributionState::PENDING)
        .await?;
    let actioned = ActionedImages::new()
        .with_uploaded(&uploaded)
        .with_not_for_upload(&marked)
        .with_pending(&pending);

    let mut selector = ImageSelector::new(SelectorConfig {
        bucket_id: 0,
        show_already_actioned: !hide_actioned,
        single_selection: false,
        last_item_id: None,
    });
    selector.load(images, actioned);

    if selector.show_all_actioned_notice(false) {
        println!("Every image in {} was already handled", dir.display());
        return Ok(());
    }
    for image in selector.visible() {
        let marker = if selector.is_actioned(image) { "x" } else { " " };
        println!("[{}] {:>4}  {}", marker, image.id, image.name);
    }
    Ok(())
}

async fn mark(pool: SqlitePool, file: PathBuf) -> anyhow::Result<()> {
    let sha1 = sha1_of_file(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    NotForUploadRepository::new(pool)
        .mark(&sha1)
        .await
        .context("Failed to mark file")?;
    println!("Marked {} as not for upload", file.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = setup_database(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to open database")?;
    let contributions = ContributionRepository::new(pool.clone());

    match cli.command {
        Commands::Enqueue(args) => enqueue(&contributions, &config, args).await?,
        Commands::List { state, json } => list(&contributions, state, json).await?,
        Commands::Drain { follow } => drain(&config, pool, follow).await?,
        Commands::Retry {
            page_id,
            all_failed,
            in_progress,
        } => {
            if all_failed {
                let count = contributions.requeue_all_failed().await?;
                println!("Re-queued {} contribution(s)", count);
            } else if let Some(page_id) = page_id {
                let requeued = contributions.requeue(&page_id).await?
                    || (in_progress && contributions.requeue_in_progress(&page_id).await?);
                if !requeued {
                    if in_progress {
                        anyhow::bail!(
                            "{} is not a failed, paused or in-progress contribution",
                            page_id
                        );
                    }
                    anyhow::bail!("{} is not a failed or paused contribution", page_id);
                }
                println!("Re-queued {}", page_id);
            }
        }
        Commands::Gallery { dir, hide_actioned } => gallery(pool, dir, hide_actioned).await?,
        Commands::Mark { file } => mark(pool, file).await?,
    }

    Ok(())
}
