//! Hotlympics Rater (hotlympics-rater) - Main entry point
//!
//! Terminal driver for the rating core: shows one pair at a time and records
//! the viewer's choice. Useful for exercising a backend without the app.
//!
//! `--leaderboard <kind>` prints a published board instead.
//!
//! Keys: `1`/`l` left wins, `2`/`r` right wins, `d` draw, `s` skip,
//! Enter retries a failed or depleted queue, `q` quits.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hotlympics_common::config::RaterConfig;
use hotlympics_common::events::{EventBus, QueuePhase, RaterEvent};
use hotlympics_common::models::Choice;
use hotlympics_common::{BoardKind, Cohort, Leaderboard, Pair};
use hotlympics_rater::api::ApiClient;
use hotlympics_rater::{
    BlockQueue, CacheLimits, ComparisonSubmitter, Identity, IdentityProvider, ItemCache,
    LeaderboardCache, QueueStatus, RatingSession, SessionGate, SharedIdentity,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for hotlympics-rater
#[derive(Parser, Debug)]
#[command(name = "hotlympics-rater")]
#[command(about = "Pairwise photo rating client for Hotlympics")]
#[command(version)]
struct Args {
    /// Config file (defaults to HOTLYMPICS_CONFIG, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Bearer token for authenticated requests
    #[arg(long)]
    token: Option<String>,

    /// Viewer user id (anonymous when omitted)
    #[arg(long)]
    user_id: Option<String>,

    /// Viewer's own cohort; the opposite cohort is shown
    #[arg(long)]
    cohort: Option<Cohort>,

    /// Items per block
    #[arg(long)]
    block_size: Option<usize>,

    /// Rate N pairs choosing left every time, then exit
    #[arg(long)]
    auto: Option<u64>,

    /// Print a leaderboard (female_top, female_bottom, male_top, male_bottom) and exit
    #[arg(long)]
    leaderboard: Option<BoardKind>,

    /// Log level, or a full filter directive (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply_to(&self, config: &mut RaterConfig) {
        if let Some(url) = &self.api_url {
            config.api.base_url = url.clone();
        }
        if let Some(token) = &self.token {
            config.api.bearer_token = Some(token.clone());
        }
        if let Some(block_size) = self.block_size {
            config.queue.block_size = block_size;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }

    fn identity(&self) -> Identity {
        match &self.user_id {
            Some(user_id) => Identity::signed_in(user_id.clone(), self.cohort),
            None => Identity {
                user_id: None,
                cohort: self.cohort,
            },
        }
    }
}

fn init_tracing(config: &RaterConfig) -> Result<()> {
    let default_filter = if config.logging.level.contains('=') {
        config.logging.level.clone()
    } else {
        format!("hotlympics_rater={0},hotlympics_common={0}", config.logging.level)
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = config
        .logging
        .file
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        RaterConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config)?;
    info!(
        api = %config.api.base_url,
        block_size = config.queue.block_size,
        "Starting Hotlympics rater"
    );

    let events = EventBus::default();
    spawn_event_logger(&events);

    let identity = Arc::new(SharedIdentity::new(args.identity()));
    if let Some(token) = &config.api.bearer_token {
        identity.set_token(Some(token.clone())).await;
    }

    let client = Arc::new(
        ApiClient::new(&config.api)
            .context("Failed to build HTTP client")?
            .with_identity(identity.clone()),
    );
    let cache = Arc::new(ItemCache::new(
        client.clone(),
        CacheLimits::from(&config.cache),
    ));

    if let Some(kind) = args.leaderboard {
        let boards = LeaderboardCache::from_config(client.clone(), &config.leaderboard)
            .with_media(cache.clone());
        let board = boards
            .get(kind)
            .await
            .with_context(|| format!("Failed to load leaderboard {}", kind))?;
        print_leaderboard(&board);
        return Ok(());
    }

    let queue = Arc::new(BlockQueue::with_cache(
        client.clone(),
        config.queue.block_size,
        events.clone(),
        cache.clone(),
    ));
    let submitter = ComparisonSubmitter::new(client, events.clone());
    let gate = Arc::new(SessionGate::new(
        queue.clone(),
        config.session.default_cohort,
        events.clone(),
    ));
    let session = RatingSession::new(queue.clone(), submitter);

    let outcome = gate.sync(&identity.current()).await;
    info!(outcome = ?outcome, "Session ready");
    let watcher = gate.clone().watch(&*identity);

    let deliveries = match args.auto {
        Some(count) => run_auto(&session, &gate, &*identity, &events, count).await,
        None => run_interactive(&session, &gate, &*identity, &events, &cache).await?,
    };

    for delivery in deliveries {
        if let Err(e) = delivery.await {
            warn!("Delivery task ended abnormally: {}", e);
        }
    }
    watcher.abort();

    let stats = session.submitter().stats();
    let queue_stats = queue.stats();
    println!(
        "Submitted {} comparisons ({} ok, {} failed); {} swaps, {} refills",
        stats.attempted,
        stats.succeeded,
        stats.failed,
        queue_stats.swaps,
        queue_stats.refills_dispatched
    );
    info!("Rater shutdown complete");
    Ok(())
}

/// Log every event at debug level as JSON
fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!(event = %json, "{}", event.event_type()),
                    Err(e) => warn!("Failed to serialize event: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event logger lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Upper bound on waiting for a cohort switch started by the session watcher
const SWITCH_WAIT: Duration = Duration::from_secs(30);

/// Ensure a pair is available, reinitializing if the queue needs it
///
/// Waits while the session watcher is switching cohorts instead of reporting
/// the transient state.
async fn next_pair(
    session: &RatingSession,
    gate: &SessionGate,
    identity: &dyn IdentityProvider,
    events: &mut broadcast::Receiver<RaterEvent>,
) -> Option<Pair> {
    let mut retries = 2;
    loop {
        if let Some(pair) = session.current_pair() {
            return Some(pair);
        }
        match session.queue().status() {
            QueueStatus::Initializing | QueueStatus::Resetting => {
                if !wait_for_settled_phase(events).await {
                    return None;
                }
                continue;
            }
            _ if retries == 0 => return None,
            // Single-item block: move past it
            QueueStatus::Ready => {
                session.skip();
            }
            status if status.needs_initialize() => {
                gate.sync(&identity.current()).await;
            }
            _ => return None,
        }
        retries -= 1;
    }
}

/// Wait for the queue to leave Initializing/Resetting
///
/// Returns `false` when the bus closed or the switch took too long.
async fn wait_for_settled_phase(events: &mut broadcast::Receiver<RaterEvent>) -> bool {
    let settled = async {
        loop {
            match events.recv().await {
                Ok(RaterEvent::QueuePhaseChanged { new_phase, .. })
                    if !matches!(new_phase, QueuePhase::Initializing | QueuePhase::Resetting) =>
                {
                    return true;
                }
                Ok(_) => {}
                // Missed events: re-check the status directly
                Err(broadcast::error::RecvError::Lagged(_)) => return true,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    };
    match tokio::time::timeout(SWITCH_WAIT, settled).await {
        Ok(settled) => settled,
        Err(_) => {
            warn!("Queue did not settle within {:?}", SWITCH_WAIT);
            false
        }
    }
}

async fn run_auto(
    session: &RatingSession,
    gate: &SessionGate,
    identity: &dyn IdentityProvider,
    events: &EventBus,
    count: u64,
) -> Vec<JoinHandle<bool>> {
    let mut deliveries = Vec::new();
    let mut rx = events.subscribe();
    for rated in 0..count {
        let pair = tokio::select! {
            pair = next_pair(session, gate, identity, &mut rx) => pair,
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        };
        if pair.is_none() {
            println!("No pairs available after {} comparisons: {:?}", rated, session.queue().status());
            break;
        }
        if let Some(decision) = session.choose(Choice::Left) {
            println!(
                "{} beat {}",
                decision.outcome.winner_id, decision.outcome.loser_id
            );
            deliveries.push(decision.delivery);
        }
    }
    deliveries
}

fn print_leaderboard(board: &Leaderboard) {
    println!("{} ({} entries)", board.kind.display_name(), board.total_count);
    if board.is_empty() {
        println!("  No rankings published yet");
    }
    for entry in &board.entries {
        println!(
            "  {:>3}. {} rating {:.0} (rd {:.0}), {} battles, {:.1}% won",
            entry.rank,
            entry.id,
            entry.rating,
            entry.deviation,
            entry.battles,
            entry.win_rate() * 100.0
        );
    }
}

fn describe_media(cache: &ItemCache, reference: &str) -> String {
    match cache.peek(reference) {
        Some(media) => format!("{}, {} bytes", media.mime_type, media.len()),
        None => "loading".to_string(),
    }
}

fn print_pair(pair: &Pair, cache: &ItemCache) {
    println!();
    println!(
        "  [1] {} (rating {:.0}, {} battles) [{}]",
        pair.left.id,
        pair.left.rating.rating,
        pair.left.stats.battles,
        describe_media(cache, &pair.left.media_ref)
    );
    println!(
        "  [2] {} (rating {:.0}, {} battles) [{}]",
        pair.right.id,
        pair.right.rating.rating,
        pair.right.stats.battles,
        describe_media(cache, &pair.right.media_ref)
    );
    println!("1/l left, 2/r right, d draw, s skip, q quit");
}

async fn run_interactive(
    session: &RatingSession,
    gate: &SessionGate,
    identity: &dyn IdentityProvider,
    events: &EventBus,
    cache: &ItemCache,
) -> Result<Vec<JoinHandle<bool>>> {
    let mut deliveries = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut rx = events.subscribe();

    loop {
        let pair = tokio::select! {
            pair = next_pair(session, gate, identity, &mut rx) => pair,
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        };
        match pair {
            Some(pair) => print_pair(&pair, cache),
            None => println!(
                "No pair available ({:?}). Enter to retry, q to quit",
                session.queue().status()
            ),
        }

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        };
        let Some(line) = line else { break };

        let choice = match line.trim() {
            "1" | "l" => Choice::Left,
            "2" | "r" => Choice::Right,
            "d" => Choice::Draw,
            "s" => {
                session.skip();
                continue;
            }
            "q" => break,
            _ => continue,
        };
        if let Some(decision) = session.choose(choice) {
            deliveries.push(decision.delivery);
        }
    }
    Ok(deliveries)
}
