use agents::ExternalScorer;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use engine::{EngineConfig, Explanation, PlayEvent, RecommendationManager};
use music_library::{now_millis, LibraryStore, Recommendation, Song, SongId, SqliteStore};
use profile_model::ProfileModel;
use rand::seq::IndexedRandom;
use sequence::{SkipEvent, SkipPattern};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Playwise - on-device music recommendations
#[derive(Parser)]
#[command(name = "playwise")]
#[command(about = "Learns from your listening and suggests what to play next", long_about = None)]
struct Cli {
    /// SQLite database holding the library and everything learned from it
    #[arg(long, default_value = "playwise.db3")]
    db: PathBuf,

    /// Optional TOML file overriding engine tuning
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the profile model (defaults to `model/` next to the database)
    #[arg(long)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a catalog and, optionally, a listening history
    Import {
        /// catalog.json
        #[arg(long)]
        catalog: PathBuf,

        /// history.json, replayed in chronological order
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Show quick picks
    Recommend {
        #[arg(long, default_value = "10")]
        count: usize,

        /// Show the reason for each pick
        #[arg(long)]
        explain: bool,
    },

    /// Predict what usually follows a song
    Next {
        #[arg(long)]
        current: SongId,

        #[arg(long, default_value = "5")]
        count: usize,

        /// Songs that must not be suggested
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<SongId>,
    },

    /// Record a completed play
    Play {
        #[arg(long)]
        song: SongId,

        /// Song that was playing before
        #[arg(long)]
        after: Option<SongId>,

        /// Listened time; defaults to the whole song
        #[arg(long)]
        listened_ms: Option<u64>,

        /// The user replayed this transition on purpose
        #[arg(long)]
        repeat: bool,
    },

    /// Record a skip
    Skip {
        #[arg(long)]
        song: SongId,

        #[arg(long)]
        after: Option<SongId>,

        #[arg(long)]
        listened_ms: u64,
    },

    /// Songs skipped far more often than played
    Avoid {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Best-connected songs in the transition graph
    Hubs {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Songs played together in both directions
    Pairs {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Break down one song's score
    Explain {
        #[arg(long)]
        song: SongId,
    },

    /// Retrain the collaborative neighbourhood and the profile model
    Train,

    /// Decay and prune transitions, drop vanished files, retrain
    Maintain,

    /// Forget history, preferences, transitions and the model; keep the catalog
    Reset,

    /// Measure recommendation latency under concurrent load
    Benchmark {
        #[arg(long, default_value = "100")]
        requests: usize,

        #[arg(long, default_value = "10")]
        concurrent: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let manager = open_engine(&cli).await?;

    match cli.command {
        Commands::Import { catalog, history } => handle_import(&manager, &catalog, history.as_deref()).await?,
        Commands::Recommend { count, explain } => handle_recommend(&manager, count, explain).await?,
        Commands::Next {
            current,
            count,
            exclude,
        } => handle_next(&manager, &current, count, &exclude).await?,
        Commands::Play {
            song,
            after,
            listened_ms,
            repeat,
        } => handle_play(&manager, song, after, listened_ms, repeat).await?,
        Commands::Skip {
            song,
            after,
            listened_ms,
        } => handle_skip(&manager, song, after, listened_ms).await?,
        Commands::Avoid { limit } => handle_avoid(&manager, limit).await?,
        Commands::Hubs { limit } => handle_hubs(&manager, limit).await?,
        Commands::Pairs { limit } => handle_pairs(&manager, limit).await?,
        Commands::Explain { song } => handle_explain(&manager, &song).await?,
        Commands::Train => handle_train(&manager).await?,
        Commands::Maintain => handle_maintain(&manager).await?,
        Commands::Reset => handle_reset(&manager).await?,
        Commands::Benchmark {
            requests,
            concurrent,
        } => handle_benchmark(&manager, requests, concurrent).await?,
    }

    manager.shutdown();
    Ok(())
}

async fn open_engine(cli: &Cli) -> Result<RecommendationManager> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let store = Arc::new(
        SqliteStore::open(&cli.db)
            .with_context(|| format!("Failed to open database {}", cli.db.display()))?,
    );

    let model_dir = cli.model_dir.clone().unwrap_or_else(|| default_model_dir(&cli.db));
    info!("Profile model directory: {}", model_dir.display());
    let model: Arc<dyn ExternalScorer> = Arc::new(
        ProfileModel::open(&model_dir, config.profile.clone())
            .with_context(|| format!("Failed to open profile model in {}", model_dir.display()))?,
    );

    RecommendationManager::init(store, config, Some(model))
        .await
        .context("Failed to start recommendation engine")
}

fn default_model_dir(db: &Path) -> PathBuf {
    db.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("model")
}

async fn require_song(manager: &RecommendationManager, song_id: &str) -> Result<Song> {
    manager
        .store()
        .song(song_id)
        .await?
        .ok_or_else(|| anyhow!("Song {} not found", song_id))
}

async fn song_label(manager: &RecommendationManager, song_id: &str) -> String {
    match manager.store().song(song_id).await {
        Ok(Some(song)) => format!("{} - {}", song.artist, song.title),
        _ => song_id.to_string(),
    }
}

/// Handle the 'import' command
async fn handle_import(manager: &RecommendationManager, catalog: &Path, history: Option<&Path>) -> Result<()> {
    let start = Instant::now();
    let report = manager
        .import_library(catalog, history)
        .await
        .context("Import failed")?;
    println!(
        "{} Imported {} songs, replayed {} plays and {} skips in {:.2?}",
        "✓".green(),
        report.songs,
        report.plays,
        report.skips,
        start.elapsed()
    );
    Ok(())
}

/// Handle the 'recommend' command
async fn handle_recommend(manager: &RecommendationManager, count: usize, explain: bool) -> Result<()> {
    let picks = manager.generate_recommendations(count).await?;
    if picks.is_empty() {
        println!("{}", "Library is empty, import a catalog first".yellow());
        return Ok(());
    }
    print_recommendations(manager, "Quick Picks:", &picks, explain).await;
    Ok(())
}

/// Handle the 'next' command
async fn handle_next(manager: &RecommendationManager, current: &str, count: usize, exclude: &[SongId]) -> Result<()> {
    require_song(manager, current).await?;
    let candidates = manager.next_song_candidates(current, exclude, count);
    if candidates.is_empty() {
        println!("{}", "No learned transitions from this song yet".yellow());
        return Ok(());
    }
    let title = format!("Usually played after {}:", song_label(manager, current).await);
    print_recommendations(manager, &title, &candidates, true).await;

    if let Some(pick) = manager.select_next_song(current, exclude) {
        println!("{} {}", "Suggested next:".bold(), song_label(manager, &pick).await.cyan());
    }
    Ok(())
}

/// Handle the 'play' command
async fn handle_play(
    manager: &RecommendationManager,
    song_id: SongId,
    after: Option<SongId>,
    listened_ms: Option<u64>,
    repeat: bool,
) -> Result<()> {
    let song = require_song(manager, &song_id).await?;
    let mut event = PlayEvent::new(
        song_id,
        listened_ms.unwrap_or(song.duration_ms),
        song.duration_ms,
        now_millis(),
    );
    if let Some(previous) = after {
        event = event.after(previous);
    }
    if repeat {
        event = event.repeated();
    }

    let record = manager.on_song_completed(event).await?;
    println!(
        "{} {} ({} plays, {} skips, like {:+.2})",
        "▶".green(),
        format!("{} - {}", song.artist, song.title).bold(),
        record.play_count,
        record.skip_count,
        record.like_score()
    );
    Ok(())
}

/// Handle the 'skip' command
async fn handle_skip(
    manager: &RecommendationManager,
    song_id: SongId,
    after: Option<SongId>,
    listened_ms: u64,
) -> Result<()> {
    let song = require_song(manager, &song_id).await?;
    let outcome = manager
        .on_song_skipped(SkipEvent {
            song_id,
            previous_song_id: after,
            listen_duration_ms: listened_ms,
            total_duration_ms: song.duration_ms,
            timestamp: now_millis(),
        })
        .await?;

    println!(
        "{} {} {:?} skip at {:.0}% (penalty {:.2}, like {:+.2})",
        "⏭".yellow(),
        format!("{} - {}", song.artist, song.title).bold(),
        outcome.skip_type,
        outcome.completion_rate * 100.0,
        outcome.penalty,
        outcome.like_score
    );
    if outcome.pattern != SkipPattern::None {
        println!("{} {}", "Skip pattern:".bold(), outcome.pattern.as_str().red());
    }
    Ok(())
}

/// Handle the 'avoid' command
async fn handle_avoid(manager: &RecommendationManager, limit: usize) -> Result<()> {
    let songs = manager.songs_to_avoid(limit).await?;
    println!("{}", "Songs to avoid:".bold().blue());
    if songs.is_empty() {
        println!("  none");
    }
    for (rank, song_id) in songs.iter().enumerate() {
        println!("{}. {}", (rank + 1).to_string().red(), song_label(manager, song_id).await);
    }
    Ok(())
}

/// Handle the 'hubs' command
async fn handle_hubs(manager: &RecommendationManager, limit: usize) -> Result<()> {
    let hubs = manager.hub_songs(limit);
    println!("{}", "Hub songs:".bold().blue());
    for (rank, (song_id, strength)) in hubs.iter().enumerate() {
        println!(
            "{}. {} - strength {:.2}",
            (rank + 1).to_string().green(),
            song_label(manager, song_id).await,
            strength
        );
    }
    Ok(())
}

/// Handle the 'pairs' command
async fn handle_pairs(manager: &RecommendationManager, limit: usize) -> Result<()> {
    let pairs = manager.magnetic_pairs(limit);
    println!("{}", "Magnetic pairs:".bold().blue());
    for (rank, pair) in pairs.iter().enumerate() {
        println!(
            "{}. {} <-> {} ({:.2} / {:.2})",
            (rank + 1).to_string().green(),
            song_label(manager, &pair.first).await,
            song_label(manager, &pair.second).await,
            pair.forward_weight,
            pair.backward_weight
        );
    }
    Ok(())
}

/// Handle the 'explain' command
async fn handle_explain(manager: &RecommendationManager, song_id: &str) -> Result<()> {
    let explanation = manager
        .explain_song(song_id)
        .await?
        .ok_or_else(|| anyhow!("Song {} not found", song_id))?;
    print_explanation(&explanation);
    Ok(())
}

/// Handle the 'train' command
async fn handle_train(manager: &RecommendationManager) -> Result<()> {
    let report = manager.train_models().await?;
    println!(
        "{} Collaborative model: {} songs",
        "✓".green(),
        report.collaborative_songs
    );
    if report.external_trained {
        println!("{} Profile model: {} samples", "✓".green(), report.external_samples);
    } else {
        println!(
            "{} Profile model not trained ({} samples, need {})",
            "•".yellow(),
            report.external_samples,
            manager.config().maintenance.training_min_samples
        );
    }
    Ok(())
}

/// Handle the 'maintain' command
async fn handle_maintain(manager: &RecommendationManager) -> Result<()> {
    let summary = manager.perform_maintenance().await?;
    println!(
        "{} Transitions: {} decayed, {} pruned, {} remaining",
        "✓".green(),
        summary.transitions.decayed,
        summary.transitions.pruned,
        summary.transitions.remaining
    );
    for song_id in &summary.removed_songs {
        println!("  removed {} (file is gone)", song_id.red());
    }
    println!(
        "{} Retrained on {} songs (profile model: {})",
        "✓".green(),
        summary.training.collaborative_songs,
        if summary.training.external_trained { "yes" } else { "no" }
    );
    Ok(())
}

/// Handle the 'reset' command
async fn handle_reset(manager: &RecommendationManager) -> Result<()> {
    manager.clear_model_data().await?;
    println!("{} Learned state cleared, catalog kept", "✓".green());
    Ok(())
}

/// Handle the 'benchmark' command
async fn handle_benchmark(manager: &RecommendationManager, requests: usize, concurrent: usize) -> Result<()> {
    if requests == 0 {
        return Err(anyhow!("Need at least one request"));
    }
    let songs: Vec<SongId> = manager.store().catalog().await?.into_iter().map(|s| s.id).collect();
    if songs.is_empty() {
        return Err(anyhow!("Library is empty, import a catalog first"));
    }

    let start = Instant::now();
    let mut timings: Vec<Duration> = Vec::with_capacity(requests);
    let mut handles = Vec::new();
    for i in 0..requests {
        let manager = manager.clone();
        // every other request is a next-song lookup from a random song
        let current = songs.choose(&mut rand::rng()).cloned();
        handles.push(tokio::spawn(async move {
            let start = Instant::now();
            match current {
                Some(current) if i % 2 == 1 => {
                    manager.next_song_candidates(&current, &[], 5);
                }
                _ => {
                    manager.generate_recommendations(20).await?;
                }
            }
            Ok::<_, anyhow::Error>(start.elapsed())
        }));

        if handles.len() >= concurrent.max(1) {
            for handle in handles.drain(..) {
                timings.push(handle.await??);
            }
        }
    }
    for handle in handles {
        timings.push(handle.await??);
    }

    let total_time = start.elapsed();
    timings.sort();
    let avg_latency = timings.iter().sum::<Duration>() / timings.len() as u32;
    let percentile = |p: f64| timings[((timings.len() as f64 * p) as usize).min(timings.len() - 1)];

    println!("{}", "Benchmark results:".bold().blue());
    println!("Requests: {} ({} concurrent)", requests, concurrent.max(1));
    println!("Total time: {:.2?}", total_time);
    println!("Average latency: {:.2?}", avg_latency);
    println!("P50 latency: {:.2?}", percentile(0.50));
    println!("P95 latency: {:.2?}", percentile(0.95));
    println!("P99 latency: {:.2?}", percentile(0.99));
    println!(
        "Throughput: {:.2} requests/second",
        requests as f64 / total_time.as_secs_f64()
    );
    Ok(())
}

async fn print_recommendations(
    manager: &RecommendationManager,
    title: &str,
    recommendations: &[Recommendation],
    explain: bool,
) {
    println!("{}", title.bold().blue());
    for (rank, rec) in recommendations.iter().enumerate() {
        println!(
            "{}. {} - Score: {:.1} (confidence {:.0})",
            (rank + 1).to_string().green(),
            song_label(manager, &rec.song_id).await,
            rec.score,
            rec.confidence
        );
        if explain {
            println!("   {}", rec.reason.dimmed());
        }
    }
}

fn print_explanation(explanation: &Explanation) {
    let song = &explanation.song;
    println!("{}", format!("{} - {}", song.artist, song.title).bold().blue());
    if let Some(genre) = &song.genre {
        println!("{}Genre: {}", "• ".green(), genre);
    }
    match &explanation.preference {
        Some(record) => println!(
            "{}History: {} plays, {} skips, {:.0}% avg completion, like {:+.2}",
            "• ".green(),
            record.play_count,
            record.skip_count,
            record.avg_completion_rate * 100.0,
            record.like_score()
        ),
        None => println!("{}History: never played", "• ".green()),
    }

    println!("{}", "Features:".bold());
    for (feature, value) in music_library::Feature::ALL
        .iter()
        .zip(explanation.features.as_slice())
    {
        println!("  {:<18} {:.3}", format!("{:?}", feature), value);
    }

    println!("{}", "Scores:".bold());
    println!(
        "  statistical    {:5.1} (confidence {:.0})",
        explanation.statistical.score, explanation.statistical.confidence
    );
    println!(
        "  collaborative  {:5.1} (confidence {:.0})",
        explanation.collaborative.score, explanation.collaborative.confidence
    );
    match &explanation.external {
        Some(external) => println!(
            "  profile model  {:5.1} (confidence {:.0}){}",
            external.score,
            external.confidence,
            if explanation.external_used { "" } else { " below gate, ignored" }
        ),
        None => println!("  profile model  {}", "no answer".dimmed()),
    }
    if let Some(cluster) = explanation.cluster {
        println!("  cluster        {}", cluster);
    }
    println!("  sequence       {:.2}", explanation.sequence_strength);
    println!(
        "{} {:.1} (confidence {:.0}) - {}",
        "Fused:".bold(),
        explanation.fused.score,
        explanation.fused.confidence,
        explanation.fused.reason
    );
}
