//! chesslake - medallion ETL for Chess.com and Lichess data
//!
//! Lands raw API payloads into bronze, cleanses games into silver, keeps a
//! versioned rating history and rebuilds the gold fact table.

use anyhow::{bail, Context, Result};
use chesslake_common::config::{resolve_data_root, DataRoot, TomlConfig};
use chesslake_common::{player_key, Platform, TrackedPlayers};
use chesslake_etl::bronze::{land, Dataset, LandingRequest, PayloadFormat};
use chesslake_etl::gold;
use chesslake_etl::models::{RatingVersion, TimeClass};
use chesslake_etl::pipeline::{recent_runs, Pipeline, PipelineConfig, PipelineEvent, RunOptions};
use chesslake_etl::scd2;
use chesslake_etl::silver::games::{count_games, list_quarantine};
use chesslake_etl::{open_lake, Lake};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "chesslake")]
#[command(about = "Medallion ETL for Chess.com and Lichess player data")]
#[command(version)]
struct Args {
    /// Root folder holding the database and landing zone (env: CHESSLAKE_DATA_ROOT)
    #[arg(short, long)]
    data_root: Option<PathBuf>,

    /// Bootstrap TOML config file (env: CHESSLAKE_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// YAML file naming the tracked players
    #[arg(short, long)]
    players: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Land one payload file into bronze
    Ingest {
        file: PathBuf,
        /// chesscom or lichess
        #[arg(long)]
        platform: Platform,
        /// profile, stats or games
        #[arg(long)]
        dataset: Dataset,
        #[arg(long)]
        username: String,
        /// json, ndjson or pgn (detected when omitted)
        #[arg(long)]
        format: Option<PayloadFormat>,
        #[arg(long)]
        source_uri: Option<String>,
    },
    /// Land every file of a drop directory (<platform>/<username>/<dataset>.<ext>)
    IngestDir { dir: PathBuf },
    /// Transform unprocessed game payloads into silver
    Silver,
    /// Extract rating snapshots and merge them into the rating history
    Ratings,
    /// Rebuild the gold fact table for the tracked players
    Gold,
    /// Run every stage in order
    Run {
        #[arg(long)]
        drop_dir: Option<PathBuf>,
    },
    /// Show a player's rating history
    History {
        username: String,
        /// chesscom or lichess
        #[arg(long)]
        platform: Platform,
        /// Show only the version valid at this RFC3339 instant
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
    /// Check the rating history for integrity violations
    Audit,
    /// Print the analytics report
    Report {
        /// Minimum games for an opening to be listed
        #[arg(long, default_value_t = 3)]
        min_games: i64,
        /// Restrict color performance and rating progression to one time class
        #[arg(long)]
        time_class: Option<TimeClass>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load_or_default(args.config.as_deref()).context("Failed to load config")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chesslake={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_root = DataRoot::new(resolve_data_root(args.data_root.as_deref(), &config));
    info!("Data root: {}", data_root.path().display());

    let lake = open_lake(&data_root, &config.database)
        .await
        .context("Failed to open data root")?;
    let players = load_players(&config, &data_root, args.players.as_deref())?;

    match args.command {
        Command::Ingest {
            file,
            platform,
            dataset,
            username,
            format,
            source_uri,
        } => {
            let format = format.or_else(|| {
                file.extension()
                    .and_then(|e| e.to_str())
                    .and_then(PayloadFormat::from_extension)
            });
            let payload = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let request = LandingRequest {
                platform,
                dataset,
                username,
                format,
                source_uri: source_uri.or_else(|| Some(file.display().to_string())),
                payload,
            };

            let outcome = land(&lake.pool, &lake.zone, request).await?;
            let record = outcome.record();
            let verb = if outcome.is_new() { "Landed" } else { "Already landed" };
            println!("{} {} ({})", verb, record.record_id, record.landing_path);
        }
        Command::IngestDir { dir } => {
            let report = pipeline(&lake, &config, players).ingest_dir(&dir).await?;
            println!(
                "{} landed, {} already landed, {} failed, {} unrecognised",
                report.landed, report.already_landed, report.failed, report.unrecognised
            );
        }
        Command::Silver => {
            let report = pipeline(&lake, &config, players).silver_games().await?;
            println!(
                "{} records: {} loaded, {} duplicates, {} quarantined, {} skipped, {} warnings",
                report.records, report.loaded, report.duplicates, report.quarantined, report.skipped, report.warnings
            );
        }
        Command::Ratings => {
            let report = pipeline(&lake, &config, players).silver_ratings().await?;
            println!(
                "{} snapshots: {} new players, {} changed, {} unchanged, {} stale; {} versions inserted, {} closed",
                report.snapshots,
                report.new_players,
                report.changed,
                report.unchanged,
                report.stale,
                report.versions_inserted,
                report.versions_closed
            );
        }
        Command::Gold => {
            let rows = pipeline(&lake, &config, players).gold().await?;
            println!("{} fact rows", rows);
        }
        Command::Run { drop_dir } => {
            let (event_tx, mut event_rx) = mpsc::channel(16);
            let pipeline = pipeline(&lake, &config, players).with_events(event_tx);

            let watcher = tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    match event {
                        PipelineEvent::StageStarted { stage } => info!(?stage, "Stage started"),
                        PipelineEvent::StageCompleted { stage, detail } => {
                            info!(?stage, %detail, "Stage completed")
                        }
                    }
                }
            });

            let summary = pipeline.run(&RunOptions { drop_dir }).await?;
            drop(pipeline);
            let _ = watcher.await;

            println!("{}", serde_json::to_string_pretty(&summary)?);
            if !summary.violations.is_empty() {
                bail!("Run {} finished with {} history violations", summary.run_id, summary.violations.len());
            }
        }
        Command::History {
            username,
            platform,
            as_of,
        } => {
            let key = player_key(&username, platform);
            match as_of {
                Some(at) => match scd2::as_of(&lake.pool, &key, at).await? {
                    Some(version) => print_version(&version),
                    None => println!("No version of {} valid at {}", key, at),
                },
                None => {
                    let versions = scd2::history(&lake.pool, &key).await?;
                    if versions.is_empty() {
                        println!("No rating history for {}", key);
                    }
                    for version in &versions {
                        print_version(version);
                    }
                }
            }
        }
        Command::Audit => {
            let violations = scd2::audit(&lake.pool).await?;
            if violations.is_empty() {
                println!("Rating history is consistent");
            } else {
                for violation in &violations {
                    println!("{}", violation);
                }
                bail!("{} history violations", violations.len());
            }
        }
        Command::Report { min_games, time_class } => {
            report(&lake, &players, min_games, time_class).await?;
        }
    }

    Ok(())
}

/// Players file: CLI, then TOML `players_file`, then `players.yaml` in the data root
fn load_players(config: &TomlConfig, data_root: &DataRoot, cli_path: Option<&Path>) -> Result<TrackedPlayers> {
    let path = match cli_path.map(Path::to_path_buf).or_else(|| config.players_file.clone()) {
        Some(path) => path,
        None => {
            let fallback = data_root.path().join("players.yaml");
            if !fallback.exists() {
                return Ok(TrackedPlayers::default());
            }
            fallback
        }
    };
    let players = TrackedPlayers::load(&path).with_context(|| format!("Failed to load players from {}", path.display()))?;
    info!(players = players.len(), "Loaded tracked players from {}", path.display());
    Ok(players)
}

fn pipeline(lake: &Lake, config: &TomlConfig, players: TrackedPlayers) -> Pipeline {
    Pipeline::new(lake.pool.clone(), lake.zone.clone(), players, PipelineConfig::from(config))
}

fn print_version(version: &RatingVersion) {
    let fmt_rating = |r: Option<i64>| r.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string());
    let until = version
        .valid_to
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "current".to_string());
    println!(
        "#{} {} .. {}  bullet {} blitz {} rapid {} classical {}  games {} ({:.1}% won)",
        version.surrogate_key,
        version.valid_from.to_rfc3339(),
        until,
        fmt_rating(version.attributes.rating_bullet),
        fmt_rating(version.attributes.rating_blitz),
        fmt_rating(version.attributes.rating_rapid),
        fmt_rating(version.attributes.rating_classical),
        version.attributes.games_played,
        version.win_rate,
    );
}

async fn report(lake: &Lake, players: &TrackedPlayers, min_games: i64, time_class: Option<TimeClass>) -> Result<()> {
    println!("== Openings (min {} games) ==", min_games);
    for row in gold::opening_performance(&lake.pool, min_games).await? {
        println!(
            "{:<40} {:>4} games  +{} ={} -{}  {:.1}% won",
            row.opening_name, row.games, row.wins, row.draws, row.losses, row.win_rate
        );
    }

    println!("\n== By color ==");
    for row in gold::performance_by_color(&lake.pool, time_class).await? {
        println!(
            "{:<6} {:>4} games  +{} ={} -{}  {:.1}% won",
            row.color, row.games, row.wins, row.draws, row.losses, row.win_rate
        );
    }

    println!("\n== Accuracy by result ==");
    for row in gold::accuracy_by_result(&lake.pool).await? {
        println!(
            "{:<8} {:>4} games  avg {:.1}  min {:.1}  max {:.1}",
            row.result, row.games, row.avg_accuracy, row.min_accuracy, row.max_accuracy
        );
    }

    let progression_class = time_class.unwrap_or(TimeClass::Blitz);
    for player in players.iter() {
        let points = gold::rating_progression(&lake.pool, &player.player_key(), progression_class).await?;
        if points.is_empty() {
            continue;
        }
        println!("\n== {} rating: {} ==", progression_class, player.player_key());
        for point in points {
            println!("{}  {:>5}  ({} games)", point.date, point.rating, point.games);
        }
    }

    println!("\n== Silver ==");
    println!("{} games, {} quarantined", count_games(&lake.pool).await?, list_quarantine(&lake.pool).await?.len());

    println!("\n== Recent runs ==");
    for run in recent_runs(&lake.pool, 5).await? {
        println!(
            "{}  {}  {}",
            run.started_at,
            run.status,
            run.finished_at.unwrap_or_else(|| "-".to_string())
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_ingest_arguments_are_typed() {
        let args = Args::try_parse_from([
            "chesslake",
            "ingest",
            "stats.json",
            "--platform",
            "chess.com",
            "--dataset",
            "stats",
            "--username",
            "alice",
            "--format",
            "json",
        ])
        .unwrap();

        let Command::Ingest {
            platform,
            dataset,
            format,
            ..
        } = args.command
        else {
            panic!("expected ingest, got {:?}", args.command);
        };
        assert_eq!(platform, Platform::Chesscom);
        assert_eq!(dataset, Dataset::Stats);
        assert_eq!(format, Some(PayloadFormat::Json));
    }

    #[test]
    fn test_invalid_values_are_rejected_by_clap() {
        let bad_platform = Args::try_parse_from([
            "chesslake", "ingest", "x.json", "--platform", "fics", "--dataset", "stats", "--username", "a",
        ]);
        assert_eq!(bad_platform.unwrap_err().kind(), ErrorKind::ValueValidation);

        let bad_dataset = Args::try_parse_from([
            "chesslake", "ingest", "x.json", "--platform", "lichess", "--dataset", "puzzles", "--username", "a",
        ]);
        assert_eq!(bad_dataset.unwrap_err().kind(), ErrorKind::ValueValidation);

        let bad_time_class = Args::try_parse_from(["chesslake", "report", "--time-class", "hyper"]);
        assert_eq!(bad_time_class.unwrap_err().kind(), ErrorKind::ValueValidation);

        let bad_instant = Args::try_parse_from([
            "chesslake", "history", "alice", "--platform", "lichess", "--as-of", "yesterday",
        ]);
        assert_eq!(bad_instant.unwrap_err().kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_history_as_of_parses_rfc3339() {
        let args = Args::try_parse_from([
            "chesslake", "history", "alice_lc", "--platform", "lichess", "--as-of", "2024-05-20T00:00:00Z",
        ])
        .unwrap();
        let Command::History { as_of, .. } = args.command else {
            panic!("expected history");
        };
        assert_eq!(as_of.map(|t| t.to_rfc3339()), Some("2024-05-20T00:00:00+00:00".to_string()));
    }
}
