//! Pipeline orchestrator
//!
//! Runs the medallion stages in order, each incremental:
//! - **Stage 0**: Ingest a drop directory into bronze (optional)
//! - **Stage 1**: Silver games from unprocessed `games` records
//! - **Stage 2**: Rating snapshots merged into the SCD2 history
//! - **Stage 3**: Gold fact table rebuild
//! - **Stage 4**: Rating history audit
//!
//! A run is recorded in `pipeline_runs` with its summary. Re-running over the
//! same bronze data lands nothing, loads nothing and creates no versions.
//!
//! # Example
//! ```rust,ignore
//! let pipeline = Pipeline::new(pool, zone, players, PipelineConfig::default());
//! let summary = pipeline.run(&RunOptions { drop_dir: Some(dir) }).await?;
//! ```

use crate::bronze::{land, scan_drop_dir, LandingZone};
use crate::gold;
use crate::scd2::{self, MergeReport, Violation};
use crate::silver::{self, GamesReport};
use chesslake_common::config::{QualityConfig, TomlConfig};
use chesslake_common::{time, Result, TrackedPlayers};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub quality: QualityConfig,
    /// Upper bound on lock-contention retries per transaction
    pub max_lock_wait_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&TomlConfig::default())
    }
}

impl From<&TomlConfig> for PipelineConfig {
    fn from(config: &TomlConfig) -> Self {
        Self {
            quality: config.quality.clone(),
            max_lock_wait_ms: config.database.max_lock_wait_ms,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Ingest this drop directory before the silver stages
    pub drop_dir: Option<PathBuf>,
}

/// Pipeline stages, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    SilverGames,
    SilverRatings,
    Gold,
    Audit,
}

/// Progress notifications
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StageStarted { stage: Stage },
    StageCompleted { stage: Stage, detail: String },
}

/// Drop directory ingest counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub landed: usize,
    pub already_landed: usize,
    pub failed: usize,
    /// Files that did not match the drop layout
    pub unrecognised: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub ingest: Option<IngestReport>,
    pub games: GamesReport,
    pub ratings: MergeReport,
    pub gold_rows: u64,
    pub violations: Vec<Violation>,
}

impl RunSummary {
    pub fn status(&self) -> &'static str {
        if self.violations.is_empty() {
            "succeeded"
        } else {
            "violations"
        }
    }
}

pub struct Pipeline {
    pool: SqlitePool,
    zone: LandingZone,
    players: TrackedPlayers,
    config: PipelineConfig,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl Pipeline {
    pub fn new(pool: SqlitePool, zone: LandingZone, players: TrackedPlayers, config: PipelineConfig) -> Self {
        Self {
            pool,
            zone,
            players,
            config,
            event_tx: None,
        }
    }

    /// Report stage progress on a channel
    pub fn with_events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn zone(&self) -> &LandingZone {
        &self.zone
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            // Receiver gone means nobody is watching; the run continues
            let _ = tx.send(event).await;
        }
    }

    /// Land every recognised file of a drop directory
    ///
    /// A file that fails to land is logged and counted; the rest continue.
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestReport> {
        let scan = scan_drop_dir(dir)?;
        let mut report = IngestReport {
            unrecognised: scan.skipped.len(),
            ..Default::default()
        };

        for (path, reason) in &scan.skipped {
            warn!(path = %path.display(), %reason, "Unrecognised drop file");
        }

        for file in scan.files {
            let path = file.path.clone();
            let outcome = match file.into_request() {
                Ok(request) => land(&self.pool, &self.zone, request).await,
                Err(e) => Err(e.into()),
            };
            match outcome {
                Ok(outcome) if outcome.is_new() => report.landed += 1,
                Ok(_) => report.already_landed += 1,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to land drop file");
                    report.failed += 1;
                }
            }
        }

        info!(
            landed = report.landed,
            already_landed = report.already_landed,
            failed = report.failed,
            unrecognised = report.unrecognised,
            "Drop directory ingested"
        );
        Ok(report)
    }

    pub async fn silver_games(&self) -> Result<GamesReport> {
        silver::transform_games(&self.pool, &self.zone, &self.config.quality, self.config.max_lock_wait_ms).await
    }

    pub async fn silver_ratings(&self) -> Result<MergeReport> {
        silver::update_ratings(&self.pool, &self.zone, self.config.max_lock_wait_ms).await
    }

    pub async fn gold(&self) -> Result<u64> {
        gold::rebuild_fact_games(&self.pool, &self.players).await
    }

    /// Run every stage and record the run
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = time::now();
        self.record_start(run_id, started_at).await?;
        info!(%run_id, "Pipeline run started");

        match self.run_stages(run_id, started_at, options).await {
            Ok(summary) => {
                let json = serde_json::to_string(&summary)?;
                self.record_finish(run_id, summary.status(), &json).await?;
                info!(
                    %run_id,
                    status = summary.status(),
                    games_loaded = summary.games.loaded,
                    versions_inserted = summary.ratings.versions_inserted,
                    gold_rows = summary.gold_rows,
                    "Pipeline run finished"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(%run_id, error = %e, "Pipeline run failed");
                if let Err(record_err) = self.record_finish(run_id, "failed", &e.to_string()).await {
                    error!(%run_id, error = %record_err, "Failed to record pipeline failure");
                }
                Err(e)
            }
        }
    }

    async fn run_stages(&self, run_id: Uuid, started_at: DateTime<Utc>, options: &RunOptions) -> Result<RunSummary> {
        let ingest = match &options.drop_dir {
            Some(dir) => {
                self.emit(PipelineEvent::StageStarted { stage: Stage::Ingest }).await;
                let report = self.ingest_dir(dir).await?;
                self.emit(PipelineEvent::StageCompleted {
                    stage: Stage::Ingest,
                    detail: format!("{} landed, {} already landed", report.landed, report.already_landed),
                })
                .await;
                Some(report)
            }
            None => None,
        };

        self.emit(PipelineEvent::StageStarted { stage: Stage::SilverGames }).await;
        let games = self.silver_games().await?;
        self.emit(PipelineEvent::StageCompleted {
            stage: Stage::SilverGames,
            detail: format!("{} loaded, {} quarantined", games.loaded, games.quarantined),
        })
        .await;

        self.emit(PipelineEvent::StageStarted { stage: Stage::SilverRatings }).await;
        let ratings = self.silver_ratings().await?;
        self.emit(PipelineEvent::StageCompleted {
            stage: Stage::SilverRatings,
            detail: format!("{} versions inserted", ratings.versions_inserted),
        })
        .await;

        self.emit(PipelineEvent::StageStarted { stage: Stage::Gold }).await;
        let gold_rows = self.gold().await?;
        self.emit(PipelineEvent::StageCompleted {
            stage: Stage::Gold,
            detail: format!("{} fact rows", gold_rows),
        })
        .await;

        self.emit(PipelineEvent::StageStarted { stage: Stage::Audit }).await;
        let violations = scd2::audit(&self.pool).await?;
        self.emit(PipelineEvent::StageCompleted {
            stage: Stage::Audit,
            detail: format!("{} violations", violations.len()),
        })
        .await;

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at: time::now(),
            ingest,
            games,
            ratings,
            gold_rows,
            violations,
        })
    }

    async fn record_start(&self, run_id: Uuid, started_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO pipeline_runs (run_id, started_at, status) VALUES (?, ?, 'running')")
            .bind(run_id.to_string())
            .bind(time::to_db(&started_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_finish(&self, run_id: Uuid, status: &str, summary: &str) -> Result<()> {
        sqlx::query("UPDATE pipeline_runs SET finished_at = ?, status = ?, summary = ? WHERE run_id = ?")
            .bind(time::to_db(&time::now()))
            .bind(status)
            .bind(summary)
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// A row of `pipeline_runs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub summary: Option<String>,
}

/// Most recent runs first
pub async fn recent_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<RunRecord>> {
    use sqlx::Row;

    let rows = sqlx::query(
        "SELECT run_id, started_at, finished_at, status, summary
         FROM pipeline_runs ORDER BY started_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| RunRecord {
            run_id: row.get("run_id"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
            status: row.get("status"),
            summary: row.get("summary"),
        })
        .collect())
}
