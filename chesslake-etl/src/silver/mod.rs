//! Silver layer: cleansed games, quarantine and rating snapshots

pub mod games;
pub mod quality;
pub mod snapshots;

pub use games::{transform_games, GamesReport};
pub use quality::{check_game, QualityIssue, Severity};
pub use snapshots::{extract_snapshots, update_ratings, Consumed, SnapshotBatch};
