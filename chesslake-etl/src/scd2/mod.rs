//! Player rating history as a type 2 slowly changing dimension
//!
//! Every distinct set of tracked attributes becomes a version of the player
//! row with a half-open validity interval `[valid_from, valid_to)` in UTC.
//! Exactly one version per player is current (`valid_to` is NULL), and a
//! closed version is never modified again.
//!
//! Planning is pure ([`plan_merge`]); [`merge`] applies a plan inside one
//! transaction. Storage enforces the same rules with a partial unique index,
//! a CHECK constraint and triggers.

mod audit;
mod store;

pub use audit::{audit, audit_versions, Violation, ViolationKind};
pub use store::{as_of, current, current_all, history, merge, merge_consuming};

use crate::models::{RatingSnapshot, RatingVersion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a snapshot relates to the player's current version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// No version exists yet
    New,
    /// Attributes differ from the current version
    Changed,
    /// Attributes equal the current version
    Unchanged,
    /// Observed before the current version became valid
    Stale,
}

/// Classify a snapshot against the current version
pub fn classify(snapshot: &RatingSnapshot, current: Option<&RatingVersion>) -> ChangeType {
    classify_hash(
        &snapshot.record_hash(),
        snapshot.observed_at,
        current.map(|v| (v.record_hash.as_str(), v.valid_from)),
    )
}

fn classify_hash(hash: &str, observed_at: DateTime<Utc>, tip: Option<(&str, DateTime<Utc>)>) -> ChangeType {
    match tip {
        None => ChangeType::New,
        Some((_, valid_from)) if observed_at < valid_from => ChangeType::Stale,
        Some((tip_hash, _)) if tip_hash == hash => ChangeType::Unchanged,
        Some(_) => ChangeType::Changed,
    }
}

/// Close a stored current version
#[derive(Debug, Clone, PartialEq)]
pub struct CloseVersion {
    pub surrogate_key: i64,
    pub player_key: String,
    pub valid_to: DateTime<Utc>,
}

/// A version to insert; closed already when a later snapshot in the same
/// batch replaced it
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedVersion {
    pub snapshot: RatingSnapshot,
    pub record_hash: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl PlannedVersion {
    pub fn is_current(&self) -> bool {
        self.valid_to.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    pub closes: Vec<CloseVersion>,
    pub inserts: Vec<PlannedVersion>,
    /// Per snapshot, in processing order
    pub changes: Vec<(String, ChangeType)>,
}

/// Merge counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub snapshots: usize,
    pub new_players: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub stale: usize,
    pub versions_inserted: usize,
    pub versions_closed: usize,
}

impl MergePlan {
    pub fn report(&self) -> MergeReport {
        let count = |kind: ChangeType| self.changes.iter().filter(|(_, c)| *c == kind).count();
        MergeReport {
            snapshots: self.changes.len(),
            new_players: count(ChangeType::New),
            changed: count(ChangeType::Changed),
            unchanged: count(ChangeType::Unchanged),
            stale: count(ChangeType::Stale),
            versions_inserted: self.inserts.len(),
            versions_closed: self.closes.len()
                + self.inserts.iter().filter(|v| !v.is_current()).count(),
        }
    }
}

/// Latest version of a player while planning
enum Tip {
    Stored {
        surrogate_key: i64,
        record_hash: String,
        valid_from: DateTime<Utc>,
    },
    Planned {
        index: usize,
        record_hash: String,
        valid_from: DateTime<Utc>,
    },
}

impl Tip {
    fn key(&self) -> (&str, DateTime<Utc>) {
        match self {
            Tip::Stored {
                record_hash,
                valid_from,
                ..
            }
            | Tip::Planned {
                record_hash,
                valid_from,
                ..
            } => (record_hash.as_str(), *valid_from),
        }
    }
}

/// Plan a merge of snapshots into the current versions
///
/// **Algorithm:**
/// 1. Order snapshots by `(observed_at, sequence)`; the later sequence wins a
///    tie because it is applied last
/// 2. Per snapshot, classify against the player's latest version (stored or
///    planned earlier in this batch)
/// 3. `New`: plan a current version from `observed_at`
/// 4. `Changed`: close the latest version at `observed_at` and plan a new
///    current version. A change at exactly the latest `valid_from` leaves the
///    closed version with an empty interval
/// 5. `Unchanged` and `Stale` snapshots change nothing
pub fn plan_merge(current: &[RatingVersion], snapshots: &[RatingSnapshot]) -> MergePlan {
    let mut tips: HashMap<String, Tip> = current
        .iter()
        .filter(|v| v.is_current)
        .map(|v| {
            (
                v.player_key.clone(),
                Tip::Stored {
                    surrogate_key: v.surrogate_key,
                    record_hash: v.record_hash.clone(),
                    valid_from: v.valid_from,
                },
            )
        })
        .collect();

    let mut ordered: Vec<&RatingSnapshot> = snapshots.iter().collect();
    ordered.sort_by(|a, b| {
        a.observed_at
            .cmp(&b.observed_at)
            .then(a.sequence.cmp(&b.sequence))
    });

    let mut plan = MergePlan::default();

    for snapshot in ordered {
        let hash = snapshot.record_hash();
        let change = classify_hash(
            &hash,
            snapshot.observed_at,
            tips.get(&snapshot.player_key).map(Tip::key),
        );

        if change == ChangeType::Changed {
            match tips.get(&snapshot.player_key) {
                Some(Tip::Stored { surrogate_key, .. }) => plan.closes.push(CloseVersion {
                    surrogate_key: *surrogate_key,
                    player_key: snapshot.player_key.clone(),
                    valid_to: snapshot.observed_at,
                }),
                Some(Tip::Planned { index, .. }) => {
                    plan.inserts[*index].valid_to = Some(snapshot.observed_at);
                }
                None => {}
            }
        }

        if matches!(change, ChangeType::New | ChangeType::Changed) {
            tips.insert(
                snapshot.player_key.clone(),
                Tip::Planned {
                    index: plan.inserts.len(),
                    record_hash: hash.clone(),
                    valid_from: snapshot.observed_at,
                },
            );
            plan.inserts.push(PlannedVersion {
                snapshot: snapshot.clone(),
                record_hash: hash,
                valid_from: snapshot.observed_at,
                valid_to: None,
            });
        }

        plan.changes.push((snapshot.player_key.clone(), change));
    }

    plan
}
