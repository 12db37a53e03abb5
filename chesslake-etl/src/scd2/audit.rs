//! Rating history integrity audit

use super::store::all_versions;
use crate::models::RatingVersion;
use chesslake_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    DuplicateCurrent,
    MissingCurrent,
    CurrentWithValidTo,
    ClosedWithoutValidTo,
    InvertedInterval,
    Overlap,
    Gap,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViolationKind::DuplicateCurrent => "duplicate current rows",
            ViolationKind::MissingCurrent => "no current row",
            ViolationKind::CurrentWithValidTo => "current row with valid_to",
            ViolationKind::ClosedWithoutValidTo => "closed row without valid_to",
            ViolationKind::InvertedInterval => "valid_to before valid_from",
            ViolationKind::Overlap => "overlapping versions",
            ViolationKind::Gap => "gap between versions",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub player_key: String,
    pub kind: ViolationKind,
    pub surrogate_keys: Vec<i64>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (rows {:?})", self.player_key, self.kind, self.surrogate_keys)
    }
}

/// Audit every player's history in the database
pub async fn audit(pool: &SqlitePool) -> Result<Vec<Violation>> {
    let versions = all_versions(pool).await?;
    let violations = audit_versions(&versions);

    if violations.is_empty() {
        tracing::info!(rows = versions.len(), "Rating history audit passed");
    } else {
        for violation in &violations {
            tracing::error!(%violation, "Rating history violation");
        }
    }

    Ok(violations)
}

/// Audit a set of versions
///
/// Per player, versions are ordered by `(valid_from, surrogate_key)` and each
/// closed version's `valid_to` must equal the next version's `valid_from`.
pub fn audit_versions(versions: &[RatingVersion]) -> Vec<Violation> {
    let mut by_player: BTreeMap<&str, Vec<&RatingVersion>> = BTreeMap::new();
    for version in versions {
        by_player.entry(version.player_key.as_str()).or_default().push(version);
    }

    let mut violations = Vec::new();

    for (player_key, mut rows) in by_player {
        rows.sort_by(|a, b| {
            a.valid_from
                .cmp(&b.valid_from)
                .then(a.surrogate_key.cmp(&b.surrogate_key))
        });
        let mut report = |kind: ViolationKind, keys: Vec<i64>| {
            violations.push(Violation {
                player_key: player_key.to_string(),
                kind,
                surrogate_keys: keys,
            })
        };

        let current: Vec<i64> = rows.iter().filter(|v| v.is_current).map(|v| v.surrogate_key).collect();
        match current.len() {
            0 => report(ViolationKind::MissingCurrent, Vec::new()),
            1 => {}
            _ => report(ViolationKind::DuplicateCurrent, current),
        }

        for row in &rows {
            match (row.is_current, row.valid_to) {
                (true, Some(_)) => report(ViolationKind::CurrentWithValidTo, vec![row.surrogate_key]),
                (false, None) => report(ViolationKind::ClosedWithoutValidTo, vec![row.surrogate_key]),
                (_, Some(to)) if to < row.valid_from => {
                    report(ViolationKind::InvertedInterval, vec![row.surrogate_key])
                }
                _ => {}
            }
        }

        for pair in rows.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            let keys = vec![prev.surrogate_key, next.surrogate_key];
            match prev.valid_to {
                None => report(ViolationKind::Overlap, keys),
                Some(to) if to > next.valid_from => report(ViolationKind::Overlap, keys),
                Some(to) if to < next.valid_from => report(ViolationKind::Gap, keys),
                Some(_) => {}
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RatingAttributes;
    use chesslake_common::Platform;
    use chrono::{DateTime, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        chesslake_common::time::from_unix_seconds(1_700_000_000 + secs).unwrap()
    }

    fn version(key: i64, from: i64, to: Option<i64>) -> RatingVersion {
        RatingVersion {
            surrogate_key: key,
            player_key: "alice_chesscom".to_string(),
            player_username: "alice".to_string(),
            platform: Platform::Chesscom,
            attributes: RatingAttributes::default(),
            win_rate: 0.0,
            record_hash: String::new(),
            valid_from: at(from),
            valid_to: to.map(at),
            is_current: to.is_none(),
            ingested_at: at(from),
            source_record_id: None,
        }
    }

    fn kinds(violations: &[Violation]) -> Vec<ViolationKind> {
        violations.iter().map(|v| v.kind).collect()
    }

    #[test]
    fn test_contiguous_history_is_clean() {
        let rows = vec![version(1, 0, Some(10)), version(2, 10, Some(10)), version(3, 10, None)];
        assert!(audit_versions(&rows).is_empty());
    }

    #[test]
    fn test_duplicate_current() {
        let rows = vec![version(1, 0, None), version(2, 10, None)];
        assert_eq!(
            kinds(&audit_versions(&rows)),
            vec![ViolationKind::DuplicateCurrent, ViolationKind::Overlap]
        );
    }

    #[test]
    fn test_gap_overlap_and_missing_current() {
        let rows = vec![version(1, 0, Some(10)), version(2, 20, Some(30)), version(3, 25, Some(40))];
        assert_eq!(
            kinds(&audit_versions(&rows)),
            vec![ViolationKind::MissingCurrent, ViolationKind::Gap, ViolationKind::Overlap]
        );
    }

    #[test]
    fn test_flag_and_interval_mismatches() {
        let mut current_closed = version(1, 0, Some(10));
        current_closed.is_current = true;
        let mut inverted = version(2, 10, Some(5));
        inverted.player_key = "bob_lichess".to_string();
        let mut bob_current = version(3, 20, None);
        bob_current.player_key = "bob_lichess".to_string();

        let violations = audit_versions(&[current_closed, inverted, bob_current]);
        assert!(kinds(&violations).contains(&ViolationKind::CurrentWithValidTo));
        assert!(kinds(&violations).contains(&ViolationKind::InvertedInterval));
        assert!(violations
            .iter()
            .any(|v| v.kind == ViolationKind::Gap && v.player_key == "bob_lichess"));
    }
}
