//! Landing zone writes and reads
//!
//! Layout: `<root>/<platform>/<dataset>/ingest_date=YYYY-MM-DD/<record_id>.json`
//!
//! Each file is an envelope holding the manifest metadata and the payload text.
//! Files are created with create-new semantics and never rewritten.

use super::{manifest, BronzeRecord, Dataset, LandingOutcome, LandingRequest, PayloadFormat};
use chesslake_common::hash::sha256_hex;
use chesslake_common::{time, Error, Platform, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// On-disk envelope
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    metadata: BronzeRecord,
    payload: String,
}

/// Root of the bronze landing zone
#[derive(Debug, Clone)]
pub struct LandingZone {
    root: PathBuf,
}

impl LandingZone {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Partition directory relative to the zone root
    pub fn partition_dir(platform: Platform, dataset: Dataset, date: NaiveDate) -> PathBuf {
        PathBuf::from(platform.as_str())
            .join(dataset.as_str())
            .join(format!("ingest_date={}", date.format("%Y-%m-%d")))
    }

    /// Envelope path relative to the zone root
    pub fn record_path(
        platform: Platform,
        dataset: Dataset,
        ingested_at: &DateTime<Utc>,
        record_id: Uuid,
    ) -> PathBuf {
        Self::partition_dir(platform, dataset, time::partition_date(ingested_at))
            .join(format!("{}.json", record_id))
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

/// Land a payload stamped with the current time
pub async fn land(
    pool: &SqlitePool,
    zone: &LandingZone,
    request: LandingRequest,
) -> Result<LandingOutcome> {
    land_at(pool, zone, request, time::now()).await
}

/// Land a payload with an explicit ingestion timestamp
///
/// **Algorithm:**
/// 1. Validate request and resolve the payload format
/// 2. Hash the payload; if the manifest already holds this content for the
///    same platform/dataset/account, return `AlreadyLanded`
/// 3. Write the envelope with create-new semantics
/// 4. Insert the manifest row; on failure remove the written file
pub async fn land_at(
    pool: &SqlitePool,
    zone: &LandingZone,
    request: LandingRequest,
    ingested_at: DateTime<Utc>,
) -> Result<LandingOutcome> {
    let username = request.username.trim().to_lowercase();
    if username.is_empty() {
        return Err(Error::InvalidInput("Landing request has empty username".to_string()));
    }
    if request.payload.trim().is_empty() {
        return Err(Error::InvalidInput(format!(
            "Empty {} {} payload for {}",
            request.platform, request.dataset, username
        )));
    }

    let format = match request.format {
        Some(format) => format,
        None => PayloadFormat::detect(&request.payload).ok_or_else(|| {
            Error::InvalidInput("Cannot detect payload format; pass it explicitly".to_string())
        })?,
    };
    validate_payload(format, &request.payload)?;

    let content_sha256 = sha256_hex(request.payload.as_bytes());

    if let Some(existing) = manifest::find_by_content(
        pool,
        request.platform,
        request.dataset,
        &username,
        &content_sha256,
    )
    .await?
    {
        debug!(
            record_id = %existing.record_id,
            platform = %request.platform,
            dataset = %request.dataset,
            username = %username,
            "Identical payload already landed"
        );
        return Ok(LandingOutcome::AlreadyLanded(existing));
    }

    let record_id = Uuid::new_v4();
    let relative = LandingZone::record_path(request.platform, request.dataset, &ingested_at, record_id);
    let record = BronzeRecord {
        record_id,
        platform: request.platform,
        dataset: request.dataset,
        username,
        format,
        source_uri: request.source_uri,
        content_sha256,
        byte_len: request.payload.len() as i64,
        ingested_at,
        landing_path: relative.to_string_lossy().replace('\\', "/"),
    };

    let absolute = zone.absolute(&record.landing_path);
    let envelope = Envelope {
        metadata: record.clone(),
        payload: request.payload,
    };
    write_new_file(&absolute, &serde_json::to_vec(&envelope)?)?;

    if let Err(e) = manifest::insert(pool, &record).await {
        warn!(
            path = %absolute.display(),
            error = %e,
            "Manifest insert failed, removing landed file"
        );
        if let Err(rm_err) = std::fs::remove_file(&absolute) {
            warn!(path = %absolute.display(), error = %rm_err, "Could not remove orphaned landing file");
        }
        return Err(e);
    }

    info!(
        record_id = %record.record_id,
        platform = %record.platform,
        dataset = %record.dataset,
        username = %record.username,
        bytes = record.byte_len,
        path = %record.landing_path,
        "Landed bronze record"
    );

    Ok(LandingOutcome::Landed(record))
}

/// Read a landed payload back, verifying its content hash
pub fn read_payload(zone: &LandingZone, record: &BronzeRecord) -> Result<String> {
    let path = zone.absolute(&record.landing_path);
    let bytes = std::fs::read(&path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read landed record {}: {}", path.display(), e),
        ))
    })?;
    let envelope: Envelope = serde_json::from_slice(&bytes)?;

    if envelope.metadata.record_id != record.record_id {
        return Err(Error::Integrity(format!(
            "Envelope {} holds record {} instead of {}",
            path.display(),
            envelope.metadata.record_id,
            record.record_id
        )));
    }

    let actual = sha256_hex(envelope.payload.as_bytes());
    if actual != record.content_sha256 {
        return Err(Error::Integrity(format!(
            "Content hash mismatch for record {}: manifest {}, file {}",
            record.record_id, record.content_sha256, actual
        )));
    }

    Ok(envelope.payload)
}

fn validate_payload(format: PayloadFormat, payload: &str) -> Result<()> {
    match format {
        PayloadFormat::Json => {
            serde_json::from_str::<serde_json::Value>(payload)
                .map_err(|e| Error::InvalidInput(format!("Payload is not valid JSON: {}", e)))?;
        }
        PayloadFormat::Ndjson => {
            for (idx, line) in payload.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                serde_json::from_str::<serde_json::Value>(line).map_err(|e| {
                    Error::InvalidInput(format!("NDJSON line {} is not valid JSON: {}", idx + 1, e))
                })?;
            }
        }
        PayloadFormat::Pgn => {}
    }
    Ok(())
}

fn write_new_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create landing file {}: {}", path.display(), e),
            ))
        })?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_path_is_date_partitioned() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 23, 59, 59).unwrap();
        let id = Uuid::nil();
        let path = LandingZone::record_path(Platform::Lichess, Dataset::Games, &ts, id);
        assert_eq!(
            path,
            PathBuf::from("lichess/games/ingest_date=2024-05-17")
                .join("00000000-0000-0000-0000-000000000000.json")
        );
    }

    #[test]
    fn test_validate_rejects_broken_json() {
        assert!(validate_payload(PayloadFormat::Json, "{\"games\": [").is_err());
        assert!(validate_payload(PayloadFormat::Json, "{\"games\": []}").is_ok());
    }

    #[test]
    fn test_validate_ndjson_reports_line() {
        let err = validate_payload(PayloadFormat::Ndjson, "{\"id\":1}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_write_new_file_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.json");
        write_new_file(&path, b"first").unwrap();
        assert!(write_new_file(&path, b"second").is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
    }
}
