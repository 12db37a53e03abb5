//! Drop directory scanner
//!
//! Downloaded API responses are dropped into a directory laid out as
//!
//! ```text
//! <drop>/<platform>/<username>/<dataset>[-suffix].<json|ndjson|pgn>
//! ```
//!
//! e.g. `chesscom/alice/games-2024-05.json` or `lichess/alice_lc/stats.json`.
//! Files that do not follow the layout are reported and skipped.

use super::{Dataset, LandingRequest, PayloadFormat};
use chesslake_common::Platform;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Drop directory scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Cannot read a discovered file
    #[error("File access error {0}: {1}")]
    FileAccessError(PathBuf, String),
}

impl From<ScanError> for chesslake_common::Error {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::PathNotFound(p) => chesslake_common::Error::NotFound(p.display().to_string()),
            other => chesslake_common::Error::InvalidInput(other.to_string()),
        }
    }
}

/// A file recognised as an API response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropFile {
    pub path: PathBuf,
    pub platform: Platform,
    pub username: String,
    pub dataset: Dataset,
    pub format: PayloadFormat,
}

impl DropFile {
    /// Read the file into a landing request
    pub fn into_request(self) -> Result<LandingRequest, ScanError> {
        let payload = std::fs::read_to_string(&self.path)
            .map_err(|e| ScanError::FileAccessError(self.path.clone(), e.to_string()))?;

        Ok(LandingRequest {
            platform: self.platform,
            dataset: self.dataset,
            username: self.username,
            format: Some(self.format),
            source_uri: Some(format!("file://{}", self.path.display())),
            payload,
        })
    }
}

/// Scan result
#[derive(Debug, Default)]
pub struct DropScan {
    /// Recognised files, sorted by path
    pub files: Vec<DropFile>,
    /// Files skipped with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

/// Walk a drop directory and classify every file
pub fn scan_drop_dir(root: &Path) -> Result<DropScan, ScanError> {
    if !root.exists() {
        return Err(ScanError::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut scan = DropScan::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = match path.strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };

        match classify(relative) {
            Ok((platform, username, dataset, format)) => scan.files.push(DropFile {
                path: path.to_path_buf(),
                platform,
                username,
                dataset,
                format,
            }),
            Err(reason) => {
                tracing::debug!(path = %path.display(), %reason, "Skipping drop file");
                scan.skipped.push((path.to_path_buf(), reason));
            }
        }
    }

    tracing::info!(
        root = %root.display(),
        recognised = scan.files.len(),
        skipped = scan.skipped.len(),
        "Drop directory scanned"
    );

    Ok(scan)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn classify(relative: &Path) -> Result<(Platform, String, Dataset, PayloadFormat), String> {
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();

    if parts.len() != 3 {
        return Err(format!(
            "expected <platform>/<username>/<file>, found {} path components",
            parts.len()
        ));
    }

    let platform: Platform = parts[0].parse().map_err(|_| format!("unknown platform '{}'", parts[0]))?;
    let username = parts[1].trim().to_string();
    if username.is_empty() {
        return Err("empty username directory".to_string());
    }

    let file = Path::new(&parts[2]);
    let ext = file
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .ok_or_else(|| "file has no extension".to_string())?;
    let format = PayloadFormat::from_extension(&ext)
        .ok_or_else(|| format!("unsupported extension '{}'", ext))?;

    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let dataset_part = stem.split(['-', '_', '.']).next().unwrap_or_default();
    let dataset: Dataset = dataset_part
        .parse()
        .map_err(|_| format!("file name '{}' does not start with a dataset name", stem))?;

    Ok((platform, username, dataset, format))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_classify_valid_layouts() {
        let (p, u, d, f) = classify(Path::new("chesscom/alice/games-2024-05.json")).unwrap();
        assert_eq!((p, u.as_str(), d, f), (Platform::Chesscom, "alice", Dataset::Games, PayloadFormat::Json));

        let (p, _, d, f) = classify(Path::new("lichess/bob/games.ndjson")).unwrap();
        assert_eq!((p, d, f), (Platform::Lichess, Dataset::Games, PayloadFormat::Ndjson));

        let (_, _, d, _) = classify(Path::new("lichess/bob/profile.json")).unwrap();
        assert_eq!(d, Dataset::Profile);
    }

    #[test]
    fn test_classify_rejects_bad_layouts() {
        assert!(classify(Path::new("alice/games.json")).is_err());
        assert!(classify(Path::new("fics/alice/games.json")).is_err());
        assert!(classify(Path::new("lichess/alice/games.txt")).is_err());
        assert!(classify(Path::new("lichess/alice/notes.json")).is_err());
    }

    #[test]
    fn test_scan_reports_recognised_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "chesscom/alice/stats.json", "{}");
        touch(dir.path(), "chesscom/alice/games-2024-01.json", "{\"games\":[]}");
        touch(dir.path(), "lichess/alice_lc/readme.md", "notes");
        touch(dir.path(), ".cache/chesscom/x/stats.json", "{}");

        let scan = scan_drop_dir(dir.path()).unwrap();
        assert_eq!(scan.files.len(), 2);
        assert_eq!(scan.skipped.len(), 1);
        assert!(scan.files.iter().all(|f| f.username == "alice"));
        // sorted by file name within the directory
        assert_eq!(scan.files[0].dataset, Dataset::Games);
        assert_eq!(scan.files[1].dataset, Dataset::Stats);
    }

    #[test]
    fn test_scan_missing_dir() {
        let result = scan_drop_dir(Path::new("/nonexistent/chesslake/drop"));
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[test]
    fn test_into_request_reads_payload() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "lichess/bob/profile.json", "{\"id\":\"bob\"}");
        let scan = scan_drop_dir(dir.path()).unwrap();
        let request = scan.files[0].clone().into_request().unwrap();
        assert_eq!(request.payload, "{\"id\":\"bob\"}");
        assert_eq!(request.format, Some(PayloadFormat::Json));
        assert!(request.source_uri.unwrap().starts_with("file://"));
    }
}
