//! Listing of completed files in the download directory.
use chrono::{DateTime, Local};
use std::io;
use std::path::Path;

use crate::models::DownloadedFile;

/// URL prefix the download directory is served under.
pub const DOWNLOADS_PREFIX: &str = "/downloads/";

// Decimal units, as in "1.0 kB" or "2.5 MB".
const UNITS: [&str; 8] = ["kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Human-readable decimal size.
pub fn natural_size(bytes: u64) -> String {
    if bytes == 1 {
        return "1 Byte".to_string();
    }
    if bytes < 1000 {
        return format!("{} Bytes", bytes);
    }
    let mut value = bytes as f64 / 1000.0;
    for unit in &UNITS[..UNITS.len() - 1] {
        if value < 1000.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1000.0;
    }
    format!("{:.1} {}", value, UNITS[UNITS.len() - 1])
}

/// Regular, non-hidden files in `dir`, sorted by name. A missing directory
/// is treated as empty.
pub fn list_downloads(dir: &Path) -> io::Result<Vec<DownloadedFile>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        // Follows symlinks; a dangling link is skipped.
        let meta = match std::fs::metadata(entry.path()) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if !meta.is_file() {
            continue;
        }
        let modified: DateTime<Local> = meta.modified()?.into();
        files.push(DownloadedFile {
            path: format!("{}{}", DOWNLOADS_PREFIX, urlencoding::encode(&name)),
            size: natural_size(meta.len()),
            size_bytes: meta.len(),
            modified: modified.format("%Y-%m-%d %H:%M:%S").to_string(),
            name,
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}
