// Folder and archive expansion into an ordered list of page images

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::{DirEntry, WalkDir};

use crate::core::errors::InputError;

pub const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif"];
const ARCHIVE_EXTENSIONS: [&str; 2] = ["zip", "cbz"];
const METADATA_DIR: &str = "__MACOSX";

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn is_image(path: &Path) -> bool {
    has_extension(path, &IMAGE_EXTENSIONS)
}

pub fn is_archive(path: &Path) -> bool {
    has_extension(path, &ARCHIVE_EXTENSIONS)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// Digit-aware, case-insensitive file name ordering ("page2" < "page10")
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let mut da = String::new();
                while let Some(c) = a_chars.peek().copied().filter(char::is_ascii_digit) {
                    da.push(c);
                    a_chars.next();
                }
                let mut db = String::new();
                while let Some(c) = b_chars.peek().copied().filter(char::is_ascii_digit) {
                    db.push(c);
                    b_chars.next();
                }
                let ta = da.trim_start_matches('0');
                let tb = db.trim_start_matches('0');
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                let ord = ca.to_lowercase().cmp(cb.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                a_chars.next();
                b_chars.next();
            }
        }
    }
}

/// Recursively collect images under `dir`, naturally sorted by file name.
///
/// Hidden entries and `__MACOSX` metadata folders are skipped.
pub fn scan_folder(dir: &Path) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| !is_hidden(e) && e.file_name() != METADATA_DIR)
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_image(e.path()))
        .map(|e| e.into_path())
        .collect();

    images.sort_by(|a, b| {
        let name = |p: &PathBuf| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        natural_cmp(&name(a), &name(b))
    });

    debug!("Found {} images under {}", images.len(), dir.display());
    images
}

/// Unzip into a fresh temp directory and return it
pub async fn extract_archive(archive: &Path) -> Result<PathBuf, InputError> {
    let target = std::env::temp_dir()
        .join("manga_translator")
        .join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&target).await?;

    let status = Command::new("unzip")
        .arg("-o")
        .arg(archive)
        .arg("-d")
        .arg(&target)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| InputError::ExtractionFailed(format!("failed to run unzip: {}", e)))?;

    if !status.success() {
        return Err(InputError::ExtractionFailed(format!(
            "unzip exited with {} for {}",
            status,
            archive.display()
        )));
    }

    info!("Extracted {} to {}", archive.display(), target.display());
    Ok(target)
}

/// Folder → scan, zip/cbz → extract then scan, single image → itself
pub async fn expand_input(path: &Path) -> Result<Vec<PathBuf>, InputError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| InputError::NotFound(path.display().to_string()))?;

    let dir = if metadata.is_dir() {
        path.to_path_buf()
    } else if is_archive(path) {
        extract_archive(path).await?
    } else if is_image(path) {
        return Ok(vec![path.to_path_buf()]);
    } else {
        return Err(InputError::NotFound(format!(
            "{} is not a folder, archive or image",
            path.display()
        )));
    };

    tokio::task::spawn_blocking(move || scan_folder(&dir))
        .await
        .map_err(|e| InputError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
}
