//! Per-run staging directories for downloaded products.
//!
//! A `StagingArea` owns one uniquely named directory under the staging root.
//! The directory is removed exactly once: on `release()` or, failing that, when
//! the guard is dropped (including during unwinding).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Extensions stripped from product keys before they become file names.
const PRODUCT_EXTENSIONS: [&str; 5] = [".xml", ".csv", ".ecsv", ".fits", ".vot"];

#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
    released: bool,
}

impl StagingArea {
    /// Create a fresh directory under `root` (the root is created if absent).
    pub fn create(root: &Path) -> io::Result<Self> {
        let ts = Local::now().format("%Y%m%d_%H%M%S");
        let path = root.join(format!("xp_{ts}_{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&path)?;
        debug!(path = %path.display(), "Created staging directory");
        Ok(Self { path, released: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Staged CSV files, sorted by file name.
    pub fn staged_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if path.is_file() && is_csv {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Delete the directory and its contents.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::remove_dir_all(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "Deleted staging directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => error!(path = %self.path.display(), "Error deleting staging directory: {e}"),
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Turn a product key into a file stem.
///
/// Known extensions are stripped (repeatedly), then spaces, hyphens and path
/// separators become underscores. Applying it twice gives the same result.
pub fn sanitize_product_key(key: &str) -> String {
    let mut stem = key.trim();
    while let Some(ext) = PRODUCT_EXTENSIONS
        .iter()
        .find(|ext| stem.len() > ext.len() && stem.to_ascii_lowercase().ends_with(*ext))
    {
        stem = &stem[..stem.len() - ext.len()];
    }
    stem.replace([' ', '-', '/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_extension_and_separators() {
        assert_eq!(
            sanitize_product_key("XP_SAMPLED-Gaia DR3 4111834567779557376.xml"),
            "XP_SAMPLED_Gaia_DR3_4111834567779557376"
        );
        assert_eq!(sanitize_product_key("XP_SAMPLED-Gaia DR3 1.xml.csv"), "XP_SAMPLED_Gaia_DR3_1");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for key in [
            "XP_SAMPLED-Gaia DR3 4111834567779557376.csv",
            "XP_SAMPLED-Gaia DR3 9.ecsv",
            "plain",
            "a-b c.fits",
        ] {
            let once = sanitize_product_key(key);
            assert_eq!(sanitize_product_key(&once), once);
        }
    }

    #[test]
    fn each_area_gets_its_own_directory() {
        let root = tempfile::tempdir().unwrap();
        let a = StagingArea::create(root.path()).unwrap();
        let b = StagingArea::create(root.path()).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));
    }

    #[test]
    fn release_and_drop_remove_directory() {
        let root = tempfile::tempdir().unwrap();

        let released = StagingArea::create(root.path()).unwrap();
        let released_path = released.path().to_path_buf();
        fs::write(released_path.join("x.csv"), "flux\n1\n").unwrap();
        released.release();
        assert!(!released_path.exists());

        let dropped_path = {
            let dropped = StagingArea::create(root.path()).unwrap();
            dropped.path().to_path_buf()
        };
        assert!(!dropped_path.exists());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn staged_files_lists_csv_only_in_name_order() {
        let root = tempfile::tempdir().unwrap();
        let area = StagingArea::create(root.path()).unwrap();
        fs::write(area.path().join("b.csv"), "").unwrap();
        fs::write(area.path().join("a.CSV"), "").unwrap();
        fs::write(area.path().join("notes.txt"), "").unwrap();

        let names: Vec<_> = area
            .staged_files()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
    }
}
