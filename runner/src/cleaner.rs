use crate::timing::StartTime;
use globset::{GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};

/// per grid cell output directories, e.g. `y0012x0345`
pub const TILE_PATTERN: &str = "y[0-9][0-9][0-9][0-9]x[0-9][0-9][0-9][0-9]";

#[derive(Error, Debug)]
pub enum CleanError {
    #[error("Tile pattern is invalid")]
    InvalidPattern(#[from] globset::Error),
    #[error("Failed to list {path:?}")]
    Walk { path: PathBuf, source: ignore::Error },
    #[error("Failed to remove {path:?}: {source}")]
    Remove { path: PathBuf, source: io::Error },
}

/// Removes stale per-cell output of a single time window.
///
/// Only immediate children of `<work_dir>/<start_time>` whose name matches
/// [`TILE_PATTERN`] exactly are touched, the window directory itself and any
/// other entries are left alone.
#[derive(Debug, Clone)]
pub struct TileCleaner {
    work_dir: PathBuf,
    matcher: GlobMatcher,
}

impl TileCleaner {
    pub fn new(work_dir: impl Into<PathBuf>) -> Result<Self, CleanError> {
        let matcher = GlobBuilder::new(TILE_PATTERN)
            .literal_separator(true)
            .build()?
            .compile_matcher();

        Ok(Self {
            work_dir: work_dir.into(),
            matcher,
        })
    }

    pub fn job_dir(&self, start_time: &StartTime) -> PathBuf {
        self.work_dir.join(start_time.to_string())
    }

    pub fn is_tile_name(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }

    /// matching entries below the window directory, sorted by name
    fn tiles(&self, job_dir: &Path) -> Result<Vec<(PathBuf, bool)>, CleanError> {
        let mut tiles = Vec::new();
        let walker = WalkBuilder::new(job_dir)
            .standard_filters(false)
            .follow_links(false)
            .max_depth(Some(1))
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = entry.map_err(|source| CleanError::Walk {
                path: job_dir.to_path_buf(),
                source,
            })?;

            if entry.depth() == 0 {
                continue;
            }

            let matches = entry
                .file_name()
                .to_str()
                .map(|name| self.is_tile_name(name))
                .unwrap_or(false);

            if matches {
                let is_dir = entry
                    .file_type()
                    .map(|file_type| file_type.is_dir())
                    .unwrap_or(false);
                tiles.push((entry.into_path(), is_dir));
            } else {
                debug!(path = ?entry.path(), "Leaving non-tile entry untouched");
            }
        }

        Ok(tiles)
    }

    /// Remove all tile entries of the window starting at `start_time`, returning how many were removed.
    #[tracing::instrument(level = "debug", skip(self, start_time), fields(start_time = %start_time))]
    pub fn clean(&self, start_time: &StartTime) -> Result<usize, CleanError> {
        let job_dir = self.job_dir(start_time);

        if !job_dir.exists() {
            debug!(job_dir = ?job_dir, "Nothing to clean, directory does not exist");
            return Ok(0);
        }

        let tiles = self.tiles(&job_dir)?;

        for (path, is_dir) in tiles.iter() {
            let result = if *is_dir {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };

            result.map_err(|source| CleanError::Remove {
                path: path.clone(),
                source,
            })?;
            debug!(path = ?path, "Removed tile");
        }

        info!(job_dir = ?job_dir, removed = tiles.len(), "Cleaned tile output");

        Ok(tiles.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::compute_start_time;

    fn populated() -> (tempfile::TempDir, TileCleaner, PathBuf, StartTime) {
        let dir = tempfile::tempdir().unwrap();
        let start_time = compute_start_time(3).unwrap();
        let cleaner = TileCleaner::new(dir.path()).unwrap();
        let job_dir = cleaner.job_dir(&start_time);

        fs::create_dir_all(job_dir.join("y0001x0002/nested")).unwrap();
        fs::write(job_dir.join("y0001x0002/nested/progvar.nc"), "data").unwrap();
        fs::create_dir_all(job_dir.join("y9999x0000")).unwrap();
        fs::write(job_dir.join("notes.txt"), "keep me").unwrap();

        (dir, cleaner, job_dir, start_time)
    }

    #[test]
    fn job_dir_is_named_after_start_time() {
        let cleaner = TileCleaner::new("/scratch/work").unwrap();

        assert_eq!(
            cleaner.job_dir(&compute_start_time(3).unwrap()),
            PathBuf::from("/scratch/work/2009-04-06T01:30:00")
        );
    }

    #[test]
    fn removes_only_tiles() {
        let (_dir, cleaner, job_dir, start_time) = populated();

        assert_eq!(cleaner.clean(&start_time).unwrap(), 2);
        assert!(!job_dir.join("y0001x0002").exists());
        assert!(!job_dir.join("y9999x0000").exists());
        assert_eq!(
            fs::read_to_string(job_dir.join("notes.txt")).unwrap(),
            "keep me"
        );
        assert!(job_dir.is_dir());
    }

    #[test]
    fn second_run_is_a_no_op() {
        let (_dir, cleaner, _job_dir, start_time) = populated();

        cleaner.clean(&start_time).unwrap();
        assert_eq!(cleaner.clean(&start_time).unwrap(), 0);
    }

    #[test]
    fn missing_job_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cleaner = TileCleaner::new(dir.path().join("absent")).unwrap();

        assert_eq!(cleaner.clean(&compute_start_time(1).unwrap()).unwrap(), 0);
    }

    #[test]
    fn near_misses_are_kept() {
        let (_dir, cleaner, job_dir, start_time) = populated();
        let near_misses = [
            "y001x0002",
            "y00010x0002",
            "Y0001x0002",
            "y0001x0002.bak",
            "failed.y0001x0002",
            "y000ax0002",
        ];
        for name in near_misses {
            fs::create_dir_all(job_dir.join(name)).unwrap();
        }
        // tiles nested below a non-tile directory are out of reach
        fs::create_dir_all(job_dir.join("archive/y0005x0005")).unwrap();

        assert_eq!(cleaner.clean(&start_time).unwrap(), 2);
        for name in near_misses {
            assert!(job_dir.join(name).is_dir(), "{name} was removed");
        }
        assert!(job_dir.join("archive/y0005x0005").is_dir());
    }

    #[test]
    fn matching_files_are_removed_too() {
        let dir = tempfile::tempdir().unwrap();
        let start_time = compute_start_time(1).unwrap();
        let cleaner = TileCleaner::new(dir.path()).unwrap();
        let job_dir = cleaner.job_dir(&start_time);
        fs::create_dir_all(&job_dir).unwrap();
        fs::write(job_dir.join("y0000x0000"), "").unwrap();

        assert_eq!(cleaner.clean(&start_time).unwrap(), 1);
        assert!(!job_dir.join("y0000x0000").exists());
    }
}
