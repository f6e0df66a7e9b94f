//! Resolution of the block files to scan

use crate::{Error, Result};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Lexically ordered list of block container files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    files: Vec<PathBuf>,
}

impl FileSet {
    /// List `blk*.dat` under `path` (or take `path` itself if it is a file),
    /// sliced to `start_file..=end_file` by file name.
    pub fn resolve(path: &Path, start_file: Option<&str>, end_file: Option<&str>) -> Result<Self> {
        if path.is_file() {
            return Ok(Self {
                files: vec![path.to_path_buf()],
            });
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with("blk") && name.ends_with(".dat") && entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        let position = |name: &str| {
            files
                .iter()
                .position(|f| f.file_name().is_some_and(|n| n == name))
                .ok_or_else(|| Error::FileNotFound {
                    name: name.to_string(),
                    dir: path.to_path_buf(),
                })
        };

        let start = start_file.map(position).transpose()?.unwrap_or(0);
        let end = match end_file {
            Some(name) => position(name)? + 1,
            None => files.len(),
        };
        let files = if start < end {
            files[start..end].to_vec()
        } else {
            Vec::new()
        };

        tracing::debug!("Resolved {} block files in {:?}", files.len(), path);
        Ok(Self { files })
    }

    pub fn from_paths(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Drop every file before `name`; unknown names leave the set untouched
    pub fn starting_at(&self, name: &str) -> Option<Self> {
        let idx = self
            .files
            .iter()
            .position(|f| f.file_name().is_some_and(|n| n == name))?;
        Some(Self {
            files: self.files[idx..].to_vec(),
        })
    }

    /// Split into at most `parts` contiguous, non-empty slices
    pub fn partition(&self, parts: usize) -> Vec<FileSet> {
        partition_ranges(self.files.len(), parts)
            .into_iter()
            .map(|r| Self {
                files: self.files[r].to_vec(),
            })
            .collect()
    }
}

fn partition_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    if len == 0 || parts == 0 {
        return Vec::new();
    }
    let parts = parts.min(len);
    let base = len / parts;
    let extra = len % parts;

    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

/// Bare file name, for logs and metadata
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
