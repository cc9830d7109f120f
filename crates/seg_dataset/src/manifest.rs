//! Loading the `image mask` manifest into an ordered sample list.

use crate::types::{DatasetResult, Sample, SegDatasetError};
use std::fs;
use std::path::{Path, PathBuf};

/// Ordered, immutable list of samples read from a manifest file.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    source: PathBuf,
    samples: Vec<Sample>,
}

impl Manifest {
    /// Read and parse `manifest_path`, joining every entry onto `data_dir`.
    ///
    /// Fails on the first malformed line; no partial list is returned.
    pub fn load(data_dir: &Path, manifest_path: &Path) -> DatasetResult<Self> {
        let raw = fs::read_to_string(manifest_path).map_err(|e| SegDatasetError::Io {
            path: manifest_path.to_path_buf(),
            source: e,
        })?;
        Self::parse(data_dir, manifest_path, &raw)
    }

    /// Parse manifest text. `source` is only used for error messages.
    pub fn parse(data_dir: &Path, source: &Path, contents: &str) -> DatasetResult<Self> {
        let mut samples = Vec::new();
        for (i, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let [image, mask] = tokens.as_slice() else {
                return Err(SegDatasetError::ManifestFormat {
                    path: source.to_path_buf(),
                    line: i + 1,
                    tokens: tokens.len(),
                });
            };
            samples.push(Sample {
                image_path: join_data_path(data_dir, image),
                mask_path: join_data_path(data_dir, mask),
                line: i + 1,
            });
        }
        Ok(Self {
            source: source.to_path_buf(),
            samples,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    /// Image paths, index-aligned with [`Manifest::masks`].
    pub fn images(&self) -> Vec<&Path> {
        self.samples.iter().map(|s| s.image_path.as_path()).collect()
    }

    /// Mask paths, index-aligned with [`Manifest::images`].
    pub fn masks(&self) -> Vec<&Path> {
        self.samples.iter().map(|s| s.mask_path.as_path()).collect()
    }

    /// Split into the two parallel (images, masks) sequences.
    pub fn into_parts(self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        self.samples
            .into_iter()
            .map(|s| (s.image_path, s.mask_path))
            .unzip()
    }
}

/// Manifest entries are relative to `data_dir` even when written with a leading `/`
/// (e.g. `/JPEGImages/2007_000032.jpg`).
/// Entries are appended to `data_dir`; with no `data_dir` they are used as written.
fn join_data_path(data_dir: &Path, entry: &str) -> PathBuf {
    if data_dir.as_os_str().is_empty() {
        return PathBuf::from(entry);
    }
    data_dir.join(entry.trim_start_matches('/'))
}
