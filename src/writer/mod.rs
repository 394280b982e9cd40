//! Spectrum persistence, one file per metric id.
//!
//! Files are named `{id}_spectrum.txt` under the configured output
//! directory. A handle is opened on first write for an id and cached for
//! the life of the process; each cycle truncates and rewrites the file so
//! a shorter spectrum never leaves stale trailing bytes behind.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Writes magnitude spectra to per-metric files with cached handles.
#[derive(Debug)]
pub struct SpectrumWriter {
    dir: PathBuf,
    handles: HashMap<i64, File>,
}

impl SpectrumWriter {
    /// Create a writer rooted at `dir`. No file is touched until the
    /// first spectrum for an id arrives.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            handles: HashMap::new(),
        }
    }

    /// Path of the spectrum file for a metric id.
    pub fn path_for(&self, id: i64) -> PathBuf {
        self.dir.join(format!("{id}_spectrum.txt"))
    }

    /// Persist one spectrum, replacing the file's previous contents.
    pub fn persist(&mut self, id: i64, spectrum: &[i64]) -> Result<()> {
        let file = match self.handles.entry(id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let path = self.dir.join(format!("{id}_spectrum.txt"));
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&path)
                    .with_context(|| format!("opening spectrum file {}", path.display()))?;
                e.insert(file)
            }
        };

        let payload = serde_json::to_vec(spectrum).context("serializing spectrum")?;

        file.set_len(0)
            .with_context(|| format!("truncating spectrum file for metric {id}"))?;
        file.seek(SeekFrom::Start(0))
            .with_context(|| format!("rewinding spectrum file for metric {id}"))?;
        file.write_all(&payload)
            .and_then(|_| file.write_all(b"\n"))
            .with_context(|| format!("writing spectrum file for metric {id}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_writes_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SpectrumWriter::new(dir.path());

        writer.persist(3, &[14, 0, 0, 0]).unwrap();

        let contents = std::fs::read_to_string(dir.path().join("3_spectrum.txt")).unwrap();
        assert_eq!(contents, "[14,0,0,0]\n");
    }

    #[test]
    fn test_rewrite_truncates_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SpectrumWriter::new(dir.path());

        writer.persist(0, &[100, 200, 300, 400, 500, 600]).unwrap();
        writer.persist(0, &[1]).unwrap();

        let contents = std::fs::read_to_string(dir.path().join("0_spectrum.txt")).unwrap();
        assert_eq!(contents, "[1]\n");
    }

    #[test]
    fn test_one_file_per_metric_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SpectrumWriter::new(dir.path());

        writer.persist(1, &[10]).unwrap();
        writer.persist(2, &[20]).unwrap();

        assert!(dir.path().join("1_spectrum.txt").exists());
        assert!(dir.path().join("2_spectrum.txt").exists());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let mut writer = SpectrumWriter::new(&missing);

        assert!(writer.persist(0, &[1]).is_err());
    }

    #[test]
    fn test_handle_survives_across_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SpectrumWriter::new(dir.path());

        writer.persist(5, &[1, 2]).unwrap();
        // Remove the path out from under the cached handle; the write
        // still succeeds against the open descriptor.
        std::fs::remove_file(dir.path().join("5_spectrum.txt")).unwrap();
        writer.persist(5, &[3, 4]).unwrap();
    }
}
