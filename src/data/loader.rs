// ============================================================
// Layer 4 - Record Loader
// ============================================================
// Streams fixed-shape records out of JSON-lines files.
//
// Every non-blank line is one record:
//
//   {"context":[12,7,0,..],"utterance":[5,9,0,..],
//    "context_len":2,"utterance_len":2,"label":1}
//
// `context` and `utterance` must be exactly `max_len` long
// (they were padded upstream), lengths must be non-negative
// and the label must be 0 or 1. A record that breaks any of
// these rules is an error naming the file and line, because a
// silently skipped record would shift every ranking group
// that follows it.
//
// Files are read lazily, one line at a time, in the order they
// were configured. `rewind()` starts the next pass from the
// first file again.

use anyhow::{bail, Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::{Path, PathBuf},
};

use crate::domain::example::Example;

/// Lazily reads examples from an ordered list of record files.
pub struct RecordReader {
    paths:    Vec<PathBuf>,
    max_len:  usize,
    /// Index of the next file to open
    next_file: usize,
    /// The file currently being read, with its 1-based line counter
    current:  Option<OpenFile>,
}

struct OpenFile {
    path:    PathBuf,
    lines:   Lines<BufReader<File>>,
    line_no: usize,
}

impl RecordReader {
    pub fn new(paths: Vec<PathBuf>, max_len: usize) -> Self {
        Self { paths, max_len, next_file: 0, current: None }
    }

    /// Read the next example of the current pass.
    /// Returns `Ok(None)` once every file has been read.
    pub fn next_example(&mut self) -> Result<Option<Example>> {
        loop {
            if self.current.is_none() {
                let Some(path) = self.paths.get(self.next_file) else {
                    return Ok(None);
                };
                self.next_file += 1;
                let file = File::open(path)
                    .with_context(|| format!("Cannot open record file '{}'", path.display()))?;
                self.current = Some(OpenFile {
                    path:    path.clone(),
                    lines:   BufReader::new(file).lines(),
                    line_no: 0,
                });
            }

            let Some(open) = self.current.as_mut() else { continue };
            match open.lines.next() {
                Some(line) => {
                    open.line_no += 1;
                    let line = line.with_context(|| {
                        format!("Cannot read '{}' line {}", open.path.display(), open.line_no)
                    })?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let example = parse_record(&line, self.max_len).with_context(|| {
                        format!("Bad record in '{}' line {}", open.path.display(), open.line_no)
                    })?;
                    return Ok(Some(example));
                }
                // This file is done; move on to the next one
                None => self.current = None,
            }
        }
    }

    /// Start the next pass from the beginning of the first file.
    pub fn rewind(&mut self) {
        self.next_file = 0;
        self.current   = None;
    }
}

/// Parse and validate a single JSON record line.
pub fn parse_record(line: &str, max_len: usize) -> Result<Example> {
    let example: Example = serde_json::from_str(line)?;

    if example.context.len() != max_len {
        bail!("context has {} ids, expected {}", example.context.len(), max_len);
    }
    if example.utterance.len() != max_len {
        bail!("utterance has {} ids, expected {}", example.utterance.len(), max_len);
    }
    if example.context_len < 0 || example.utterance_len < 0 {
        bail!("negative sequence length");
    }
    if example.label != 0 && example.label != 1 {
        bail!("label must be 0 or 1, got {}", example.label);
    }

    Ok(example)
}

/// Count the records in `paths` without parsing them.
/// Used when the example count of a split is not configured.
pub fn count_records(paths: &[PathBuf]) -> Result<usize> {
    let mut total = 0usize;
    for path in paths {
        total += count_in_file(path)?;
    }
    Ok(total)
}

fn count_in_file(path: &Path) -> Result<usize> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open record file '{}'", path.display()))?;
    let mut count = 0usize;
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("Cannot read '{}'", path.display()))?;
        if !line.trim().is_empty() {
            count += 1;
        }
    }
    tracing::debug!("Counted {} records in '{}'", count, path.display());
    Ok(count)
}
