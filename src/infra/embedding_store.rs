// ============================================================
// Layer 6 - Embedding Store
// ============================================================
// Builds the word-embedding table that turns token ids into
// vectors. It is loaded exactly once by the entry point and
// then shared (behind an Arc) with every model that gets built
// in the process, so nothing ever re-reads the embedding file.
//
// Inputs:
//   vocabulary.json  -> {"token": id, ...}
//   embeddings.txt   -> one "token v1 v2 ... vD" line per word
//
// Id 0 is padding and always maps to the zero vector. Tokens in
// the vocabulary but not in the embedding file get a small
// random vector drawn from U(-0.25, 0.25) with a fixed seed, so
// two runs over the same files build the same table.

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufRead, BufReader},
    path::Path,
};

const INIT_RANGE: f32 = 0.25;

/// Dense `vocab_size x dim` lookup table, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTable {
    dim:  usize,
    rows: Vec<f32>,
}

impl EmbeddingTable {
    /// Wrap an already-built row-major matrix.
    pub fn from_rows(dim: usize, rows: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            bail!("embedding dimension must be at least 1");
        }
        if rows.len() % dim != 0 {
            bail!("{} values do not fill rows of width {}", rows.len(), dim);
        }
        Ok(Self { dim, rows })
    }

    /// Load the vocabulary and embedding files.
    pub fn load(vocab_path: &Path, embed_path: &Path, dim: usize, seed: u64) -> Result<Self> {
        let vocab_json = fs::read_to_string(vocab_path)
            .with_context(|| format!("Cannot read vocabulary '{}'", vocab_path.display()))?;
        let vocabulary: HashMap<String, usize> = serde_json::from_str(&vocab_json)
            .with_context(|| format!("Vocabulary '{}' is not a token->id map", vocab_path.display()))?;

        let vocab_size = vocabulary.values().copied().max().map_or(1, |max_id| max_id + 1);

        let mut rng  = StdRng::seed_from_u64(seed);
        let mut rows = vec![0.0f32; vocab_size * dim];
        for row in rows.chunks_mut(dim).skip(1) {
            for value in row.iter_mut() {
                *value = rng.gen_range(-INIT_RANGE..INIT_RANGE);
            }
        }

        let file = File::open(embed_path)
            .with_context(|| format!("Cannot open embedding file '{}'", embed_path.display()))?;

        let mut found = 0usize;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Cannot read '{}'", embed_path.display()))?;
            let mut parts = line.split_whitespace();
            let Some(token) = parts.next() else { continue };
            let Some(&id) = vocabulary.get(token) else { continue };
            if id == 0 {
                continue;
            }

            let values: Vec<f32> = parts
                .map(str::parse::<f32>)
                .collect::<std::result::Result<_, _>>()
                .with_context(|| {
                    format!("Bad vector in '{}' line {}", embed_path.display(), line_no + 1)
                })?;
            if values.len() != dim {
                bail!(
                    "Vector for '{}' in '{}' has {} values, expected {}",
                    token, embed_path.display(), values.len(), dim
                );
            }

            rows[id * dim..(id + 1) * dim].copy_from_slice(&values);
            found += 1;
        }

        tracing::info!(
            "Embedding table ready: {} rows x {} dims ({} pretrained, {} random)",
            vocab_size,
            dim,
            found,
            vocabulary.len().saturating_sub(found)
        );
        Self::from_rows(dim, rows)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn vocab_size(&self) -> usize {
        self.rows.len() / self.dim
    }

    /// Vector for one token id.
    pub fn row(&self, id: i64) -> Result<&[f32]> {
        if id < 0 || id as usize >= self.vocab_size() {
            bail!("token id {} is outside the vocabulary (size {})", id, self.vocab_size());
        }
        let start = id as usize * self.dim;
        Ok(&self.rows[start..start + self.dim])
    }

    /// Append the vectors for `ids` to `out`, one row after the other.
    pub fn lookup_into(&self, ids: &[i64], out: &mut Vec<f32>) -> Result<()> {
        out.reserve(ids.len() * self.dim);
        for &id in ids {
            out.extend_from_slice(self.row(id)?);
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn write_inputs(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let vocab = dir.join("vocabulary.json");
        fs::write(&vocab, r#"{"<pad>":0,"hello":1,"world":2,"unseen":3}"#).unwrap();
        let embed = dir.join("embeddings.txt");
        fs::write(&embed, "hello 1.0 2.0\nworld 3.0 4.0\nnotinvocab 9.0 9.0\n").unwrap();
        (vocab, embed)
    }

    #[test]
    fn test_load_uses_pretrained_rows_and_zero_padding() {
        let dir = tempfile::tempdir().unwrap();
        let (vocab, embed) = write_inputs(dir.path());
        let table = EmbeddingTable::load(&vocab, &embed, 2, 1).unwrap();

        assert_eq!(table.vocab_size(), 4);
        assert_eq!(table.row(0).unwrap(), &[0.0, 0.0]);
        assert_eq!(table.row(1).unwrap(), &[1.0, 2.0]);
        assert_eq!(table.row(2).unwrap(), &[3.0, 4.0]);
        assert!(table.row(3).unwrap().iter().all(|v| v.abs() < INIT_RANGE));
    }

    #[test]
    fn test_load_is_deterministic_for_a_seed() {
        let dir = tempfile::tempdir().unwrap();
        let (vocab, embed) = write_inputs(dir.path());
        let a = EmbeddingTable::load(&vocab, &embed, 2, 9).unwrap();
        let b = EmbeddingTable::load(&vocab, &embed, 2, 9).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrong_vector_width_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (vocab, embed) = write_inputs(dir.path());
        assert!(EmbeddingTable::load(&vocab, &embed, 3, 1).is_err());
    }

    #[test]
    fn test_lookup_rejects_out_of_vocabulary_ids() {
        let table = EmbeddingTable::from_rows(2, vec![0.0, 0.0, 1.0, 1.0]).unwrap();
        let mut out = Vec::new();
        table.lookup_into(&[1, 0], &mut out).unwrap();
        assert_eq!(out, vec![1.0, 1.0, 0.0, 0.0]);
        assert!(table.lookup_into(&[2], &mut out).is_err());
        assert!(table.row(-1).is_err());
    }
}
