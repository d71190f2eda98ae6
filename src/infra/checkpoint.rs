// ============================================================
// Layer 6 - Checkpoint Store
// ============================================================
// Owns the checkpoint directory. Layout:
//
//   checkpoints/
//     model_3_1200.ckpt/     ← the one kept checkpoint
//       model.mpk            ← weights (burn CompactRecorder)
//       optimizer.mpk        ← optimizer state
//       config.json          ← model architecture
//       state.json           ← {"epoch":3,"step":1200,"metric":0.71}
//     latest                 ← name of the kept checkpoint
//     run_config.json        ← full run configuration
//     metrics.csv            ← one row per evaluation
//
// A save is written into a hidden temporary directory first and
// renamed into place only once every file is on disk. The older
// checkpoint is removed after the rename, so an interrupted run
// always leaves at least one complete checkpoint behind.
//
// Only one checkpoint is retained (keep-1).
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{bail, Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::traits::TrainableModel;
use crate::ml::policy::CheckpointId;

/// File stem of the weight record inside a checkpoint.
pub const MODEL_RECORD: &str = "model";
/// File stem of the optimizer record inside a checkpoint.
pub const OPTIMIZER_RECORD: &str = "optimizer";
/// Model architecture, needed to rebuild the model before loading weights.
pub const MODEL_CONFIG: &str = "config.json";

const STATE_FILE: &str = "state.json";
const LATEST_FILE: &str = "latest";

/// Metadata written next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub epoch:  usize,
    pub step:   usize,
    pub metric: f64,
}

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open (and create if needed) a checkpoint directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `model_<epoch>_<step>.ckpt`
    pub fn file_name(id: CheckpointId) -> String {
        format!("model_{}_{}.ckpt", id.epoch, id.step)
    }

    pub fn path_for(&self, id: CheckpointId) -> PathBuf {
        self.dir.join(Self::file_name(id))
    }

    /// Persist `model` as checkpoint `id`, replacing any older one.
    pub fn save<M>(&self, model: &M, id: CheckpointId, metric: f64) -> Result<PathBuf>
    where
        M: TrainableModel + ?Sized,
    {
        let name      = Self::file_name(id);
        let final_dir = self.path_for(id);
        let tmp_dir   = self.dir.join(format!(".{name}.tmp"));

        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)
                .with_context(|| format!("Cannot clear '{}'", tmp_dir.display()))?;
        }
        fs::create_dir_all(&tmp_dir)
            .with_context(|| format!("Cannot create '{}'", tmp_dir.display()))?;

        model.save_state(&tmp_dir)?;
        write_json(
            &tmp_dir.join(STATE_FILE),
            &CheckpointState { epoch: id.epoch, step: id.step, metric },
        )?;

        if final_dir.exists() {
            fs::remove_dir_all(&final_dir)
                .with_context(|| format!("Cannot replace '{}'", final_dir.display()))?;
        }
        fs::rename(&tmp_dir, &final_dir).with_context(|| {
            format!("Cannot move checkpoint into place at '{}'", final_dir.display())
        })?;

        self.write_latest(&name)?;
        self.prune_except(&name)?;

        tracing::debug!("Saved checkpoint '{}'", final_dir.display());
        Ok(final_dir)
    }

    /// Path of the kept checkpoint, if any has been written.
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        let pointer = self.dir.join(LATEST_FILE);
        if !pointer.exists() {
            return Ok(None);
        }
        let name = fs::read_to_string(&pointer)
            .with_context(|| format!("Cannot read '{}'", pointer.display()))?;
        Ok(Some(self.dir.join(name.trim())))
    }

    fn write_latest(&self, name: &str) -> Result<()> {
        let pointer = self.dir.join(LATEST_FILE);
        let tmp     = self.dir.join(format!(".{LATEST_FILE}.tmp"));
        fs::write(&tmp, name).with_context(|| format!("Cannot write '{}'", tmp.display()))?;
        fs::rename(&tmp, &pointer)
            .with_context(|| format!("Cannot update '{}'", pointer.display()))?;
        Ok(())
    }

    /// Remove every checkpoint directory except `keep`.
    fn prune_except(&self, keep: &str) -> Result<()> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read '{}'", self.dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let name  = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name != keep && is_checkpoint_name(name) && entry.path().is_dir() {
                fs::remove_dir_all(entry.path())
                    .with_context(|| format!("Cannot remove old checkpoint '{name}'"))?;
                tracing::debug!("Removed old checkpoint '{}'", name);
            }
        }
        Ok(())
    }

    /// Save the run configuration next to the checkpoints.
    pub fn save_run_config<T: Serialize>(&self, config: &T) -> Result<()> {
        write_json(&self.dir.join("run_config.json"), config)
    }
}

/// Read the metadata of a checkpoint directory.
pub fn read_state(checkpoint: &Path) -> Result<CheckpointState> {
    read_json(&checkpoint.join(STATE_FILE))
}

fn is_checkpoint_name(name: &str) -> bool {
    let Some(inner) = name.strip_prefix("model_").and_then(|n| n.strip_suffix(".ckpt")) else {
        return false;
    };
    let mut parts = inner.split('_');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(e), Some(s), None) if e.parse::<usize>().is_ok() && s.parse::<usize>().is_ok()
    )
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        bail!("'{}' does not exist", path.display());
    }
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Cannot parse '{}'", path.display()))
}
