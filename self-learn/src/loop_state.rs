use anyhow::{Context, Result};
use common::write_atomic;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

const LOOP_STATE_FILE_NAME: &str = "loop_state.json";

/// Progress marker of a loop run. Only ever written after the checkpoint and buffer snapshot of
/// `last_completed_generation` are durable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoopState {
    pub last_completed_generation: usize,
    /// Generations whose buffer snapshots make up the replay buffer after the commit.
    pub buffer_generations: Vec<usize>,
}

impl LoopState {
    /// Returns `None` for a fresh run.
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = Self::file_path(root);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to open {:?}", path)),
        };

        let state = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse loop state at {:?}", path))?;

        Ok(Some(state))
    }

    pub fn commit(root: &Path, generation: usize, buffer_generations: Vec<usize>) -> Result<Self> {
        let state = Self {
            last_completed_generation: generation,
            buffer_generations,
        };

        let path = Self::file_path(root);
        write_atomic(&path, |writer| Ok(serde_json::to_writer_pretty(writer, &state)?))
            .with_context(|| format!("Failed to commit loop state to {:?}", path))?;

        Ok(state)
    }

    pub fn file_path(root: &Path) -> PathBuf {
        root.join(LOOP_STATE_FILE_NAME)
    }
}
