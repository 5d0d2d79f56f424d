use anyhow::{anyhow, Context, Result};
use common::{is_temp_file, write_atomic};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use model::{Checkpoint, ModelInfo};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tar::Header;

const CHECKPOINTS_DIR_NAME: &str = "checkpoints";
const CHECKPOINT_FILE_EXTENSION: &str = ".ckpt";
const CHECKPOINT_INFO_FILE_NAME: &str = "checkpoint-info.json";
const NETWORK_FILE_NAME: &str = "network.bin";

/// Checkpoints of a run, one gzipped tar archive per generation.
pub struct CheckpointStore {
    checkpoints_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: &Path) -> Result<Self> {
        let checkpoints_dir = root.join(CHECKPOINTS_DIR_NAME);
        fs::create_dir_all(&checkpoints_dir)
            .with_context(|| format!("Failed to create {:?}", checkpoints_dir))?;

        Ok(Self { checkpoints_dir })
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.file_path(checkpoint.generation());

        write_atomic(&path, |writer| {
            let enc = GzEncoder::new(writer, Compression::default());
            let mut builder = tar::Builder::new(enc);

            append_json_file(&mut builder, CHECKPOINT_INFO_FILE_NAME, checkpoint.info())?;
            append_file(&mut builder, NETWORK_FILE_NAME, checkpoint.network())?;

            builder.into_inner()?.finish()?;

            Ok(())
        })
        .with_context(|| format!("Failed to save checkpoint to {:?}", path))?;

        info!("Saved checkpoint {:?}", path);

        Ok(())
    }

    pub fn load(&self, generation: usize) -> Result<Option<Checkpoint>> {
        let path = self.file_path(generation);

        if !path.is_file() {
            return Ok(None);
        }

        let checkpoint =
            unarchive(&path).with_context(|| format!("Failed to load checkpoint {:?}", path))?;

        if checkpoint.generation() != generation {
            return Err(anyhow!(
                "Checkpoint {:?} contains generation {} but expected {}",
                path,
                checkpoint.generation(),
                generation
            ));
        }

        Ok(Some(checkpoint))
    }

    pub fn latest(&self) -> Result<Option<Checkpoint>> {
        match self.generations()?.last() {
            Some(generation) => self.load(*generation),
            None => Ok(None),
        }
    }

    pub fn contains(&self, generation: usize) -> bool {
        self.file_path(generation).is_file()
    }

    /// Stored generations in ascending order.
    pub fn generations(&self) -> Result<Vec<usize>> {
        let mut generations = fs::read_dir(&self.checkpoints_dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && !is_temp_file(p))
            .filter_map(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_suffix(CHECKPOINT_FILE_EXTENSION))
                    .and_then(ModelInfo::from_model_name)
                    .map(|info| info.generation())
            })
            .collect::<Vec<_>>();

        generations.sort_unstable();

        Ok(generations)
    }

    pub fn remove(&self, generation: usize) -> Result<()> {
        let path = self.file_path(generation);

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove checkpoint {:?}", path)),
        }
    }

    pub fn file_path(&self, generation: usize) -> PathBuf {
        self.checkpoints_dir.join(format!(
            "{}{}",
            ModelInfo::new(generation).model_name(),
            CHECKPOINT_FILE_EXTENSION
        ))
    }
}

fn unarchive(path: &Path) -> Result<Checkpoint> {
    let file = File::open(path)?;
    let enc = GzDecoder::new(file);
    let mut archive = tar::Archive::new(enc);
    let mut info: Option<ModelInfo> = None;
    let mut network: Option<Vec<u8>> = None;

    for file in archive.entries()? {
        let mut file = file?;
        let path = file.header().path()?;

        if path.ends_with(Path::new(CHECKPOINT_INFO_FILE_NAME)) {
            info = Some(serde_json::from_reader(file)?);
        } else if path.ends_with(Path::new(NETWORK_FILE_NAME)) {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            network = Some(bytes);
        }
    }

    Ok(Checkpoint::new(
        info.context("Expected info to exist in checkpoint archive")?,
        network.context("Expected network to exist in checkpoint archive")?,
    ))
}

fn append_json_file(
    builder: &mut tar::Builder<impl Write>,
    path: impl AsRef<Path>,
    data: &impl Serialize,
) -> Result<()> {
    let data = serde_json::to_vec(data)?;

    append_file(builder, path, &data)
}

fn append_file(
    builder: &mut tar::Builder<impl Write>,
    path: impl AsRef<Path>,
    data: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_path(path)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    builder.append(&header, data)?;

    Ok(())
}
