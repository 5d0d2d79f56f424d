use anyhow::{Context, Result};
use common::{is_temp_file, write_atomic};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use model::{Example, ModelInfo};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

const GAMES_FILE_EXTENSION: &str = ".json.gz";

/// Stores the examples of each generation in its own gzipped json file so that the buffer can be
/// rebuilt after a restart.
pub struct BufferPersistance {
    games_dir: PathBuf,
}

impl BufferPersistance {
    pub fn new(games_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&games_dir)
            .with_context(|| format!("Failed to create games dir {:?}", games_dir))?;

        Ok(Self { games_dir })
    }

    pub fn write(&self, generation: usize, examples: &[Example]) -> Result<()> {
        let file_path = self.file_path(generation);

        write_atomic(&file_path, |writer| {
            let mut compressor = GzEncoder::new(writer, Compression::default());
            serde_json::to_writer(&mut compressor, examples)?;
            compressor.finish()?;
            Ok(())
        })
        .with_context(|| format!("Failed to write examples to {:?}", file_path))
    }

    pub fn read(&self, generation: usize) -> Result<Vec<Example>> {
        let file_path = self.file_path(generation);
        let file = File::open(&file_path)
            .with_context(|| format!("Failed to open examples file {:?}", file_path))?;
        let content = GzDecoder::new(BufReader::new(file));
        let examples = serde_json::from_reader(content)
            .with_context(|| format!("Failed to read examples from {:?}", file_path))?;

        Ok(examples)
    }

    pub fn contains(&self, generation: usize) -> bool {
        self.file_path(generation).is_file()
    }

    /// Generations with a complete examples file, in ascending order.
    pub fn generations(&self) -> Result<Vec<usize>> {
        let mut generations = fs::read_dir(&self.games_dir)?
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|f| f.is_file()))
            .map(|e| e.path())
            .filter(|p| !is_temp_file(p))
            .filter_map(|p| generation_from_path(&p))
            .collect::<Vec<_>>();

        generations.sort_unstable();

        Ok(generations)
    }

    pub fn remove(&self, generation: usize) -> Result<()> {
        let file_path = self.file_path(generation);

        match fs::remove_file(&file_path) {
            Ok(()) => {
                info!("Removed examples file {:?}", file_path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove examples file {:?}", file_path))
            }
        }
    }

    /// Removes every stored generation outside of `min..=max`. Returns the removed generations.
    pub fn remove_outside(&self, min: usize, max: usize) -> Result<Vec<usize>> {
        let removed = self
            .generations()?
            .into_iter()
            .filter(|g| *g < min || *g > max)
            .collect::<Vec<_>>();

        for generation in &removed {
            self.remove(*generation)?;
        }

        Ok(removed)
    }

    pub fn file_path(&self, generation: usize) -> PathBuf {
        self.games_dir.join(format!(
            "{}{}",
            ModelInfo::new(generation).model_name(),
            GAMES_FILE_EXTENSION
        ))
    }
}

fn generation_from_path(path: &Path) -> Option<usize> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(GAMES_FILE_EXTENSION))
        .and_then(ModelInfo::from_model_name)
        .map(|info| info.generation())
}
