use self_play::SelfPlayError;
use std::fmt::{self, Display};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The step of the loop an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configuration,
    Resume,
    SelfPlay,
    BufferSnapshot,
    Training,
    Checkpoint,
    TrainLog,
    Commit,
    Cleanup,
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Configuration => "configuration",
            Phase::Resume => "resume",
            Phase::SelfPlay => "self play",
            Phase::BufferSnapshot => "buffer snapshot",
            Phase::Training => "training",
            Phase::Checkpoint => "checkpoint",
            Phase::TrainLog => "train log",
            Phase::Commit => "commit",
            Phase::Cleanup => "cleanup",
        };

        f.write_str(name)
    }
}

/// Errors that stop the loop. `generation` is always the generation that was being produced, which
/// is one past the last committed generation.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("self play failed for generation {generation}")]
    SelfPlay {
        generation: usize,
        #[source]
        source: SelfPlayError,
    },

    #[error("self play produced no examples for generation {generation}")]
    EmptyGeneration { generation: usize },

    #[error("training failed for generation {generation}")]
    Training {
        generation: usize,
        #[source]
        source: BoxError,
    },

    #[error("failed to persist the {phase} of generation {generation}")]
    Persistence {
        generation: usize,
        phase: Phase,
        #[source]
        source: BoxError,
    },

    #[error("generation {generation} was cancelled before it was committed")]
    Cancelled { generation: usize },
}

impl LoopError {
    pub fn persistence(generation: usize, phase: Phase) -> impl FnOnce(anyhow::Error) -> Self {
        move |err| LoopError::Persistence {
            generation,
            phase,
            source: err.into(),
        }
    }

    pub fn from_self_play(generation: usize, err: SelfPlayError) -> Self {
        match err {
            SelfPlayError::Cancelled { .. } => LoopError::Cancelled { generation },
            source => LoopError::SelfPlay { generation, source },
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            LoopError::Configuration(_) => Phase::Configuration,
            LoopError::SelfPlay { .. } => Phase::SelfPlay,
            LoopError::EmptyGeneration { .. } => Phase::SelfPlay,
            LoopError::Training { .. } => Phase::Training,
            LoopError::Persistence { phase, .. } => *phase,
            LoopError::Cancelled { .. } => Phase::SelfPlay,
        }
    }

    pub fn generation(&self) -> Option<usize> {
        match self {
            LoopError::Configuration(_) => None,
            LoopError::SelfPlay { generation, .. }
            | LoopError::EmptyGeneration { generation }
            | LoopError::Training { generation, .. }
            | LoopError::Persistence { generation, .. }
            | LoopError::Cancelled { generation } => Some(*generation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_persistence_error_keeps_phase_and_generation() {
        let err = LoopError::persistence(3, Phase::Checkpoint)(anyhow!("disk full"));

        assert_eq!(err.phase(), Phase::Checkpoint);
        assert_eq!(err.generation(), Some(3));
        assert_eq!(
            err.to_string(),
            "failed to persist the checkpoint of generation 3"
        );
    }

    #[test]
    fn test_self_play_cancellation_is_cancelled() {
        let err = LoopError::from_self_play(
            4,
            SelfPlayError::Cancelled {
                played: 1,
                expected: 2,
            },
        );

        assert!(matches!(err, LoopError::Cancelled { generation: 4 }));
    }

    #[test]
    fn test_self_play_failure_keeps_source() {
        let err = LoopError::from_self_play(2, SelfPlayError::WorkerPanicked);

        assert_eq!(err.phase(), Phase::SelfPlay);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_configuration_has_no_generation() {
        let err = LoopError::Configuration("buffer_gen_count must be positive".to_string());

        assert_eq!(err.generation(), None);
        assert_eq!(err.phase(), Phase::Configuration);
    }
}
