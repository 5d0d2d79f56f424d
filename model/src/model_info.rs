use serde::{Deserialize, Serialize};

const MODEL_NAME_PREFIX: &str = "gen_";

/// Identifies a network by the generation that produced it. Generation 0 is the untrained network
/// created by the initial network factory.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelInfo {
    generation: usize,
}

impl ModelInfo {
    pub fn new(generation: usize) -> Self {
        Self { generation }
    }

    pub fn from_model_name(model_name: &str) -> Option<Self> {
        model_name
            .strip_prefix(MODEL_NAME_PREFIX)
            .filter(|num| !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()))
            .and_then(|num| num.parse().ok())
            .map(Self::new)
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn model_name(&self) -> String {
        format!("{}{:0>5}", MODEL_NAME_PREFIX, self.generation)
    }
}
