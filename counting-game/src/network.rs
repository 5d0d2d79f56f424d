use anyhow::{Context, Result};
use model::NetworkFactory;
use serde::{Deserialize, Serialize};

use super::value_feature_of_encoded;

/// Policy logits per action plus a single weight scaling the value heuristic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CountingNetwork {
    pub logits: [f32; 3],
    pub value_weight: f32,
}

impl CountingNetwork {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to decode the counting network")
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn policy(&self) -> [f32; 3] {
        softmax(&self.logits)
    }

    pub fn value(&self, state: &[f32]) -> f32 {
        (self.value_weight * value_feature_of_encoded(state)).clamp(-1.0, 1.0)
    }
}

pub fn softmax(logits: &[f32; 3]) -> [f32; 3] {
    let max = logits.iter().fold(f32::MIN, |a, b| a.max(*b));
    let exp = logits.map(|l| (l - max).exp());
    let sum: f32 = exp.iter().sum();

    exp.map(|e| e / sum)
}

/// Creates an untrained network with a uniform policy.
#[derive(Default)]
pub struct CountingNetworkFactory {}

impl CountingNetworkFactory {
    pub fn new() -> Self {
        Self {}
    }
}

impl NetworkFactory for CountingNetworkFactory {
    fn create(&self) -> Result<Vec<u8>> {
        CountingNetwork {
            logits: [0.0; 3],
            value_weight: 0.0,
        }
        .to_bytes()
    }
}
