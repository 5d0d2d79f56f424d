use super::ModelInfo;

/// A serialized network snapshot. The network bytes are opaque to everything except the network
/// factory, the trainer and the self play players that produced or consume them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    info: ModelInfo,
    network: Vec<u8>,
}

impl Checkpoint {
    pub fn new(info: ModelInfo, network: Vec<u8>) -> Self {
        Self { info, network }
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn generation(&self) -> usize {
        self.info.generation()
    }

    pub fn network(&self) -> &[u8] {
        &self.network
    }
}
