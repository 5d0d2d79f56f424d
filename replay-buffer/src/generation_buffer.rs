use log::debug;
use model::Example;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Holds the examples of the most recent `capacity` generations.
///
/// Appending and evicting happen under the same write lock, so a reader calling `aggregate` never
/// observes more than `capacity` generations or a generation that has already been evicted.
pub struct GenerationBuffer {
    capacity: usize,
    generations: RwLock<BTreeMap<usize, Vec<Arc<Example>>>>,
}

impl GenerationBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "A generation buffer must retain at least one generation");

        Self {
            capacity,
            generations: RwLock::new(BTreeMap::new()),
        }
    }

    /// Adds the examples of `generation` and evicts every generation that falls outside of the
    /// retention window ending at the newest generation. Returns the evicted generations.
    pub fn append<I>(&self, generation: usize, examples: I) -> Vec<usize>
    where
        I: IntoIterator<Item = Example>,
    {
        let examples = examples.into_iter().map(Arc::new).collect::<Vec<_>>();
        let mut generations = self.generations.write();

        debug!(
            "Appending {} examples for generation {}",
            examples.len(),
            generation
        );

        generations.insert(generation, examples);

        let newest = generations.keys().next_back().copied().unwrap_or(generation);
        let min_retained = (newest + 1).saturating_sub(self.capacity);

        Self::evict(&mut generations, min_retained)
    }

    /// Discards every generation with an index below `min_generation`.
    pub fn evict_older_than(&self, min_generation: usize) -> Vec<usize> {
        Self::evict(&mut self.generations.write(), min_generation)
    }

    /// All retained examples ordered by generation and then by insertion order.
    pub fn aggregate(&self) -> Vec<Arc<Example>> {
        self.generations
            .read()
            .values()
            .flat_map(|examples| examples.iter().cloned())
            .collect()
    }

    pub fn size(&self) -> usize {
        self.generations.read().values().map(|e| e.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn generations(&self) -> Vec<usize> {
        self.generations.read().keys().copied().collect()
    }

    fn evict(
        generations: &mut BTreeMap<usize, Vec<Arc<Example>>>,
        min_generation: usize,
    ) -> Vec<usize> {
        let retained = generations.split_off(&min_generation);
        let evicted = std::mem::replace(generations, retained);

        evicted.into_keys().collect()
    }
}
