//! Vector space fixtures

use conceptlink::{EmbeddingError, InMemoryVectorSpace, Neighbor, VectorSpace};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn space_from(entries: &[(&str, Vec<f32>)]) -> InMemoryVectorSpace {
    let space = InMemoryVectorSpace::new();
    for (term, vector) in entries {
        space.insert(*term, vector.clone()).unwrap();
    }
    space
}

/// Random unit-free vectors for every term.
pub fn random_space(rng: &mut StdRng, terms: &[&str], dimension: usize) -> InMemoryVectorSpace {
    let space = InMemoryVectorSpace::new();
    for term in terms {
        let vector: Vec<f32> = (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();
        space.insert(*term, vector).unwrap();
    }
    space
}

/// A small space where joined concept tokens sit next to their variants.
pub fn concept_space() -> InMemoryVectorSpace {
    space_from(&[
        ("machine_learning", vec![0.9, 0.1, 0.0]),
        ("machine_learnings", vec![0.88, 0.12, 0.0]),
        ("deep_learning", vec![0.8, 0.3, 0.0]),
        ("semantic_web", vec![0.0, 0.2, 0.95]),
        ("semantic_webs", vec![0.05, 0.2, 0.9]),
        ("banana", vec![-0.7, 0.7, 0.1]),
    ])
}

/// Shared call counter for verifying at-most-once computation.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Counts neighbor queries made against the wrapped space.
pub struct CountingSpace {
    pub inner: InMemoryVectorSpace,
    pub calls: CallCounter,
}

impl CountingSpace {
    pub fn new(inner: InMemoryVectorSpace) -> Self {
        Self {
            inner,
            calls: CallCounter::default(),
        }
    }
}

impl VectorSpace for CountingSpace {
    fn contains(&self, term: &str) -> bool {
        self.inner.contains(term)
    }

    fn nearest(&self, term: &str, k: usize) -> Result<Vec<Neighbor>, EmbeddingError> {
        self.calls.bump();
        self.inner.nearest(term, k)
    }

    fn vocabulary(&self) -> Vec<String> {
        self.inner.vocabulary()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
