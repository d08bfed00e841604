//! Shared fixtures for the integration tests
//!
//! Each test binary compiles this module separately and uses only part of
//! it.
#![allow(dead_code, unused_imports)]

pub mod corpus;
pub mod vectors;

pub use corpus::{
    lexicon, random_documents, random_lexicon, random_prose, random_words, seeded,
    write_labels, write_paired_corpus, PHRASE_POOL, WORDS,
};
pub use vectors::{concept_space, random_space, space_from, CallCounter, CountingSpace};
