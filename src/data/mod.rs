//! Data model of a loaded rule set.
//!
//! `unbound` holds the parse-phase records, `bound` the link-phase entities,
//! and `dataset` the immutable container handed to the embedding application.

pub mod bound;
pub mod choosers;
pub mod dataset;
pub mod keyed;
pub mod types;
pub mod unbound;
