//! NLP model-suite interface for neuroDash.
//!
//! The enrichment pipeline never talks to a concrete model runtime. It is
//! handed a [`ModelSuite`]: a bundle of text classifiers, an entity
//! extractor, a pathology-domain detector and a sectioner, each behind a
//! trait. This crate defines those traits, the types they return, and a
//! rule-based reference suite that needs no model files.

pub mod capability;
pub mod domains;
pub mod extraction;
pub mod keyword;

pub use capability::*;
pub use domains::*;
pub use extraction::*;
pub use keyword::*;
