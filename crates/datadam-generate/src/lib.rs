//! Operation generation for datadam.
//!
//! Synthesizes random DML payloads against cached table metadata: values are
//! produced per declared column type, operation kinds are picked by smooth
//! weighted round-robin and the [`Generator`] paces everything through a
//! token-bucket rate limiter.

pub mod dml;
pub mod generator;
pub mod memory;
pub mod values;
pub mod weighted;

pub use dml::DmlSynthesizer;
pub use generator::{Generator, GeneratorSettings};
pub use memory::{AppliedOp, MemoryBackend, MemoryFactory, MemoryStore};
pub use values::{ValueGenerator, ValueRegistry};
pub use weighted::SmoothWeighted;
