//! Parameter persistence and the shared in-memory parameter set.
//!
//! - `model_file`: the `ModelRepository` seam and its JSON file implementation
//! - `parameter_store`: atomic snapshot swaps with single-writer discipline

pub mod model_file;
pub mod parameter_store;

pub use model_file::{JsonModelFile, ModelRepository};
pub use parameter_store::{Committed, ParameterStore};
