//! Two-layer digit classifier (CPU-only, dependency-light).
//!
//! `tensor` holds the dense matrix type, `params` the validated parameter
//! set, `engine` the pure forward/backward/update functions.

pub mod engine;
pub mod params;
pub mod tensor;

pub use engine::{Activations, Gradients, TrainStep};
pub use params::{ParameterShapes, Parameters, INPUT_DIM, NUM_CLASSES};
pub use tensor::Matrix;
