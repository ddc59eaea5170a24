pub mod classifier;

pub use classifier::{normalize_image, ClassifierService, Prediction, TrainOutcome};
