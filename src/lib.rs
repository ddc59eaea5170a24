pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod ml;
pub mod persistence;
pub mod services;

pub use config::AppConfig;
pub use error::{DigitError, Result};
pub use ml::{Matrix, Parameters};
pub use persistence::{JsonModelFile, ModelRepository, ParameterStore};
pub use services::ClassifierService;
