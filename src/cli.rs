use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::{DigitError, Result};
use crate::ml::{engine, Parameters};
use crate::persistence::{JsonModelFile, ModelRepository};
use crate::services::{normalize_image, Prediction};

#[derive(Parser)]
#[command(name = "digit-recognizer")]
#[command(version)]
#[command(about = "Handwritten digit classifier with online single-sample training", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory (default.toml, <DIGIT_ENV>.toml)
    #[arg(short, long, default_value = "config")]
    pub config: PathBuf,

    /// Model file path (overrides model.path)
    #[arg(short, long)]
    pub model: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the prediction/training HTTP API
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Write parameters back to the model file after each training request
        #[arg(long)]
        persist: bool,
    },
    /// Classify one image stored as a JSON array of 784 pixels (0-255)
    Predict {
        /// Path to the image JSON (`[..]` or `{"image": [..]}`)
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Load and validate the model file, then print its shapes
    Inspect,
    /// Write a freshly initialized model file
    Init {
        /// Hidden layer width (overrides model.hidden_units)
        #[arg(long)]
        hidden: Option<usize>,
        /// RNG seed for reproducible weights
        #[arg(long)]
        seed: Option<u64>,
        /// Overwrite an existing model file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Apply command-line overrides on top of loaded configuration.
    pub fn apply_overrides(&self, cfg: &mut AppConfig) {
        if let Some(path) = &self.model {
            cfg.model.path = path.clone();
        }
        match &self.command {
            Some(Commands::Serve {
                host,
                port,
                persist,
            }) => {
                if let Some(host) = host {
                    cfg.server.host = host.clone();
                }
                if let Some(port) = port {
                    cfg.server.port = *port;
                }
                if *persist {
                    cfg.model.persist_on_train = true;
                }
            }
            Some(Commands::Init {
                hidden: Some(hidden),
                ..
            }) => {
                cfg.model.hidden_units = *hidden;
            }
            _ => {}
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImageFile {
    Bare(Vec<f64>),
    Wrapped { image: Vec<f64> },
}

/// Read an image file, accepting a bare array or an `{"image": [..]}` record.
pub fn read_image(path: &Path) -> Result<Vec<f64>> {
    let content = std::fs::read_to_string(path)?;
    let image: ImageFile = serde_json::from_str(&content).map_err(|e| {
        DigitError::InvalidInput(format!("{} is not an image array: {e}", path.display()))
    })?;
    Ok(match image {
        ImageFile::Bare(pixels) | ImageFile::Wrapped { image: pixels } => pixels,
    })
}

/// Offline prediction against the configured model file.
pub async fn predict_file(cfg: &AppConfig, image: &Path) -> Result<Prediction> {
    let params = JsonModelFile::new(&cfg.model.path).load().await?;
    let x = normalize_image(&read_image(image)?)?;
    let act = engine::forward(&params, &x)?;
    Ok(Prediction {
        class: engine::predict(&act.a2),
        probabilities: act.a2.as_slice().to_vec(),
    })
}

pub fn print_prediction(prediction: &Prediction) {
    println!("prediction: {}", prediction.class);
    for (class, p) in prediction.probabilities.iter().enumerate() {
        let bar = "#".repeat((p * 40.0).round() as usize);
        println!("  {class}: {p:.4} {bar}");
    }
}

pub async fn inspect_model(cfg: &AppConfig) -> Result<Parameters> {
    JsonModelFile::new(&cfg.model.path).load().await
}

pub fn print_summary(cfg: &AppConfig, params: &Parameters) {
    let shapes = params.shapes();
    println!("model file:   {}", cfg.model.path.display());
    println!("hidden units: {}", params.hidden_units());
    println!("W1: {:?}  b1: {:?}", shapes.w1, shapes.b1);
    println!("W2: {:?}  b2: {:?}", shapes.w2, shapes.b2);
}

/// Create a new parameter file with uniform `[-0.5, 0.5)` entries.
pub async fn init_model(cfg: &AppConfig, seed: Option<u64>, force: bool) -> Result<Parameters> {
    let path = &cfg.model.path;
    if !force && tokio::fs::try_exists(path).await? {
        return Err(DigitError::Config(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let params = Parameters::random(cfg.model.hidden_units, &mut rng)?;
    JsonModelFile::new(path).save(&params).await?;
    Ok(params)
}
