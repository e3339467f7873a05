use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facereg_core::{
    DistanceMetric, EmbedError, Embedding, EnrollOutcome, FaceEmbedder, FaceRegistry, IdentityStore,
    ModelFamily, OnnxEmbedder,
};
use image::DynamicImage;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facereg", about = "Face identity registry CLI", version)]
struct Cli {
    /// Identity store file
    #[arg(long, env = "FACEREG_DB_PATH", default_value = "face_db.txt", global = true)]
    db: PathBuf,

    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, env = "FACEREG_MODEL_DIR", global = true)]
    model_dir: Option<PathBuf>,

    /// Recognition model family (selects default thresholds)
    #[arg(long, env = "FACEREG_MODEL", default_value = "ArcFace", global = true)]
    model: ModelFamily,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person from a face image
    Enroll {
        /// Person name
        name: String,
        /// Image containing the person's face
        image: PathBuf,
    },
    /// Identify the person in a face image
    Recognize {
        image: PathBuf,
        /// cosine, euclidean or euclidean_l2
        #[arg(long, default_value = "cosine")]
        metric: DistanceMetric,
        /// Maximum distance for a match (default: model's calibrated value)
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// List enrolled persons
    List,
    /// Remove every record for a person
    Delete { name: String },
    /// Show store and model status
    Status,
}

/// Loads the ONNX models on first use, so store-only commands never need them.
struct LazyEmbedder {
    model_dir: PathBuf,
    inner: Option<OnnxEmbedder>,
}

impl LazyEmbedder {
    fn new(model_dir: PathBuf) -> Self {
        Self { model_dir, inner: None }
    }

    fn model_path(&self, file: &str) -> String {
        self.model_dir.join(file).to_string_lossy().into_owned()
    }
}

impl FaceEmbedder for LazyEmbedder {
    fn represent(&mut self, image: &DynamicImage) -> Result<Embedding, EmbedError> {
        let embedder = match self.inner.take() {
            Some(embedder) => embedder,
            None => {
                tracing::debug!(dir = %self.model_dir.display(), "loading face models");
                let embedder = OnnxEmbedder::load(
                    &self.model_path(facereg_core::DETECTOR_MODEL_FILE),
                    &self.model_path(facereg_core::RECOGNIZER_MODEL_FILE),
                )?;
                tracing::info!("face models loaded");
                embedder
            }
        };
        self.inner.insert(embedder).represent(image)
    }
}

fn open_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("reading image {}", path.display()))
}

fn run(cli: Cli) -> Result<()> {
    let model_dir = cli.model_dir.unwrap_or_else(facereg_core::default_model_dir);
    tracing::debug!(db = %cli.db.display(), model = %cli.model, "opening registry");
    let mut registry = FaceRegistry::new(
        LazyEmbedder::new(model_dir),
        IdentityStore::new(cli.db),
        cli.model,
    );

    match cli.command {
        Commands::Enroll { name, image } => {
            let img = open_image(&image)?;
            match registry.enroll(&name, &img)? {
                EnrollOutcome::Added => println!("Person {name} added to the database"),
                EnrollOutcome::Duplicate { existing } => {
                    println!("This person was added before to the database (as {existing})")
                }
            }
        }
        Commands::Recognize {
            image,
            metric,
            threshold,
        } => {
            let img = open_image(&image)?;
            match registry.recognize(&img, metric, threshold)? {
                Some(m) => println!("{} (distance {:.4})", m.name, m.distance),
                None => println!("No matching person found"),
            }
        }
        Commands::List => {
            for name in registry.list_all()? {
                println!("{name}");
            }
        }
        Commands::Delete { name } => {
            if registry.delete(&name)? {
                println!("Person {name} deleted from the database");
            } else {
                anyhow::bail!("Person {name} not found in the database");
            }
        }
        Commands::Status => {
            let status = registry.status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse())
}
