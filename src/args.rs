use std::{path::PathBuf, process::exit};
use clap::{Parser, Subcommand};
use log::{debug, error};

use crate::features::Aggregation;

#[derive(Debug, Parser, Clone)]
#[clap(name = "patch-fusion", version)]
/// Image classification from aggregated patch embeddings
pub struct Args{
    #[clap(subcommand)]
    pub command: Command,
    /// Overwrite :
    /// if specified, will overwrite the output files if they already exist
    #[clap(short, long, global = true)]
    pub overwrite: bool,
    /// Thread count :
    /// the number of threads used by rayon
    /// if not specified, rayon will use the number of cores available on the machine
    #[clap(short, long, global = true)]
    pub thread_count: Option<usize>,
    /// verbose :
    /// if specified, will print more information
    #[clap(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command{
    /// Build the feature table of a directory of labeled images
    Extract(ExtractArgs),
    /// Tune, train and evaluate the classifier on a feature table
    Classify(ClassifyArgs),
    /// Evaluate a saved classifier checkpoint on a feature table
    Evaluate(EvaluateArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct ExtractArgs{
    /// Input image directory
    pub images: PathBuf,
    /// Labels file (.json) mapping image file names to their class
    pub labels: PathBuf,
    /// Embedding model (TorchScript module)
    pub model: PathBuf,
    /// Output feature table (.parquet, .ipc, .arrow or .json)
    pub output: PathBuf,
    /// Patch size :
    /// the size of the square patches cut from the images (in pixels)
    #[clap(short, long, default_value = "32")]
    pub patch_size: usize,
    /// Stride :
    /// the step between two patches (in pixels), defaults to the patch size
    #[clap(short, long)]
    pub stride: Option<usize>,
    /// Aggregation :
    /// how the patch embeddings of an image are combined (mean, max)
    #[clap(short, long, default_value = "mean")]
    pub aggregation: Aggregation,
    /// gpu :
    /// if specified, will run the embedding model on this gpu
    /// if not specified, will use the cpu
    #[clap(short, long)]
    pub gpu: Option<usize>,
}

#[derive(Debug, Parser, Clone)]
pub struct ClassifyArgs{
    /// Input feature table
    pub table: PathBuf,
    /// Hyperparameter grid (.json), e.g. {"C": [1, 10], "gamma": [0.01, 0.1]}
    #[clap(short, long)]
    pub grid: Option<PathBuf>,
    /// Number of cross-validation folds :
    /// the rows left once the test fraction is held out must be at least as
    /// many as the folds, so a table needs roughly folds / (1 - test fraction)
    /// rows or more
    #[clap(short = 'k', long, default_value = "10")]
    pub folds: usize,
    /// Share of each class held out for the final evaluation
    #[clap(long, default_value = "0.2")]
    pub test_fraction: f64,
    /// Seed of the hold-out split
    #[clap(long, default_value = "0")]
    pub seed: u64,
    /// Misclassification report (.json, .parquet, .ipc or .arrow)
    #[clap(short, long, default_value = "misclassified.json")]
    pub misclassified: PathBuf,
    /// Where to save the trained classifier (.json)
    #[clap(short, long)]
    pub checkpoint: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct EvaluateArgs{
    /// Classifier checkpoint (.json)
    pub checkpoint: PathBuf,
    /// Input feature table
    pub table: PathBuf,
    /// Misclassification report (.json, .parquet, .ipc or .arrow)
    #[clap(short, long, default_value = "misclassified.json")]
    pub misclassified: PathBuf,
}

impl ExtractArgs{
    pub fn stride(&self) -> usize{
        self.stride.unwrap_or(self.patch_size)
    }

    pub fn device(&self) -> tch::Device{
        match self.gpu {
            Some(gpu) => tch::Device::Cuda(gpu),
            None => tch::Device::Cpu,
        }
    }
}

impl Args{
    pub fn init_logger(&self){
        let level = if self.verbose {log::LevelFilter::Debug} else {log::LevelFilter::Info};
        let mut builder = pretty_env_logger::formatted_builder();
        builder.filter_level(level);
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        builder.init();
    }

    pub fn handle_verbose(&self){
        if !self.verbose{return}
        debug!("Called Args :");
        debug!("{:#?}", self.command);
    }

    pub fn handle_thread_count(&self){
        if let Some(thread_count) = self.thread_count {
            if let Err(err) = rayon::ThreadPoolBuilder::new()
                .num_threads(thread_count)
                .build_global() {
                error!("Couldn't configure the thread pool : {}", err);
                exit(1);
            }
        }
    }

    fn require_input(path: &PathBuf, what: &str){
        if !path.exists(){
            error!("{} does not exist : {:?}", what, path);
            exit(1);
        }
    }

    fn require_output(&self, path: &PathBuf){
        if path.exists() && !self.overwrite{
            error!("Output file already exists : {:?}\nUse --overwrite to overwrite it", path);
            exit(1);
        }
    }

    pub fn validate_paths(&self){
        match &self.command {
            Command::Extract(args) => {
                Self::require_input(&args.images, "Image directory");
                Self::require_input(&args.labels, "Labels file");
                Self::require_input(&args.model, "Embedding model");
                self.require_output(&args.output);
            }
            Command::Classify(args) => {
                Self::require_input(&args.table, "Feature table");
                if let Some(grid) = &args.grid {
                    Self::require_input(grid, "Grid file");
                }
                self.require_output(&args.misclassified);
                if let Some(checkpoint) = &args.checkpoint {
                    self.require_output(checkpoint);
                }
            }
            Command::Evaluate(args) => {
                Self::require_input(&args.checkpoint, "Checkpoint");
                Self::require_input(&args.table, "Feature table");
                self.require_output(&args.misclassified);
            }
        }
    }

    pub fn validate_gpu(&self){
        let Command::Extract(ExtractArgs{gpu: Some(gpu), ..}) = &self.command else {return};
        if !tch::Cuda::is_available() {
            error!("No GPU available\nCheck that CUDA is installed and that your GPU is compatible with CUDA\nCheck that you specified the right version of libtorch in LIBTORCH and LD_LIBRARY_PATH");
            exit(1);
        }
        let device_count = tch::Cuda::device_count();
        if *gpu >= device_count as usize{
            error!("GPU {} does not exist", gpu);
            exit(1);
        }
    }
}
