mod args;
mod classification;
mod embedding;
mod error;
mod features;
mod input;
mod patches;
mod utils;

use std::process::exit;

use args::{Args, ClassifyArgs, Command, EvaluateArgs, ExtractArgs};
use clap::Parser;
use log::{error, info};

use classification::evaluation::evaluate_table;
use classification::{svm, ClassificationSettings, HyperparameterGrid, SvmClassifier, SvmModel};
use embedding::TorchEmbedder;
use error::Result;
use features::{build_table, table::{load_table, save_table}};
use input::{DirectorySource, ImageSource};

fn extract(args: &ExtractArgs) -> Result<()> {
    let images = DirectorySource::new(&args.images, &args.labels).get_images_and_labels()?;
    info!("Loaded {} images from {:?}", images.len(), args.images);

    let embedder = TorchEmbedder::load(&args.model, args.device())?;
    info!("Embedding patches of {}px (stride {}), {} aggregation", args.patch_size, args.stride(), args.aggregation);
    let table = build_table(&images, &embedder, args.patch_size, args.stride(), args.aggregation)?;

    save_table(&table, &args.output)?;
    info!("Wrote {} rows of {} features to {:?}", table.len(), table.dim(), args.output);
    Ok(())
}

fn classify(args: &ClassifyArgs) -> Result<()> {
    let table = load_table(&args.table)?;
    info!("Loaded {} rows of {} features from {:?}", table.len(), table.dim(), args.table);

    let grid = match &args.grid {
        Some(path) => HyperparameterGrid::from_json_file(path)?,
        None => svm::default_grid(),
    };
    let settings = ClassificationSettings {
        grid,
        folds: args.folds,
        test_fraction: args.test_fraction,
        seed: args.seed,
    };

    let outcome = classification::run(&SvmClassifier, &table, &settings)?;

    classification::evaluation::write_misclassified(&outcome.holdout.misclassified, &args.misclassified)?;
    info!("Misclassified images written to {:?}", args.misclassified);
    if let Some(checkpoint) = &args.checkpoint {
        outcome.model.save(checkpoint)?;
        info!("Classifier ({}) saved to {:?}", outcome.model.configuration(), checkpoint);
    }
    Ok(())
}

fn evaluate_checkpoint(args: &EvaluateArgs) -> Result<()> {
    let model = SvmModel::load(&args.checkpoint)?;
    info!("Loaded classifier {} from {:?}", model.configuration(), args.checkpoint);
    let table = load_table(&args.table)?;

    let result = evaluate_table(&model, &table, model.classes()?)?;
    info!("Accuracy {:.4}, {}", result.accuracy, result.confusion);
    info!("{} misclassified image(s)", result.misclassified.len());

    classification::evaluation::write_misclassified(&result.misclassified, &args.misclassified)?;
    info!("Misclassified images written to {:?}", args.misclassified);
    Ok(())
}

fn main() {
    let args = Args::parse();
    args.init_logger();
    args.handle_verbose();
    args.handle_thread_count();
    args.validate_paths();
    args.validate_gpu();

    let res = match &args.command {
        Command::Extract(extract_args) => extract(extract_args),
        Command::Classify(classify_args) => classify(classify_args),
        Command::Evaluate(evaluate_args) => evaluate_checkpoint(evaluate_args),
    };
    if let Err(err) = res {
        error!("{}", err);
        exit(1);
    }
}
