use clap::Parser;
use seg_dataset::{index_split, validate_dataset_root};
use seg_training::logger::init_tracing;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "validate_dataset",
    about = "Check a dataset root for train/test/eval splits with images/ and masks/"
)]
struct Args {
    /// Dataset root to check.
    root: PathBuf,
    /// Also pair every image with its mask and report counts per split.
    #[arg(long, default_value_t = false)]
    index: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(false)?;
    let layout = match validate_dataset_root(&args.root) {
        Ok(layout) => layout,
        Err(e) => {
            tracing::error!("{e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    println!("Train path: {}", layout.train.root.display());
    println!("Test path: {}", layout.test.root.display());
    println!("Eval path: {}", layout.eval.root.display());
    if args.index {
        for split in [&layout.train, &layout.test, &layout.eval] {
            let pairs = index_split(split)?;
            println!("{}: {} image/mask pairs", split.name, pairs.len());
        }
    }
    Ok(ExitCode::SUCCESS)
}
