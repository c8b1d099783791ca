use burn::tensor::backend::Backend;
use clap::Parser;
use seg_models::{report, UNet};
use seg_training::config::TrainConfig;
use seg_training::logger::init_tracing;
use seg_training::util::{default_input_size, parse_input_size};
use seg_training::TrainBackend;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "model_summary", about = "Print a layer-by-layer U-Net summary")]
struct Args {
    /// TOML config file; its [model] section describes the network.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Input size as C,H,W (defaults to the configured resize target).
    #[arg(long, value_parser = parse_input_size)]
    input: Option<[usize; 3]>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(false)?;
    let cfg = TrainConfig::load(args.config.as_deref())?;
    let device = <TrainBackend as Backend>::Device::default();
    let model = UNet::<TrainBackend>::new(&cfg.model, &device);
    let input = args
        .input
        .unwrap_or_else(|| default_input_size(&cfg.model, &cfg));
    report(&model, input)?;
    Ok(())
}
