use clap::Parser;
use seg_training::logger::init_tracing;
use seg_training::util::{run_train, TrainArgs};

fn main() -> anyhow::Result<()> {
    let args = TrainArgs::parse();
    init_tracing(args.verbose)?;
    run_train(args)
}
