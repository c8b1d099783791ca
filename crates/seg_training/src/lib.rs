#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod learner;
pub mod logger;
pub mod trainer;
pub mod util;

pub use checkpoint::{checkpoint_path, load_checkpoint, save_checkpoint};
pub use config::TrainConfig;
pub use learner::{pixel_cross_entropy, BurnLearner, SegmentationLearner, SegmentationModel};
pub use logger::{EpochLogger, TracingLogger};
pub use trainer::{run, BatchSource, EpochRecord, TrainingConfig, TrainingState};
pub use util::{run_train, TrainArgs};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
