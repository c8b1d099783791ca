//! Burn models for image segmentation.
//!
//! - `UNet`: encoder/decoder with skip connections and a 1x1 class head.
//! - `summary`: layer-by-layer output shape and parameter reporting.
//!
//! These are pure Burn modules; the training crate owns losses and optimizers.

pub mod summary;
mod unet;

pub use summary::{report, summarize, LayerSummary, ModelSummary, Summarize, SummaryError};
pub use unet::{DoubleConv, UNet, UNetConfig, UpBlock};
