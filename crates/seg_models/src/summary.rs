//! Layer-by-layer model summaries: output shape and parameter count per layer
//! for one forward pass over a zero input.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SummaryError {
    #[error("model expects {expected} input channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("input {height}x{width} must be non-empty and divisible by {multiple}")]
    SpatialSize {
        height: usize,
        width: usize,
        multiple: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    pub name: String,
    pub output_shape: Vec<usize>,
    pub params: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSummary {
    /// `[C, H, W]` without the batch dimension.
    pub input_size: [usize; 3],
    pub layers: Vec<LayerSummary>,
    pub total_params: usize,
}

/// Models that can describe their layers for a given input.
pub trait Summarize<B: Backend> {
    fn check_input(&self, input_size: [usize; 3]) -> Result<(), SummaryError>;
    fn trace_layers(&self, input: Tensor<B, 4>) -> Vec<LayerSummary>;
    fn device(&self) -> B::Device;
    fn total_params(&self) -> usize;
}

pub fn summarize<B: Backend, M: Summarize<B>>(
    model: &M,
    input_size: [usize; 3],
) -> Result<ModelSummary, SummaryError> {
    model.check_input(input_size)?;
    let [c, h, w] = input_size;
    let input = Tensor::<B, 4>::zeros([1, c, h, w], &model.device());
    Ok(ModelSummary {
        input_size,
        layers: model.trace_layers(input),
        total_params: model.total_params(),
    })
}

/// Print the summary table to stdout and hand it back.
pub fn report<B: Backend, M: Summarize<B>>(
    model: &M,
    input_size: [usize; 3],
) -> Result<ModelSummary, SummaryError> {
    let summary = summarize(model, input_size)?;
    println!("{summary}");
    Ok(summary)
}

fn shape_label(shape: &[usize]) -> String {
    // Batch dimension is shown as -1: the table holds for any batch size.
    let dims: Vec<String> = std::iter::once("-1".to_string())
        .chain(shape.iter().skip(1).map(|d| d.to_string()))
        .collect();
    format!("[{}]", dims.join(", "))
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(64);
        writeln!(f, "{rule}")?;
        writeln!(f, "{:>22}  {:>25}  {:>12}", "Layer (type)", "Output Shape", "Param #")?;
        writeln!(f, "{}", "=".repeat(64))?;
        for layer in &self.layers {
            writeln!(
                f,
                "{:>22}  {:>25}  {:>12}",
                layer.name,
                shape_label(&layer.output_shape),
                layer.params
            )?;
        }
        writeln!(f, "{}", "=".repeat(64))?;
        writeln!(f, "Input size: {:?}", self.input_size)?;
        writeln!(f, "Total params: {}", self.total_params)?;
        write!(f, "{rule}")
    }
}
