use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::summary::{LayerSummary, Summarize, SummaryError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UNetConfig {
    pub in_channels: usize,
    pub num_classes: usize,
    /// Channels after the first encoder stage; doubled at every level.
    pub base_channels: usize,
    /// Number of 2x downsampling steps.
    pub depth: usize,
}

impl Default for UNetConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            num_classes: 2,
            base_channels: 32,
            depth: 4,
        }
    }
}

impl UNetConfig {
    /// Spatial dims must be divisible by this for skips to line up.
    pub fn spatial_multiple(&self) -> usize {
        1 << self.depth
    }
}

/// Two 3x3 same-padded convolutions, each followed by ReLU.
#[derive(Debug, Module)]
pub struct DoubleConv<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
}

impl<B: Backend> DoubleConv<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        Self { conv1, conv2 }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv1.forward(x));
        relu(self.conv2.forward(x))
    }
}

/// 2x transposed-conv upsample, concat with the skip, then [`DoubleConv`].
#[derive(Debug, Module)]
pub struct UpBlock<B: Backend> {
    up: ConvTranspose2d<B>,
    conv: DoubleConv<B>,
}

impl<B: Backend> UpBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let up = ConvTranspose2dConfig::new([in_channels, out_channels], [2, 2])
            .with_stride([2, 2])
            .init(device);
        let conv = DoubleConv::new(out_channels * 2, out_channels, device);
        Self { up, conv }
    }

    fn upsample(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.up.forward(x)
    }

    fn merge(&self, up: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(Tensor::cat(vec![skip, up], 1))
    }

    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        self.merge(self.upsample(x), skip)
    }
}

#[derive(Debug, Module)]
pub struct UNet<B: Backend> {
    encoders: Vec<DoubleConv<B>>,
    pool: MaxPool2d,
    bottleneck: DoubleConv<B>,
    /// Ordered deepest first.
    decoders: Vec<UpBlock<B>>,
    head: Conv2d<B>,
    in_channels: usize,
    num_classes: usize,
    depth: usize,
}

impl<B: Backend> UNet<B> {
    pub fn new(cfg: &UNetConfig, device: &B::Device) -> Self {
        let depth = cfg.depth.max(1);
        let base = cfg.base_channels.max(1);
        let width = |level: usize| base << level;

        let mut encoders = Vec::with_capacity(depth);
        for level in 0..depth {
            let in_ch = if level == 0 {
                cfg.in_channels
            } else {
                width(level - 1)
            };
            encoders.push(DoubleConv::new(in_ch, width(level), device));
        }
        let bottleneck = DoubleConv::new(width(depth - 1), width(depth), device);
        let decoders = (0..depth)
            .rev()
            .map(|level| UpBlock::new(width(level + 1), width(level), device))
            .collect();
        let head = Conv2dConfig::new([base, cfg.num_classes.max(1)], [1, 1]).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            encoders,
            pool,
            bottleneck,
            decoders,
            head,
            in_channels: cfg.in_channels,
            num_classes: cfg.num_classes.max(1),
            depth,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// `[N, C_in, H, W]` → per-pixel logits `[N, num_classes, H, W]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.run(input, None)
    }

    fn run(&self, input: Tensor<B, 4>, mut trace: Option<&mut Vec<LayerSummary>>) -> Tensor<B, 4> {
        let mut record = |name: &dyn Fn() -> String, out: &Tensor<B, 4>, params: &dyn Fn() -> usize| {
            if let Some(layers) = trace.as_deref_mut() {
                layers.push(LayerSummary {
                    name: name(),
                    output_shape: out.dims().to_vec(),
                    params: params(),
                });
            }
        };

        let mut x = input;
        let mut skips = Vec::with_capacity(self.encoders.len());
        for (i, enc) in self.encoders.iter().enumerate() {
            x = enc.forward(x);
            record(&|| format!("encoder.{i}"), &x, &|| enc.num_params());
            skips.push(x.clone());
            x = self.pool.forward(x);
            record(&|| format!("pool.{i}"), &x, &|| 0);
        }
        x = self.bottleneck.forward(x);
        record(&|| "bottleneck".to_string(), &x, &|| self.bottleneck.num_params());
        for (i, dec) in self.decoders.iter().enumerate() {
            let Some(skip) = skips.pop() else { break };
            let up = dec.upsample(x);
            record(&|| format!("decoder.{i}.up"), &up, &|| dec.up.num_params());
            x = dec.merge(up, skip);
            record(&|| format!("decoder.{i}.conv"), &x, &|| dec.conv.num_params());
        }
        let out = self.head.forward(x);
        record(&|| "head".to_string(), &out, &|| self.head.num_params());
        out
    }
}

impl<B: Backend> Summarize<B> for UNet<B> {
    fn check_input(&self, input_size: [usize; 3]) -> Result<(), SummaryError> {
        let [channels, height, width] = input_size;
        if channels != self.in_channels {
            return Err(SummaryError::ChannelMismatch {
                expected: self.in_channels,
                actual: channels,
            });
        }
        let multiple = 1usize << self.depth;
        if height == 0 || width == 0 || height % multiple != 0 || width % multiple != 0 {
            return Err(SummaryError::SpatialSize {
                height,
                width,
                multiple,
            });
        }
        Ok(())
    }

    fn trace_layers(&self, input: Tensor<B, 4>) -> Vec<LayerSummary> {
        let mut layers = Vec::new();
        self.run(input, Some(&mut layers));
        layers
    }

    fn device(&self) -> B::Device {
        self.head.weight.val().device()
    }

    fn total_params(&self) -> usize {
        self.num_params()
    }
}
