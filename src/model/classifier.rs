//! Skin condition classifier: EfficientNet backbone plus a small MLP head.
//!
//! Head layout, applied to the pooled backbone features:
//! `Dropout(0.4) -> Linear(F, 512) -> ReLU -> BatchNorm(512) -> Dropout(0.2) -> Linear(512, N)`
//!
//! On an inference backend (no `Autodiff`) both dropout layers are identities
//! and batch norm normalizes with its running statistics.

use burn::{
    config::Config,
    module::Module,
    nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use super::efficientnet::{EfficientNet, EfficientNetConfig};

/// Configuration for the SkinClassifier model
#[derive(Config, Debug)]
pub struct SkinClassifierConfig {
    /// Number of output classes, taken from the label codec
    pub num_classes: usize,

    /// Dropout before the hidden layer
    #[config(default = "0.4")]
    pub dropout_rate: f64,

    /// Dropout before the output layer
    #[config(default = "0.2")]
    pub head_dropout_rate: f64,

    /// Width of the hidden layer
    #[config(default = "512")]
    pub hidden_units: usize,

    /// Backbone channel multiplier
    #[config(default = "1.0")]
    pub width_multiplier: f64,

    /// Backbone depth multiplier
    #[config(default = "1.0")]
    pub depth_multiplier: f64,
}

impl SkinClassifierConfig {
    pub fn backbone(&self) -> EfficientNetConfig {
        EfficientNetConfig::new()
            .with_width_multiplier(self.width_multiplier)
            .with_depth_multiplier(self.depth_multiplier)
    }

    /// Build a model with freshly initialized weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> SkinClassifier<B> {
        SkinClassifier::new(self, device)
    }
}

/// MLP head mapping backbone features to class logits
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub dropout1: Dropout,
    pub fc1: Linear<B>,
    pub relu: Relu,
    pub bn: BatchNorm<B, 1>,
    pub dropout2: Dropout,
    pub fc2: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    fn new(config: &SkinClassifierConfig, in_features: usize, device: &B::Device) -> Self {
        Self {
            dropout1: DropoutConfig::new(config.dropout_rate).init(),
            fc1: LinearConfig::new(in_features, config.hidden_units).init(device),
            relu: Relu::new(),
            bn: BatchNormConfig::new(config.hidden_units).init(device),
            dropout2: DropoutConfig::new(config.head_dropout_rate).init(),
            fc2: LinearConfig::new(config.hidden_units, config.num_classes).init(device),
        }
    }

    /// `[batch, F]` -> `[batch, N]`
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout1.forward(x);
        let x = self.fc1.forward(x);
        let x = self.relu.forward(x);

        // BatchNorm wants a channel axis followed by at least one spatial axis
        let [batch_size, hidden] = x.dims();
        let x = self.bn.forward(x.reshape([batch_size, hidden, 1]));
        let x = x.reshape([batch_size, hidden]);

        let x = self.dropout2.forward(x);
        self.fc2.forward(x)
    }
}

/// Skin condition classifier
#[derive(Module, Debug)]
pub struct SkinClassifier<B: Backend> {
    pub backbone: EfficientNet<B>,
    pub head: ClassifierHead<B>,

    num_classes: usize,
}

impl<B: Backend> SkinClassifier<B> {
    pub fn new(config: &SkinClassifierConfig, device: &B::Device) -> Self {
        let backbone = config.backbone().init(device);
        let head = ClassifierHead::new(config, backbone.feature_dim(), device);

        Self {
            backbone,
            head,
            num_classes: config.num_classes,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Normalized images of shape [batch_size, 3, 224, 224]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(x);
        self.head.forward(features)
    }

    /// Forward pass with softmax over the class axis
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    /// Number of classes the model was configured with
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Number of logits the output layer actually produces
    pub fn output_dim(&self) -> usize {
        self.head.fc2.weight.val().dims()[1]
    }
}
