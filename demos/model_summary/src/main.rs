use burn::backend::NdArray;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::Tensor;
use clap::Parser;
use convnets::cache::weights::PretrainedWeights;
use convnets::factory::{ClassifierConfig, ClassifierModel};
use convnets::utility::record::record_summary;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Network type: simple, resnet, resnet50imagenet, inceptionv3.
    #[arg(long, default_value = "resnet")]
    net_type: String,

    /// Input shape, ``channels,height,width``.
    #[arg(long, num_args = 3, value_delimiter = ',', default_value = "3,32,32")]
    input_shape: Vec<usize>,

    #[arg(long, default_value = "10")]
    num_classes: usize,

    /// Wide resnet depth; ``6n + 4``.
    #[arg(long, default_value = "28")]
    depth: usize,

    #[arg(long, default_value = "5e-4")]
    weight_decay: f64,

    /// Wide resnet widen factor.
    #[arg(long, default_value = "1")]
    widen: usize,

    /// Local torch checkpoint for the transfer backbones.
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Skip pretrained weights for the transfer backbones.
    #[arg(long, default_value = "false")]
    no_pretrained: bool,

    /// Load the classifier config from JSON; overrides the model flags.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the effective classifier config as JSON.
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Batch size of the probe forward pass.
    #[arg(long, default_value = "2")]
    batch_size: usize,

    /// Print the record summary.
    #[arg(long, default_value = "false")]
    record: bool,

    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Args {
    fn classifier_config(&self) -> anyhow::Result<ClassifierConfig> {
        if let Some(path) = &self.config {
            return Ok(ClassifierConfig::load(path)?);
        }

        let input_shape: [usize; 3] = match self.input_shape.as_slice().try_into() {
            Ok(shape) => shape,
            Err(_) => anyhow::bail!("--input-shape needs 3 values: {:?}", self.input_shape),
        };

        let weights = match (&self.weights, self.no_pretrained) {
            (_, true) => PretrainedWeights::None,
            (Some(path), false) => PretrainedWeights::File(path.clone()),
            (None, false) => PretrainedWeights::ImageNet,
        };

        Ok(
            ClassifierConfig::new(self.net_type.parse()?, input_shape, self.num_classes)
                .with_depth(self.depth)
                .with_weight_decay(self.weight_decay)
                .with_widen(self.widen)
                .with_weights(weights),
        )
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    type B = NdArray<f32>;
    let device = Default::default();

    let config = args.classifier_config()?;
    if let Some(path) = &args.save_config {
        config.save(path)?;
        tracing::info!(path = %path.display(), "saved config");
    }

    let built = config.try_init::<B>(&device)?;
    let decay = built.weight_decay_config();
    let model: ClassifierModel<B> = built.into_model();

    let [channels, height, width] = config.input_shape;
    let input = Tensor::zeros([args.batch_size, channels, height, width], &device);
    let output = model.forward_softmax(input);

    println!("net_type:      {}", model.net_type());
    println!("parameters:    {}", model.num_params());
    println!("output shape:  {:?}", output.dims());
    match decay {
        Some(decay) => println!("l2 penalty:    {}", decay.penalty),
        None => println!("l2 penalty:    none"),
    }

    if args.record {
        println!("{}", record_summary::<B, _>(model.into_record())?);
    }

    Ok(())
}
