use std::path::PathBuf;

use burn::backend::wgpu::WgpuDevice;
use burn::backend::Wgpu;
use burn::module::Module;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use audioclassify::checkpoint::load_checkpoint;
use audioclassify::config::esc50::esc50_config;
use audioclassify::config::RunPaths;
use audioclassify::feature::FeatureTransform;
use audioclassify::task::predict::classify_clip;

type B = Wgpu;

/// Top-k ESC-50 classes for a single clip.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// WAV file to classify
    clip: PathBuf,

    /// Defaults to the training run's best model
    #[arg(short, long)]
    checkpoint: Option<PathBuf>,

    #[arg(short = 'k', long, default_value_t = 3)]
    top: usize,
}

fn main() -> color_eyre::Result<()> {
    let args = Args::parse();

    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let checkpoint = args.checkpoint.unwrap_or_else(|| RunPaths::default().checkpoint());

    let device = WgpuDevice::default();
    let record = load_checkpoint::<B>(&checkpoint, &device)?;
    tracing::info!(epoch = record.epoch, accuracy = record.accuracy, "loaded checkpoint");

    let config = esc50_config(record.classes.len());
    let model = config.model.init::<B>(&device).load_record(record.model);
    let transform = FeatureTransform::validation(&config.mel);

    let predictions = classify_clip(&model, &transform, &args.clip, &record.classes, args.top, &device)?;
    for prediction in &predictions {
        tracing::info!("{:<24} {:.2}%", prediction.class, 100.0 * prediction.confidence);
    }
    println!("{}", serde_json::to_string_pretty(&predictions)?);

    Ok(())
}

#[test]
fn test_args() {
    let args = Args::try_parse_from(["classify", "dog.wav"]).unwrap();
    assert_eq!(args.clip, PathBuf::from("dog.wav"));
    assert_eq!(args.checkpoint, None);
    assert_eq!(args.top, 3);

    let args = Args::try_parse_from(["classify", "rain.wav", "--checkpoint", "best.mpk", "-k", "5"]).unwrap();
    assert_eq!(args.checkpoint, Some(PathBuf::from("best.mpk")));
    assert_eq!(args.top, 5);

    assert!(Args::try_parse_from(["classify"]).is_err());
}
