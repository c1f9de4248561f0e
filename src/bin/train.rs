use burn::backend::wgpu::WgpuDevice;
use burn::backend::{Autodiff, Wgpu};
use tracing_subscriber::EnvFilter;

use audioclassify::config::esc50::esc50_config;
use audioclassify::config::RunPaths;

type B = Autodiff<Wgpu>;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let summary = audioclassify::task::classify::run::<B>(WgpuDevice::default(), &RunPaths::default(), esc50_config)?;
    tracing::info!(?summary, "done");

    Ok(())
}
