use anyhow::Result;
use burn::backend::wgpu::WgpuDevice;
use burn::backend::{Autodiff, Wgpu};
use clap::Parser;
use gnn_driver::config::Configuration;
use gnn_driver::experiment::run;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Configuration::parse_args(std::env::args_os());

    type MyBacked = Wgpu<f32, i32>;
    type MyAutodiffBackend = Autodiff<MyBacked>;

    let device = WgpuDevice::default();
    run::<MyAutodiffBackend>(&config, device)?;
    Ok(())
}
