//! Locate a BitBox02 and print how to reach it

use bitbox02_api::{BridgeConfig, DevicePath};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let force_bridge = std::env::args().any(|arg| arg == "--bridge");
    println!("Looking for a BitBox02...");

    match bitbox02_api::get_device_path(force_bridge, &BridgeConfig::default()).await? {
        DevicePath::Hid => println!("Found a BitBox02 on USB"),
        DevicePath::Bridge(path) => println!("Found a BitBox02 via BitBoxBridge: {path}"),
    }
    Ok(())
}
