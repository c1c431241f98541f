//! Motioncam daemon
//!
//! Usage:
//!   motioncam [--config <path>] [--check] [--verbose]
//!
//! Options:
//!   --config <path>   TOML config, or a legacy cameras.json array
//!   --check           Validate the config, print the cameras and exit
//!   --verbose         Debug logging (overridden by RUST_LOG)

use std::path::PathBuf;

use motioncam_lib::RunOptions;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let verbose = args.iter().any(|a| a == "--verbose");
    let check_only = args.iter().any(|a| a == "--check");
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let log_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let options = RunOptions {
        config_path,
        check_only,
    };

    if let Err(e) = motioncam_lib::run(options) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
