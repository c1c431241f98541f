// Motioncam - motion-triggered camera recorder
// Main library entry point

pub mod config;
pub mod ffmpeg;
pub mod motion;
pub mod recording;
pub mod shutdown;
pub mod supervisor;

#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

use std::path::PathBuf;

use crate::config::Config;
use crate::shutdown::ShutdownToken;
use crate::supervisor::Supervisor;

/// Options parsed from the command line by the `motioncam` binary
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Config file; falls back to the per-user default location
    pub config_path: Option<PathBuf>,
    /// Validate the config, print the camera table and exit
    pub check_only: bool,
}

/// Load the configuration, install the signal handler and run every camera
/// until the streams end or a shutdown is requested.
pub fn run(options: RunOptions) -> anyhow::Result<()> {
    let config_path = options
        .config_path
        .unwrap_or_else(config::default_config_path);

    // Configuration errors are fatal before any worker is launched
    let config = Config::load(&config_path)?;
    log::info!(
        "Loaded {} camera(s) from {}",
        config.cameras.len(),
        config_path.display()
    );

    if options.check_only {
        config::print_camera_table(&config);
        return Ok(());
    }

    let shutdown = ShutdownToken::new();
    shutdown.install_signal_handler()?;

    let summary = Supervisor::new(&config, shutdown).run();
    summary.print();

    if summary.all_clean() {
        println!("All cameras exited cleanly");
    } else {
        log::warn!("{} camera worker(s) did not exit cleanly", summary.unclean_count());
    }

    Ok(())
}
