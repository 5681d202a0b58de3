//! Consumer: follows the producer's frames and prints a summary of each
//!
//! ```bash
//! cargo run --example shm_consumer -- [config.toml]
//! ```

use common::config::ConfigLoader;
use shmio::{PullOutcome, ShmConfig, ShmError, ShmResult, SharedMemory, init_tracing};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const SEGMENT: &str = "camera";

fn main() -> ShmResult<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ShmConfig::load(Path::new(&path))?,
        None => ShmConfig::default(),
    };
    config.validate()?;
    init_tracing(config.shared.log_level);

    let mut camera = SharedMemory::open_with_config(SEGMENT, &config)?;
    info!(
        "attached to '{}': {} {:?}, created {:?}",
        camera.name(),
        camera.data_type(),
        camera.shape(),
        camera.creation_time()
    );

    let mut skipped = 0;
    loop {
        match camera.pull_data_from_storage(Some(Duration::from_secs(2))) {
            Ok(PullOutcome::Updated { version }) => {
                let image = camera.ndarray::<u16>()?;
                let sum: u64 = image.iter().map(|&p| u64::from(p)).sum();
                let mean = sum as f64 / image.len() as f64;
                let frame = camera.keywords().get_long("FRAMENUM")?;
                let rate = camera.keywords().get_double("FRMRATE")?;
                if frame as u64 + 1 != version {
                    skipped += 1;
                }
                println!("version {version:>6}  frame {frame:>6}  mean {mean:>8.2}  {rate:>5.1} fps");
            }
            Ok(PullOutcome::NoNewFrame) => std::thread::sleep(Duration::from_millis(5)),
            Err(ShmError::Timeout { waited, .. }) => {
                warn!("no frame for {:?}, producer gone?", waited);
                break;
            }
            Err(e) => return Err(e),
        }
    }

    info!("done, {} versions observed out of order", skipped);
    Ok(())
}
