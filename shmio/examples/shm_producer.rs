//! Camera-like producer: publishes a moving gradient at a fixed frame rate
//!
//! ```bash
//! cargo run --example shm_producer -- [config.toml] [frames]
//! ```

use common::config::ConfigLoader;
use shmio::{DataType, Keyword, ShmConfig, ShmResult, SharedMemory, init_tracing};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

const SEGMENT: &str = "camera";
const WIDTH: usize = 320;
const HEIGHT: usize = 256;
const FRAME_RATE: f64 = 30.0;

fn main() -> ShmResult<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => ShmConfig::load(Path::new(&path))?,
        None => ShmConfig::default(),
    };
    config.validate()?;
    let frames: u64 = args.next().and_then(|n| n.parse().ok()).unwrap_or(300);
    init_tracing(config.shared.log_level);

    let keywords = [
        Keyword::long("WIDTH", WIDTH as i64, "Frame width (px)")?,
        Keyword::long("HEIGHT", HEIGHT as i64, "Frame height (px)")?,
        Keyword::double("FRMRATE", 0.0, "Measured frame rate (fps)")?,
        Keyword::long("FRAMENUM", 0, "Index of the published frame")?,
        Keyword::string("SERVICE", &config.shared.service_name, "Producing service")?,
    ];
    let mut camera =
        SharedMemory::create_with_config(SEGMENT, WIDTH * HEIGHT, DataType::Uint16, &keywords, &config)?;

    let period = Duration::from_secs_f64(1.0 / FRAME_RATE);
    let start = Instant::now();
    for frame in 0..frames {
        {
            let mut image = camera.ndarray_mut::<u16>()?;
            for (i, pixel) in image.iter_mut().enumerate() {
                let (row, col) = (i / WIDTH, i % WIDTH);
                *pixel = ((row + col + frame as usize) % 4096) as u16;
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { frame as f64 / elapsed } else { 0.0 };
        camera.keywords().set_value("FRAMENUM", frame as i64)?;
        camera.keywords().set_value("FRMRATE", rate)?;
        let version = camera.push_data_to_storage();

        if frame % 30 == 0 {
            info!("published frame {} as version {} ({:.1} fps)", frame, version, rate);
        }
        std::thread::sleep(period);
    }

    drop(camera);
    SharedMemory::unlink_in(&config.namespace, SEGMENT)?;
    Ok(())
}
