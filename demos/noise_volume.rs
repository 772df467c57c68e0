//! Headless demo: a producer thread streams noise volumes into the
//! renderer while the main thread drives frames and watches the adaptive
//! LOD sequence refine.
//!
//! Run with `RUST_LOG=info cargo run --example noise_volume`.

use lumen_engine::{
    CaptureListener, ElementType, HeadlessBackend, RendererConfig, VolumeBuffer, VolumeDims,
    VolumeRenderer, VolumeSnapshot, VoxelSize,
};
use noise::{NoiseFn, Perlin};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

const SIDE: u32 = 64;
const TIMESTEPS: u32 = 20;

struct PrintCapture;

impl CaptureListener for PrintCapture {
    fn volume_captured(&self, layer: usize, snapshot: &VolumeSnapshot) {
        log::info!(
            "captured layer {}: {} {} ({} bytes)",
            layer,
            snapshot.element,
            snapshot.dims,
            snapshot.bytes.len()
        );
    }
}

fn fill_noise_volume(volume: &mut VolumeBuffer, perlin: &Perlin, t: f64) {
    let dims = volume.dims();
    let voxels = volume.as_slice_mut::<u8>();
    let scale = 4.0 / SIDE as f64;
    for z in 0..dims.depth {
        for y in 0..dims.height {
            for x in 0..dims.width {
                let value = perlin.get([x as f64 * scale, y as f64 * scale, z as f64 * scale + t]);
                let index = ((z * dims.height + y) * dims.width + x) as usize;
                voxels[index] = ((value * 0.5 + 0.5) * 255.0) as u8;
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = RendererConfig {
        render_layers: 1,
        element_type: ElementType::U8,
        ..RendererConfig::default()
    };
    let timeout = config.submit_timeout();
    let renderer = Arc::new(VolumeRenderer::new(
        &config,
        HeadlessBackend::with_default_limits(1),
    )?);
    renderer.add_capture_listener(Box::new(PrintCapture));

    let pool = Arc::new(renderer.create_compatible_pool(config.pool_capacity));
    let dims = VolumeDims::new(SIDE, SIDE, SIDE);

    let producer = {
        let renderer = Arc::clone(&renderer);
        let pool = Arc::clone(&pool);
        std::thread::spawn(move || {
            let seed = rand::thread_rng().gen();
            let perlin = Perlin::new(seed);
            for step in 0..TIMESTEPS {
                let mut volume = pool.acquire(Duration::ZERO, ElementType::U8, dims);
                fill_noise_volume(&mut volume, &perlin, step as f64 * 0.1);
                match renderer.submit_volume(0, volume, VoxelSize::default(), timeout) {
                    Ok(true) => log::info!("producer: timestep {} consumed", step),
                    Ok(false) => log::warn!("producer: timestep {} timed out", step),
                    Err(e) => {
                        log::error!("producer: submission failed: {}", e);
                        break;
                    }
                }
            }
            log::info!("producer: done");
        })
    };

    let mut frames = 0u32;
    let mut kernel_frames = 0u32;
    while frames < 600 {
        let report = renderer.render_frame()?;
        if report.kernel_ran {
            kernel_frames += 1;
            log::debug!(
                "frame {}: pass {}/{} phase {:.3}",
                frames,
                renderer.lod().pass_index(),
                renderer.lod().number_of_passes(),
                renderer.lod().phase()
            );
        }
        if frames == 300 {
            renderer.set_brightness(0, 2.0)?;
            renderer.request_capture();
        }
        frames += 1;
        std::thread::sleep(Duration::from_millis(5));
    }

    producer.join().expect("producer thread");
    log::info!(
        "rendered {} frames, {} with kernel work, final pass count {}",
        frames,
        kernel_frames,
        renderer.lod().number_of_passes()
    );
    renderer.close();
    Ok(())
}
