use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use anyhow::{Context, Result};
use aya::{Ebpf, maps::RingBuf, programs::TracePoint};
use log::{info, warn};

pub mod exec;

static SHUTDOWN: once_cell::sync::Lazy<Arc<AtomicBool>> =
    once_cell::sync::Lazy::new(|| Arc::new(AtomicBool::new(false)));

pub fn shutdown_flag() -> Arc<AtomicBool> {
    SHUTDOWN.clone()
}

pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

pub trait Probe {
    /// Attaches the probe's programs; returns how many were attached.
    fn attach(&self, bpf: &mut Ebpf) -> Result<usize>;
}

pub struct TracepointConfig<'a> {
    pub program_name: &'a str,
    pub category: &'a str,
    pub name: &'a str,
}

pub const POLL_INTERVAL_MS: u64 = 10;

fn tracepoint_exists(category: &str, name: &str) -> bool {
    const TRACEFS_MOUNT_POINTS: [&str; 2] = ["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

    TRACEFS_MOUNT_POINTS.iter().any(|base| {
        Path::new(base)
            .join("events")
            .join(category)
            .join(name)
            .exists()
    })
}

/// Loads and attaches one tracepoint program. Returns `Ok(false)` when the
/// running kernel does not expose the tracepoint.
pub fn attach_tracepoint(bpf: &mut Ebpf, config: TracepointConfig) -> Result<bool> {
    if !tracepoint_exists(config.category, config.name) {
        warn!(
            "Tracepoint {}:{} not available; skipping {}",
            config.category, config.name, config.program_name
        );
        return Ok(false);
    }

    info!("Loading program {}", config.program_name);
    let program: &mut TracePoint = bpf
        .program_mut(config.program_name)
        .with_context(|| format!("Failed to find {} program", config.program_name))?
        .try_into()?;
    program.load()?;
    program
        .attach(config.category, config.name)
        .with_context(|| format!("Failed to attach {}", config.name))?;
    info!("Attached tracepoint: {}/{}", config.category, config.name);
    Ok(true)
}

/// Drains `map_name` on a blocking thread until shutdown is requested,
/// handing each raw sample to `handler`.
pub fn spawn_ringbuf_handler<F>(bpf: &mut Ebpf, map_name: &str, mut handler: F) -> Result<JoinHandle<()>>
where
    F: FnMut(&[u8]) + Send + 'static,
{
    let mut ring_buf = RingBuf::try_from(
        bpf.take_map(map_name)
            .with_context(|| format!("Failed to find {} map", map_name))?,
    )?;
    let shutdown = shutdown_flag();

    let handle = std::thread::Builder::new()
        .name(format!("ringbuf-{}", map_name.to_lowercase()))
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                let mut has_work = false;
                while let Some(item) = ring_buf.next() {
                    has_work = true;
                    handler(&*item);
                }
                if !has_work {
                    std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
                }
            }
        })
        .context("Failed to spawn ring buffer reader thread")?;
    Ok(handle)
}
