//! Running kernel release checks.

use anyhow::{Result, anyhow, bail};
use std::sync::LazyLock;

use aya::util::KernelVersion;

/// BPF ring buffers (`BPF_MAP_TYPE_RINGBUF`) landed in 5.8.
pub static MIN_KERNEL: LazyLock<KernelVersion> = LazyLock::new(|| KernelVersion::new(5, 8, 0));

/// Fails unless `version` can run the exec probe.
pub fn check_supported(version: KernelVersion) -> Result<()> {
    if version < *MIN_KERNEL {
        bail!(
            "kernel {:?} is not supported: exec tracing needs BPF ring buffers (>= {:?})",
            version,
            *MIN_KERNEL
        );
    }
    Ok(())
}

pub fn ensure_supported() -> Result<KernelVersion> {
    let version = KernelVersion::current()
        .map_err(|e| anyhow!("Failed to determine kernel version: {}", e))?;
    check_supported(version)?;
    Ok(version)
}
