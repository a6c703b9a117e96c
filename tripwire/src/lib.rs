pub mod alert;
pub mod btf;
pub mod event;
pub mod kernel;
pub mod probes;
pub mod rules;
pub mod settings;
pub mod telemetry;

use std::path::Path;

use anyhow::{Context, Result, bail};
use aya::{Ebpf, EbpfLoader};
use aya_log::EbpfLogger;
use log::{info, warn};
use tokio::signal;
use tripwire_common::{TASK_OFFSETS_GLOBAL, TaskOffsets};

use crate::{
    probes::{Probe, exec::ExecProbe},
    rules::RuleMatcher,
    settings::Settings,
};

pub struct TripwireEngine {
    pub settings: Settings,
    bpf: Ebpf,
}

impl TripwireEngine {
    pub fn new(settings: Settings, bytecode: &[u8]) -> Result<Self> {
        if bytecode.is_empty() {
            bail!(
                "no eBPF object embedded in this binary; rebuild with the nightly \
                 toolchain and bpf-linker available"
            );
        }

        let kernel = kernel::ensure_supported()?;
        info!("Running on kernel {:?}", kernel);

        let offsets = resolve_task_offsets();

        bump_memlock_rlimit()?;
        let mut bpf = EbpfLoader::new()
            .set_global(TASK_OFFSETS_GLOBAL, &offsets, true)
            .load(bytecode)
            .context("Failed to load eBPF object")?;
        if let Err(e) = EbpfLogger::init(&mut bpf) {
            warn!("Failed to initialize eBPF logger: {}", e);
        }
        Ok(Self { settings, bpf })
    }

    pub async fn run(mut self) -> Result<()> {
        let matcher = RuleMatcher::new(self.settings.process_rules())?;
        if matcher.is_empty() {
            warn!("No PROCESS rules configured; exec records will not raise alerts");
        } else {
            info!("Loaded {} PROCESS rules", matcher.len());
        }

        let (alerts, alert_rx) = alert::channel(self.settings.alert_channel_capacity);
        let sink = tokio::spawn(alert::write_json_lines(alert_rx, tokio::io::stdout()));

        let probe = ExecProbe::new(&self.settings.probes, matcher, alerts);
        let attached = probe.attach(&mut self.bpf)?;
        if attached == 0 {
            bail!("No exec tracepoint could be attached (check probes.execve / probes.execveat)");
        }
        let reader = probe.spawn_reader(&mut self.bpf)?;
        // the reader thread owns the remaining sender
        drop(probe);

        info!("Monitoring active. Press Ctrl-C to exit.");
        signal::ctrl_c().await?;
        info!("Exiting...");

        probes::request_shutdown();
        if tokio::task::spawn_blocking(move || reader.join()).await?.is_err() {
            warn!("Ring buffer reader thread panicked");
        }
        match sink.await? {
            Ok(()) => {}
            Err(e) => warn!("Alert sink stopped with error: {:#}", e),
        }
        telemetry::shutdown_metrics();

        Ok(())
    }
}

/// Offsets for the probe's parent read. Records carry `ppid` 0 when the
/// running kernel's BTF cannot be read.
fn resolve_task_offsets() -> TaskOffsets {
    match btf::load_task_offsets(Path::new(btf::VMLINUX_BTF)) {
        Ok(offsets) => {
            info!(
                "task_struct offsets: real_parent={:#x} tgid={:#x}",
                offsets.real_parent, offsets.tgid
            );
            offsets
        }
        Err(e) => {
            warn!("Failed to resolve task_struct offsets, ppid will be 0: {:#}", e);
            TaskOffsets::UNRESOLVED
        }
    }
}

fn bump_memlock_rlimit() -> Result<()> {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        warn!("Failed to increase rlimit");
    }
    Ok(())
}
