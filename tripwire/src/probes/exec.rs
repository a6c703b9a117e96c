use std::{sync::Arc, thread::JoinHandle};

use anyhow::Result;
use aya::Ebpf;
use log::{debug, info, warn};
use tripwire_common::{EXEC_EVENTS_MAP, EXEC_RECORD_SIZE, ExecVariant, TRACEPOINT_CATEGORY};

use crate::{
    alert::{AlertEvent, AlertSender},
    event::ExecInfo,
    probes::{Probe, TracepointConfig, attach_tracepoint, spawn_ringbuf_handler},
    rules::RuleMatcher,
    settings::ProbeToggles,
    telemetry,
};

/// sys_enter_execve / sys_enter_execveat tracepoints feeding `EXEC_EVENTS`.
pub struct ExecProbe {
    variants: Vec<ExecVariant>,
    handler: ExecHandler,
}

impl ExecProbe {
    pub fn new(toggles: &ProbeToggles, matcher: RuleMatcher, alerts: AlertSender) -> Self {
        let variants = ExecVariant::ALL
            .into_iter()
            .filter(|v| match v {
                ExecVariant::Execve => toggles.execve,
                ExecVariant::Execveat => toggles.execveat,
            })
            .collect();
        Self {
            variants,
            handler: ExecHandler::new(matcher, alerts),
        }
    }

    pub fn variants(&self) -> &[ExecVariant] {
        &self.variants
    }

    /// Starts the reader thread; it exits once shutdown is requested.
    pub fn spawn_reader(&self, bpf: &mut Ebpf) -> Result<JoinHandle<()>> {
        let handler = self.handler.clone();
        spawn_ringbuf_handler(bpf, EXEC_EVENTS_MAP, move |sample| {
            handler.handle(sample);
        })
    }
}

impl Probe for ExecProbe {
    fn attach(&self, bpf: &mut Ebpf) -> Result<usize> {
        let mut attached = 0;
        for variant in &self.variants {
            let config = TracepointConfig {
                program_name: variant.program_name(),
                category: TRACEPOINT_CATEGORY,
                name: variant.tracepoint(),
            };
            if attach_tracepoint(bpf, config)? {
                attached += 1;
            }
        }

        telemetry::record_active_probe("exec", attached as u64);
        info!("ExecProbe attached {} of {} tracepoints", attached, self.variants.len());
        Ok(attached)
    }
}

/// What happened to one ring sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Malformed,
    NoMatch,
    Alerted,
    Dropped,
}

/// Decodes samples, matches rules and forwards alerts.
#[derive(Debug, Clone)]
pub struct ExecHandler {
    matcher: Arc<RuleMatcher>,
    alerts: AlertSender,
}

impl ExecHandler {
    pub fn new(matcher: RuleMatcher, alerts: AlertSender) -> Self {
        Self {
            matcher: Arc::new(matcher),
            alerts,
        }
    }

    pub fn handle(&self, sample: &[u8]) -> Outcome {
        let Some(info) = ExecInfo::decode(sample) else {
            warn!(
                "Unexpected exec record size: got {} want {}",
                sample.len(),
                EXEC_RECORD_SIZE
            );
            telemetry::record_malformed_record(sample.len());
            return Outcome::Malformed;
        };
        telemetry::record_exec_record();

        debug!(
            "EXEC pid={} ppid={} uid={} gid={} comm={} exe={} argv={:?}",
            info.pid, info.ppid, info.uid, info.gid, info.comm, info.filename, info.argv
        );

        let Some(rule) = self.matcher.match_exec(&info) else {
            return Outcome::NoMatch;
        };

        info!(
            "exec alert rule={} pid={} exe={} comm={}",
            rule.name, info.pid, info.filename, info.comm
        );
        telemetry::record_alert(&rule.name, &rule.severity);

        if self.alerts.send(AlertEvent::from_exec(rule, &info)) {
            Outcome::Alerted
        } else {
            Outcome::Dropped
        }
    }
}
