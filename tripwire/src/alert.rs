//! Alert construction and delivery.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};

use crate::{event::ExecInfo, rules::ProcessRule, settings::PROCESS_RULE_TYPE, telemetry};

/// A rule hit, serialized as one JSON object per line by the default sink.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlertEvent {
    pub tripwire_type: String,
    pub rule_name: String,
    pub severity: String,
    pub timestamp: DateTime<Utc>,
    pub detail: Map<String, Value>,
}

impl AlertEvent {
    pub fn from_exec(rule: &ProcessRule, info: &ExecInfo) -> Self {
        Self::from_exec_at(rule, info, Utc::now())
    }

    pub fn from_exec_at(rule: &ProcessRule, info: &ExecInfo, timestamp: DateTime<Utc>) -> Self {
        let mut detail = Map::new();
        detail.insert("pid".into(), info.pid.into());
        detail.insert("ppid".into(), info.ppid.into());
        detail.insert("uid".into(), info.uid.into());
        detail.insert("gid".into(), info.gid.into());
        detail.insert("comm".into(), info.comm.clone().into());
        detail.insert("exe".into(), info.filename.clone().into());
        if !info.argv.is_empty() {
            detail.insert("cmdline".into(), info.argv.clone().into());
        }

        Self {
            tripwire_type: PROCESS_RULE_TYPE.to_string(),
            rule_name: rule.name.clone(),
            severity: rule.severity.clone(),
            timestamp,
            detail,
        }
    }
}

/// Non-blocking producer half of the alert channel.
#[derive(Debug, Clone)]
pub struct AlertSender {
    tx: Sender<AlertEvent>,
}

/// `capacity` must be non-zero.
pub fn channel(capacity: usize) -> (AlertSender, Receiver<AlertEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (AlertSender { tx }, rx)
}

impl AlertSender {
    /// Queues `alert` without waiting. Returns `false` if it was dropped.
    pub fn send(&self, alert: AlertEvent) -> bool {
        match self.tx.try_send(alert) {
            Ok(()) => true,
            Err(TrySendError::Full(alert)) => {
                warn!(
                    "Alert channel full, dropping alert rule={} ts={}",
                    alert.rule_name, alert.timestamp
                );
                telemetry::record_alert_dropped(&alert.rule_name);
                false
            }
            Err(TrySendError::Closed(alert)) => {
                warn!("Alert sink closed, dropping alert rule={}", alert.rule_name);
                false
            }
        }
    }
}

/// Writes every received alert as a JSON line until all senders are gone.
pub async fn write_json_lines<W>(mut rx: Receiver<AlertEvent>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(alert) = rx.recv().await {
        let mut line = serde_json::to_vec(&alert).context("Failed to serialize alert")?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .await
            .context("Failed to write alert")?;
        writer.flush().await.context("Failed to flush alert sink")?;
    }
    Ok(())
}
