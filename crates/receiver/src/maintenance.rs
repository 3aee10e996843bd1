//! Ciclo periódico de retenção e rollups.
//!
//! A cada `interval_secs` (padrão 1h), em ordem:
//! 1. apaga eventos RF com `timestamp < agora − retenção`;
//! 2. apaga logs GPS com o mesmo cutoff;
//! 3. recalcula o rollup das últimas 24h de cada nó com pelo menos um evento
//!    RF na janela e grava todos num único upsert.
//!
//! O cancelamento só interrompe a espera entre ciclos. Um ciclo iniciado vai
//! até o fim, então nunca sobra rollup pela metade.

use crate::store::{EventStore, StoreError, WindowSnapshot};
use chrono::{TimeDelta, Utc};
use mesh_core::config::MaintenanceConfig;
use mesh_core::types::{NodeRollup, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Falha de um ciclo. O loop loga e segue para o próximo.
#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Janela de {span} antes de {now} fora do intervalo de datas")]
    WindowOutOfRange { now: Timestamp, span: TimeDelta },
}

/// O que um ciclo fez.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub rf_deleted: u64,
    pub gps_deleted: u64,
    pub rollups_upserted: usize,
}

pub struct MaintenanceScheduler {
    store: Arc<dyn EventStore>,
    config: MaintenanceConfig,
    /// Limiar de jamming/spoofing para contar um evento GPS no rollup
    interference_threshold: f32,
}

impl MaintenanceScheduler {
    pub fn new(store: Arc<dyn EventStore>, config: MaintenanceConfig, interference_threshold: f32) -> Self {
        Self {
            store,
            config,
            interference_threshold,
        }
    }

    /// Executa um ciclo completo tomando `now` como referência.
    pub async fn run_cycle(&self, now: Timestamp) -> Result<CycleReport, MaintenanceError> {
        let cutoff = window_start(now, self.config.retention())?;
        let since = window_start(now, self.config.rollup_window())?;

        let rf_deleted = self.store.delete_rf_events_before(cutoff).await?;
        let gps_deleted = self.store.delete_gps_logs_before(cutoff).await?;

        let snapshot = self.store.snapshot_since(since).await?;
        let rollups = compute_rollups(&snapshot, now, self.interference_threshold);
        if !rollups.is_empty() {
            self.store.upsert_rollups(&rollups).await?;
        }

        Ok(CycleReport {
            rf_deleted,
            gps_deleted,
            rollups_upserted: rollups.len(),
        })
    }

    /// Loop até `cancel`. Erros de um ciclo são logados e o próximo ciclo
    /// roda normalmente.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.interval_secs,
            retention_days = self.config.retention_days,
            window_hours = self.config.rollup_window_hours,
            "Manutenção iniciada"
        );

        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Manutenção encerrada");
                    break;
                }
                _ = interval.tick() => {}
            }

            match self.run_cycle(Utc::now()).await {
                Ok(report) => {
                    if report.rf_deleted + report.gps_deleted > 0 {
                        info!(
                            rf_deleted = report.rf_deleted,
                            gps_deleted = report.gps_deleted,
                            rollups = report.rollups_upserted,
                            "Manutenção: registros antigos removidos"
                        );
                    } else {
                        debug!(rollups = report.rollups_upserted, "Manutenção: nada a remover");
                    }
                }
                Err(e) => error!("Manutenção: ciclo falhou: {e}"),
            }
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

fn window_start(now: Timestamp, span: TimeDelta) -> Result<Timestamp, MaintenanceError> {
    now.checked_sub_signed(span)
        .ok_or(MaintenanceError::WindowOutOfRange { now, span })
}

/// Rollups a partir de uma leitura única da janela.
///
/// Só nós com eventos RF na janela entram; a contagem de interferência GPS
/// usa os logs do mesmo snapshot.
pub fn compute_rollups(snapshot: &WindowSnapshot, now: Timestamp, interference_threshold: f32) -> Vec<NodeRollup> {
    let mut rf: BTreeMap<&str, (u32, f64)> = BTreeMap::new();
    for event in &snapshot.rf_events {
        let entry = rf.entry(event.node_id.as_str()).or_default();
        entry.0 += 1;
        entry.1 += f64::from(event.anomaly_score);
    }

    let mut jams: BTreeMap<&str, u32> = BTreeMap::new();
    for sample in snapshot
        .gps_logs
        .iter()
        .filter(|s| s.is_interference(interference_threshold))
    {
        *jams.entry(sample.node_id.as_str()).or_default() += 1;
    }

    rf.into_iter()
        .map(|(node_id, (count, sum))| NodeRollup {
            node_id: node_id.to_string(),
            rf_events_24h: count,
            avg_anomaly_24h: (sum / f64::from(count)) as f32,
            gps_jam_events_24h: jams.get(node_id).copied().unwrap_or(0),
            last_updated: now,
        })
        .collect()
}
