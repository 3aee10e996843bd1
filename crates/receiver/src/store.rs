//! Armazenamento persistente de eventos, alertas e rollups.
//!
//! O backend só conhece o trait [`EventStore`]: inserts append-only,
//! consultas por janela de tempo com paginação, deleção por cutoff e upsert
//! de rollups por nó. [`MemoryStore`] é a implementação em memória usada pelo
//! binário e pelos testes.

use async_trait::async_trait;
use mesh_core::types::{Alert, GpsSample, NewAlert, NodeInfo, NodeRollup, RfEventRecord, Timestamp};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

/// Limite padrão de itens por página.
pub const DEFAULT_PAGE_LIMIT: usize = 50;
/// Limite máximo aceito numa consulta paginada.
pub const MAX_PAGE_LIMIT: usize = 500;
/// Quantidade padrão de alertas recentes.
pub const DEFAULT_ALERT_LIMIT: usize = 100;

/// Erros do armazenamento.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Armazenamento indisponível: {0}")]
    Unavailable(String),

    #[error("Registro duplicado: {0}")]
    Conflict(String),
}

/// Janela `[since, until)`. Limites ausentes não restringem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(since: Timestamp) -> Self {
        Self {
            since: Some(since),
            until: None,
        }
    }

    pub fn contains(&self, ts: &Timestamp) -> bool {
        self.since.is_none_or(|s| *ts >= s) && self.until.is_none_or(|u| *ts < u)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
}

impl Pagination {
    /// Paginação vinda de fora: `limit` é limitado a `1..=500`.
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
            offset,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT, 0)
    }
}

/// Página de resultados, mais recentes primeiro.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total de registros na janela, independente da paginação
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Leitura única e consistente de uma janela, usada pelos rollups.
#[derive(Debug, Clone, Default)]
pub struct WindowSnapshot {
    pub rf_events: Vec<RfEventRecord>,
    pub gps_logs: Vec<GpsSample>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_rf_event(&self, event: &RfEventRecord) -> Result<(), StoreError>;

    async fn insert_gps_log(&self, sample: &GpsSample) -> Result<(), StoreError>;

    /// Persiste o alerta e devolve a versão com id atribuído.
    async fn insert_alert(&self, alert: NewAlert) -> Result<Alert, StoreError>;

    /// Falha com [`StoreError::Conflict`] se o `node_id` já existe.
    async fn insert_node(&self, node: &NodeInfo) -> Result<(), StoreError>;

    async fn rf_events(
        &self,
        window: TimeWindow,
        page: Pagination,
    ) -> Result<Page<RfEventRecord>, StoreError>;

    async fn gps_logs(&self, window: TimeWindow, page: Pagination) -> Result<Page<GpsSample>, StoreError>;

    /// Alertas mais recentes primeiro (por id).
    async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError>;

    /// Todos os eventos RF e logs GPS com `timestamp >= since`, lidos de uma vez.
    async fn snapshot_since(&self, since: Timestamp) -> Result<WindowSnapshot, StoreError>;

    /// Remove eventos RF com `timestamp < cutoff`. Retorna quantos saíram.
    async fn delete_rf_events_before(&self, cutoff: Timestamp) -> Result<u64, StoreError>;

    /// Remove logs GPS com `timestamp < cutoff`. Retorna quantos saíram.
    async fn delete_gps_logs_before(&self, cutoff: Timestamp) -> Result<u64, StoreError>;

    /// Substitui por inteiro o rollup de cada nó informado.
    async fn upsert_rollups(&self, rollups: &[NodeRollup]) -> Result<(), StoreError>;

    async fn rollups(&self) -> Result<Vec<NodeRollup>, StoreError>;

    async fn nodes(&self) -> Result<Vec<NodeInfo>, StoreError>;

    /// Metadados de um nó cadastrado, se existir.
    async fn node(&self, node_id: &str) -> Result<Option<NodeInfo>, StoreError>;
}

// ──────────────────────────────────────────────
// Implementação em memória
// ──────────────────────────────────────────────

#[derive(Debug, Default)]
struct Tables {
    rf_events: Vec<RfEventRecord>,
    gps_logs: Vec<GpsSample>,
    alerts: Vec<Alert>,
    next_alert_id: u64,
    rollups: BTreeMap<String, NodeRollup>,
    nodes: BTreeMap<String, NodeInfo>,
}

/// Armazenamento em memória. Cada operação é atômica sob um único lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contagem bruta (eventos RF, logs GPS, alertas).
    pub fn counts(&self) -> (usize, usize, usize) {
        let t = self.tables.read();
        (t.rf_events.len(), t.gps_logs.len(), t.alerts.len())
    }
}

fn paginate<T: Clone>(
    rows: &[T],
    window: TimeWindow,
    page: Pagination,
    timestamp: impl Fn(&T) -> Timestamp,
) -> Page<T> {
    let mut matching: Vec<&T> = rows.iter().filter(|r| window.contains(&timestamp(r))).collect();
    // Mais recente primeiro; empate mantém o último inserido na frente.
    matching.reverse();
    matching.sort_by_key(|r| std::cmp::Reverse(timestamp(r)));

    Page {
        total: matching.len(),
        items: matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect(),
        limit: page.limit,
        offset: page.offset,
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_rf_event(&self, event: &RfEventRecord) -> Result<(), StoreError> {
        self.tables.write().rf_events.push(event.clone());
        Ok(())
    }

    async fn insert_gps_log(&self, sample: &GpsSample) -> Result<(), StoreError> {
        self.tables.write().gps_logs.push(sample.clone());
        Ok(())
    }

    async fn insert_alert(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        let mut t = self.tables.write();
        t.next_alert_id += 1;
        let stored = alert.with_id(t.next_alert_id);
        t.alerts.push(stored.clone());
        Ok(stored)
    }

    async fn insert_node(&self, node: &NodeInfo) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        if t.nodes.contains_key(&node.node_id) {
            return Err(StoreError::Conflict(node.node_id.clone()));
        }
        t.nodes.insert(node.node_id.clone(), node.clone());
        Ok(())
    }

    async fn rf_events(
        &self,
        window: TimeWindow,
        page: Pagination,
    ) -> Result<Page<RfEventRecord>, StoreError> {
        let t = self.tables.read();
        Ok(paginate(&t.rf_events, window, page, |e| e.timestamp))
    }

    async fn gps_logs(&self, window: TimeWindow, page: Pagination) -> Result<Page<GpsSample>, StoreError> {
        let t = self.tables.read();
        Ok(paginate(&t.gps_logs, window, page, |s| s.timestamp))
    }

    async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let t = self.tables.read();
        Ok(t.alerts.iter().rev().take(limit).cloned().collect())
    }

    async fn snapshot_since(&self, since: Timestamp) -> Result<WindowSnapshot, StoreError> {
        let t = self.tables.read();
        Ok(WindowSnapshot {
            rf_events: t.rf_events.iter().filter(|e| e.timestamp >= since).cloned().collect(),
            gps_logs: t.gps_logs.iter().filter(|s| s.timestamp >= since).cloned().collect(),
        })
    }

    async fn delete_rf_events_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut t = self.tables.write();
        let before = t.rf_events.len();
        t.rf_events.retain(|e| e.timestamp >= cutoff);
        Ok((before - t.rf_events.len()) as u64)
    }

    async fn delete_gps_logs_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut t = self.tables.write();
        let before = t.gps_logs.len();
        t.gps_logs.retain(|s| s.timestamp >= cutoff);
        Ok((before - t.gps_logs.len()) as u64)
    }

    async fn upsert_rollups(&self, rollups: &[NodeRollup]) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        for rollup in rollups {
            t.rollups.insert(rollup.node_id.clone(), rollup.clone());
        }
        Ok(())
    }

    async fn rollups(&self) -> Result<Vec<NodeRollup>, StoreError> {
        Ok(self.tables.read().rollups.values().cloned().collect())
    }

    async fn nodes(&self) -> Result<Vec<NodeInfo>, StoreError> {
        Ok(self.tables.read().nodes.values().cloned().collect())
    }

    async fn node(&self, node_id: &str) -> Result<Option<NodeInfo>, StoreError> {
        Ok(self.tables.read().nodes.get(node_id).cloned())
    }
}

// ──────────────────────────────────────────────
// Falhas injetadas (testes)
// ──────────────────────────────────────────────

/// [`MemoryStore`] com falhas programáveis, para exercitar os caminhos de
/// erro da ingestão e da manutenção.
#[cfg(test)]
pub(crate) mod faults {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub(crate) struct FaultyStore {
        pub(crate) inner: MemoryStore,
        /// Inserts de evento RF aceitos antes de começar a falhar (`None` = sem limite)
        rf_insert_budget: Mutex<Option<usize>>,
        fail_alerts: Mutex<bool>,
        /// Quantas chamadas de deleção de eventos RF ainda vão falhar
        rf_delete_failures: Mutex<usize>,
    }

    fn down() -> StoreError {
        StoreError::Unavailable("conexão recusada".into())
    }

    impl FaultyStore {
        pub(crate) fn failing_rf_inserts_after(n: usize) -> Self {
            let store = Self::default();
            *store.rf_insert_budget.lock() = Some(n);
            store
        }

        pub(crate) fn failing_alerts() -> Self {
            let store = Self::default();
            *store.fail_alerts.lock() = true;
            store
        }

        pub(crate) fn failing_rf_deletes(times: usize) -> Self {
            let store = Self::default();
            *store.rf_delete_failures.lock() = times;
            store
        }
    }

    #[async_trait]
    impl EventStore for FaultyStore {
        async fn insert_rf_event(&self, event: &RfEventRecord) -> Result<(), StoreError> {
            {
                let mut budget = self.rf_insert_budget.lock();
                match budget.as_mut() {
                    Some(0) => return Err(down()),
                    Some(n) => *n -= 1,
                    None => {}
                }
            }
            self.inner.insert_rf_event(event).await
        }
        async fn insert_gps_log(&self, s: &GpsSample) -> Result<(), StoreError> {
            self.inner.insert_gps_log(s).await
        }
        async fn insert_alert(&self, a: NewAlert) -> Result<Alert, StoreError> {
            if *self.fail_alerts.lock() {
                return Err(down());
            }
            self.inner.insert_alert(a).await
        }
        async fn insert_node(&self, n: &NodeInfo) -> Result<(), StoreError> {
            self.inner.insert_node(n).await
        }
        async fn rf_events(&self, w: TimeWindow, p: Pagination) -> Result<Page<RfEventRecord>, StoreError> {
            self.inner.rf_events(w, p).await
        }
        async fn gps_logs(&self, w: TimeWindow, p: Pagination) -> Result<Page<GpsSample>, StoreError> {
            self.inner.gps_logs(w, p).await
        }
        async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
            self.inner.recent_alerts(limit).await
        }
        async fn snapshot_since(&self, since: Timestamp) -> Result<WindowSnapshot, StoreError> {
            self.inner.snapshot_since(since).await
        }
        async fn delete_rf_events_before(&self, c: Timestamp) -> Result<u64, StoreError> {
            {
                let mut left = self.rf_delete_failures.lock();
                if *left > 0 {
                    *left -= 1;
                    return Err(down());
                }
            }
            self.inner.delete_rf_events_before(c).await
        }
        async fn delete_gps_logs_before(&self, c: Timestamp) -> Result<u64, StoreError> {
            self.inner.delete_gps_logs_before(c).await
        }
        async fn upsert_rollups(&self, r: &[NodeRollup]) -> Result<(), StoreError> {
            self.inner.upsert_rollups(r).await
        }
        async fn rollups(&self) -> Result<Vec<NodeRollup>, StoreError> {
            self.inner.rollups().await
        }
        async fn nodes(&self) -> Result<Vec<NodeInfo>, StoreError> {
            self.inner.nodes().await
        }
        async fn node(&self, node_id: &str) -> Result<Option<NodeInfo>, StoreError> {
            self.inner.node(node_id).await
        }
    }
}
