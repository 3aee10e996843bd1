//! Serviço de ingestão: frame → fusão → persistência → broadcast → alerta.
//!
//! Cada registro segue a mesma ordem: o status do nó é fundido, o registro é
//! gravado no [`EventStore`], e só então vai para o hub. Se o motor de
//! alertas disparar, o alerta também é gravado antes do broadcast.
//!
//! Uma falha de persistência volta para quem chamou. O status fundido já foi
//! atualizado nesse ponto e não é revertido.

use crate::hub::{BroadcastHub, HubMessage};
use crate::store::{EventStore, Page, Pagination, StoreError, TimeWindow};
use chrono::Utc;
use mesh_core::alerts;
use mesh_core::config::AlertThresholds;
use mesh_core::fusion::FusionStore;
use mesh_core::protocol::{self, MessageType, Payload, ProtocolError};
use mesh_core::types::{
    Alert, GpsSample, NewAlert, NodeInfo, NodeRollup, NodeStatus, RfEventRecord, TelemetryRecord,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Banda atribuída aos eventos RF derivados de telemetria simples.
pub const LEGACY_BAND: &str = "legacy";

/// Erros expostos pela API de ingestão.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Frame rejeitado: {0}")]
    Frame(#[from] ProtocolError),

    #[error("Falha de persistência após {accepted} registro(s) aceito(s): {source}")]
    Persistence {
        accepted: usize,
        #[source]
        source: StoreError,
    },

    #[error("Nó não encontrado: {0}")]
    NotFound(String),

    #[error("Nó já cadastrado: {0}")]
    Conflict(String),
}

impl IngestError {
    fn persistence(accepted: usize) -> impl FnOnce(StoreError) -> IngestError {
        move |source| IngestError::Persistence { accepted, source }
    }
}

pub struct IngestService {
    fusion: FusionStore,
    store: Arc<dyn EventStore>,
    hub: Arc<BroadcastHub>,
    thresholds: AlertThresholds,
}

impl IngestService {
    pub fn new(store: Arc<dyn EventStore>, hub: Arc<BroadcastHub>, thresholds: AlertThresholds) -> Self {
        Self {
            fusion: FusionStore::new(),
            store,
            hub,
            thresholds,
        }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    // ──────────────────────────────────────────────
    // Entrada
    // ──────────────────────────────────────────────

    /// Decodifica um frame bruto e roteia para o submit correspondente.
    pub async fn ingest_frame(&self, data: &[u8]) -> Result<MessageType, IngestError> {
        let frame = protocol::decode_frame(data)?;
        let msg_type = frame.payload.message_type();
        debug!(
            src = %frame.header.src_id,
            seq = frame.header.seq_no,
            hops = frame.header.hop_count,
            "Frame {msg_type:?} decodificado"
        );

        match frame.payload {
            Payload::Telemetry(record) => self.submit_telemetry(record).await?,
            Payload::RfEvent(event) => self.submit_rf_events(vec![event]).await?,
            Payload::GpsQuality(sample) => self.submit_gps_samples(vec![sample]).await?,
        };
        Ok(msg_type)
    }

    /// Telemetria simples. Também vira um evento RF na banda `legacy` para
    /// entrar no histórico e nos rollups.
    pub async fn submit_telemetry(&self, record: TelemetryRecord) -> Result<usize, IngestError> {
        self.fusion.apply_telemetry(&record);

        let legacy = RfEventRecord {
            node_id: record.node_id.clone(),
            timestamp: record.timestamp,
            band_id: LEGACY_BAND.into(),
            center_freq_hz: 0.0,
            bin_width_hz: 0.0,
            anomaly_score: record.anomaly_score,
            features: vec![record.rf_power_dbm],
        };
        self.store
            .insert_rf_event(&legacy)
            .await
            .map_err(IngestError::persistence(0))?;
        self.hub.broadcast(&HubMessage::telemetry(&record));

        let alert = alerts::evaluate_telemetry(&record, &self.thresholds);
        self.raise(alert).await.map_err(IngestError::persistence(1))?;
        Ok(1)
    }

    /// Lote de eventos RF, processados em ordem. Em caso de falha o erro
    /// informa quantos já tinham sido aceitos.
    pub async fn submit_rf_events(&self, batch: Vec<RfEventRecord>) -> Result<usize, IngestError> {
        for (accepted, event) in batch.iter().enumerate() {
            self.fusion.apply_rf_event(event);
            self.store
                .insert_rf_event(event)
                .await
                .map_err(IngestError::persistence(accepted))?;
            self.hub.broadcast(&HubMessage::rf_event(event));

            // O evento já está gravado; se o alerta falhar ele conta como aceito.
            let alert = alerts::evaluate_rf_event(event, &self.thresholds);
            self.raise(alert).await.map_err(IngestError::persistence(accepted + 1))?;
        }
        Ok(batch.len())
    }

    /// Lote de amostras GNSS.
    pub async fn submit_gps_samples(&self, batch: Vec<GpsSample>) -> Result<usize, IngestError> {
        for (accepted, sample) in batch.iter().enumerate() {
            self.fusion.apply_gps_quality(sample);
            self.store
                .insert_gps_log(sample)
                .await
                .map_err(IngestError::persistence(accepted))?;
            self.hub.broadcast(&HubMessage::gps_quality(sample));

            let alert = alerts::evaluate_gps(sample, &self.thresholds);
            self.raise(alert).await.map_err(IngestError::persistence(accepted + 1))?;
        }
        Ok(batch.len())
    }

    async fn raise(&self, alert: Option<NewAlert>) -> Result<Option<Alert>, StoreError> {
        let Some(alert) = alert else {
            return Ok(None);
        };
        let stored = self.store.insert_alert(alert).await?;
        info!(
            id = stored.id,
            kind = ?stored.kind,
            severity = ?stored.severity,
            nodes = ?stored.node_ids,
            "Alerta: {}",
            stored.message
        );
        self.hub.broadcast(&HubMessage::alert(&stored));
        Ok(Some(stored))
    }

    // ──────────────────────────────────────────────
    // Cadastro e status
    // ──────────────────────────────────────────────

    /// Cadastra um nó. Se ele ainda não tinha status, cria um zerado.
    pub async fn register_node(&self, node: NodeInfo) -> Result<NodeInfo, IngestError> {
        self.store.insert_node(&node).await.map_err(|e| match e {
            StoreError::Conflict(id) => IngestError::Conflict(id),
            other => IngestError::Persistence {
                accepted: 0,
                source: other,
            },
        })?;
        self.fusion.ensure(&node.node_id, Utc::now());
        info!(node_id = %node.node_id, role = ?node.role, "Nó cadastrado");
        Ok(node)
    }

    pub fn list_node_status(&self) -> Vec<NodeStatus> {
        self.fusion.list()
    }

    pub fn get_node_status(&self, node_id: &str) -> Result<NodeStatus, IngestError> {
        self.fusion
            .get(node_id)
            .ok_or_else(|| IngestError::NotFound(node_id.to_string()))
    }

    // ──────────────────────────────────────────────
    // Histórico
    // ──────────────────────────────────────────────

    pub async fn list_rf_events(
        &self,
        window: TimeWindow,
        page: Pagination,
    ) -> Result<Page<RfEventRecord>, IngestError> {
        self.store
            .rf_events(window, page)
            .await
            .map_err(IngestError::persistence(0))
    }

    pub async fn list_gps_logs(
        &self,
        window: TimeWindow,
        page: Pagination,
    ) -> Result<Page<GpsSample>, IngestError> {
        self.store
            .gps_logs(window, page)
            .await
            .map_err(IngestError::persistence(0))
    }

    pub async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, IngestError> {
        self.store
            .recent_alerts(limit)
            .await
            .map_err(IngestError::persistence(0))
    }

    pub async fn list_rollups(&self) -> Result<Vec<NodeRollup>, IngestError> {
        self.store.rollups().await.map_err(IngestError::persistence(0))
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeInfo>, IngestError> {
        self.store.nodes().await.map_err(IngestError::persistence(0))
    }

    /// Metadados de um nó cadastrado.
    pub async fn get_node(&self, node_id: &str) -> Result<NodeInfo, IngestError> {
        self.store
            .node(node_id)
            .await
            .map_err(IngestError::persistence(0))?
            .ok_or_else(|| IngestError::NotFound(node_id.to_string()))
    }
}
