//! Hub de broadcast para assinantes ao vivo.
//!
//! O hub só guarda o conjunto de assinantes conectados. Não há fila nem
//! replay: quem conecta depois de um broadcast não recebe a mensagem. Uma
//! entrega que falha remove o assinante e não interrompe os demais.

use mesh_core::types::{Alert, GpsSample, RfEventRecord, Severity, TelemetryRecord, Timestamp};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type SubscriberId = u64;

/// Falha de entrega a um assinante.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Assinante desconectado")]
    Closed,

    #[error("Buffer do assinante cheio")]
    Full,
}

/// Qualquer coisa que receba mensagens do hub.
///
/// `deliver` não pode bloquear: um assinante lento deve falhar (e ser
/// removido) em vez de segurar o broadcast.
pub trait Subscriber: Send + Sync {
    fn deliver(&self, message: &HubMessage) -> Result<(), DeliveryError>;
}

// ──────────────────────────────────────────────
// Mensagens
// ──────────────────────────────────────────────

/// Mensagem entregue aos assinantes, serializada com a tag `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubMessage {
    Telemetry {
        node_id: String,
        timestamp: Timestamp,
        rf_power_dbm: f32,
        battery_v: f32,
        temp_c: f32,
        anomaly_score: f32,
    },
    RfEvent {
        node_id: String,
        timestamp: Timestamp,
        band_id: String,
        center_freq_hz: f32,
        anomaly_score: f32,
    },
    GpsQuality {
        node_id: String,
        timestamp: Timestamp,
        num_sats: u8,
        hdop: f32,
        valid_fix: bool,
        jamming_indicator: f32,
        spoof_indicator: f32,
    },
    Alert {
        id: u64,
        severity: Severity,
        message: String,
        node_ids: Vec<String>,
        created_at: Timestamp,
    },
}

impl HubMessage {
    pub fn telemetry(r: &TelemetryRecord) -> Self {
        HubMessage::Telemetry {
            node_id: r.node_id.clone(),
            timestamp: r.timestamp,
            rf_power_dbm: r.rf_power_dbm,
            battery_v: r.battery_v,
            temp_c: r.temp_c,
            anomaly_score: r.anomaly_score,
        }
    }

    pub fn rf_event(e: &RfEventRecord) -> Self {
        HubMessage::RfEvent {
            node_id: e.node_id.clone(),
            timestamp: e.timestamp,
            band_id: e.band_id.clone(),
            center_freq_hz: e.center_freq_hz,
            anomaly_score: e.anomaly_score,
        }
    }

    pub fn gps_quality(s: &GpsSample) -> Self {
        HubMessage::GpsQuality {
            node_id: s.node_id.clone(),
            timestamp: s.timestamp,
            num_sats: s.num_sats,
            hdop: s.hdop,
            valid_fix: s.valid_fix,
            jamming_indicator: s.jamming_indicator,
            spoof_indicator: s.spoof_indicator,
        }
    }

    pub fn alert(a: &Alert) -> Self {
        HubMessage::Alert {
            id: a.id,
            severity: a.severity,
            message: a.message.clone(),
            node_ids: a.node_ids.clone(),
            created_at: a.created_at,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ──────────────────────────────────────────────
// Hub
// ──────────────────────────────────────────────

/// Resultado de um broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Registro de assinantes ao vivo.
///
/// Compartilhado via `Arc<BroadcastHub>`. O lock só protege o mapa; as
/// entregas acontecem fora dele.
#[derive(Default)]
pub struct BroadcastHub {
    subscribers: RwLock<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.subscribers.write().insert(id, subscriber);
        debug!(subscriber = id, "Assinante conectado");
        id
    }

    /// Remove o assinante. Retorna `false` se ele já não estava registrado.
    pub fn disconnect(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "Assinante desconectado");
        }
        removed
    }

    pub fn is_connected(&self, id: SubscriberId) -> bool {
        self.subscribers.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Entrega a mensagem a todos os assinantes registrados agora.
    pub fn broadcast(&self, message: &HubMessage) -> BroadcastReport {
        let targets: Vec<(SubscriberId, Arc<dyn Subscriber>)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, s)| (*id, Arc::clone(s)))
            .collect();

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (id, subscriber) in targets {
            match subscriber.deliver(message) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(subscriber = id, "Entrega falhou, removendo assinante: {e}");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in &failed {
                subscribers.remove(id);
            }
            report.dropped = failed.len();
        }

        report
    }
}

// ──────────────────────────────────────────────
// Assinante via channel
// ──────────────────────────────────────────────

/// Assinante que repassa mensagens para um `mpsc` limitado. Quem consome o
/// receiver (ex: uma conexão TCP) decide o transporte.
pub struct ChannelSubscriber {
    tx: mpsc::Sender<HubMessage>,
}

impl ChannelSubscriber {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<HubMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

impl Subscriber for ChannelSubscriber {
    fn deliver(&self, message: &HubMessage) -> Result<(), DeliveryError> {
        self.tx.try_send(message.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
