//! Registros do pipeline de ingestão.
//!
//! Cada payload decodificado vira um registro imutável com o `node_id` do
//! nó de origem. O [`NodeStatus`] é a única projeção mutável (ver
//! [`crate::fusion`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Instante UTC com precisão de milissegundos.
pub type Timestamp = DateTime<Utc>;

// ──────────────────────────────────────────────
// Eventos ingeridos
// ──────────────────────────────────────────────

/// Amostra de telemetria simples (tipo 1 no fio).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryRecord {
    pub node_id: String,
    pub timestamp: Timestamp,
    /// Potência RF medida (dBm)
    pub rf_power_dbm: f32,
    /// Tensão da bateria (V)
    pub battery_v: f32,
    /// Temperatura interna (°C)
    pub temp_c: f32,
    /// Saída do modelo de anomalia (0–1)
    pub anomaly_score: f32,
}

/// Evento RF (tipo 2 no fio). Append-only; só a retenção remove.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RfEventRecord {
    pub node_id: String,
    pub timestamp: Timestamp,
    pub band_id: String,
    pub center_freq_hz: f32,
    pub bin_width_hz: f32,
    pub anomaly_score: f32,
    /// Vetor de features do FFT. O primeiro valor, quando presente, é a
    /// potência RF do nó.
    pub features: Vec<f32>,
}

/// Amostra de qualidade GNSS (tipo 3 no fio). Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpsSample {
    pub node_id: String,
    pub timestamp: Timestamp,
    pub num_sats: u8,
    pub snr_avg: f32,
    pub hdop: f32,
    pub valid_fix: bool,
    pub jamming_indicator: f32,
    pub spoof_indicator: f32,
}

impl GpsSample {
    /// Qualquer indicador acima do limiar conta como interferência.
    pub fn is_interference(&self, threshold: f32) -> bool {
        self.jamming_indicator > threshold || self.spoof_indicator > threshold
    }
}

// ──────────────────────────────────────────────
// Status fundido
// ──────────────────────────────────────────────

/// Bloco GNSS guardado no status do nó.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpsQuality {
    pub num_sats: u8,
    pub snr_avg: f32,
    pub hdop: f32,
    pub valid_fix: bool,
    pub jamming_indicator: f32,
    pub spoof_indicator: f32,
}

impl From<&GpsSample> for GpsQuality {
    fn from(s: &GpsSample) -> Self {
        Self {
            num_sats: s.num_sats,
            snr_avg: s.snr_avg,
            hdop: s.hdop,
            valid_fix: s.valid_fix,
            jamming_indicator: s.jamming_indicator,
            spoof_indicator: s.spoof_indicator,
        }
    }
}

/// Snapshot atual de um nó. Campos ausentes numa atualização mantêm o valor
/// anterior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeStatus {
    pub node_id: String,
    pub last_seen: Timestamp,
    pub battery_v: f32,
    pub rf_power_dbm: f32,
    pub temp_c: f32,
    pub anomaly_score: f32,
    pub gps_quality: Option<GpsQuality>,
}

impl NodeStatus {
    /// Status zerado, usado quando o primeiro contato não traz todos os campos.
    pub fn empty(node_id: impl Into<String>, last_seen: Timestamp) -> Self {
        Self {
            node_id: node_id.into(),
            last_seen,
            battery_v: 0.0,
            rf_power_dbm: 0.0,
            temp_c: 0.0,
            anomaly_score: 0.0,
            gps_quality: None,
        }
    }
}

// ──────────────────────────────────────────────
// Alertas
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    RfAnomaly,
    GpsJam,
    GpsSpoof,
    Tamper,
    Offline,
}

/// Severidade, ordenada da mais branda à mais grave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Med,
    High,
    Critical,
}

/// Alerta ainda sem id, produzido pelo motor de alertas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAlert {
    pub node_ids: Vec<String>,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub created_at: Timestamp,
}

impl NewAlert {
    /// Atribui o id gerado pelo armazenamento.
    pub fn with_id(self, id: u64) -> Alert {
        Alert {
            id,
            node_ids: self.node_ids,
            kind: self.kind,
            severity: self.severity,
            message: self.message,
            created_at: self.created_at,
        }
    }
}

/// Alerta persistido. Imutável depois de criado.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: u64,
    pub node_ids: Vec<String>,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub created_at: Timestamp,
}

// ──────────────────────────────────────────────
// Agregados e cadastro
// ──────────────────────────────────────────────

/// Agregado de 24h por nó, sobrescrito inteiro a cada ciclo de manutenção.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRollup {
    pub node_id: String,
    pub rf_events_24h: u32,
    pub avg_anomaly_24h: f32,
    pub gps_jam_events_24h: u32,
    pub last_updated: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Edge,
    Gateway,
}

/// Metadados de cadastro de um nó de campo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeInfo {
    pub node_id: String,
    pub name: Option<String>,
    pub role: NodeRole,
    pub hw_serial: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub created_at: Timestamp,
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
