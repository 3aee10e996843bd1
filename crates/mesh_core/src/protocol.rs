//! Protocolo binário do enlace mesh.
//!
//! Frames de tamanho fixo, little-endian, sem padding:
//!
//! ```text
//! ┌──────────────────────────────── header (40) ───────────────────────────────┐┌─ payload ─┐
//! │ ver(1) │ type(1) │ ttl(1) │ hops(1) │ seq(4) │ src_id(16) │ dest_id(16)    ││  N bytes  │
//! └────────────────────────────────────────────────────────────────────────────┘└───────────┘
//! ```
//!
//! | type | payload        | N  |
//! |------|----------------|----|
//! | 1    | Telemetry      | 20 |
//! | 2    | RfEvent        | 40 |
//! | 3    | GpsQuality     | 22 |
//!
//! O layout é o das structs `packed` do firmware. Com a codificação legada do
//! bincode (fixint, little-endian, arrays sem prefixo de tamanho) cada struct
//! `Wire*` abaixo serializa exatamente nesse layout.

use crate::types::{GpsSample, RfEventRecord, TelemetryRecord, Timestamp};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Tamanho do header comum a todos os tipos.
pub const HEADER_SIZE: usize = 40;
pub const TELEMETRY_SIZE: usize = 20;
pub const RF_EVENT_SIZE: usize = 40;
pub const GPS_SIZE: usize = 22;

/// Versão de header emitida pelo firmware atual.
pub const PROTOCOL_VERSION: u8 = 1;

const NODE_ID_LEN: usize = 16;
const BAND_ID_LEN: usize = 8;
const FEATURE_COUNT: usize = 4;

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame muito curto ({len} bytes, mínimo {required})")]
    FrameTooShort { len: usize, required: usize },

    #[error("Tipo de mensagem não suportado: {0}")]
    UnsupportedMessageType(u8),

    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),
}

/// Tipo de payload carregado pelo frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Telemetry = 1,
    RfEvent = 2,
    GpsQuality = 3,
}

impl MessageType {
    /// Tamanho do payload que segue o header.
    pub const fn payload_size(self) -> usize {
        match self {
            MessageType::Telemetry => TELEMETRY_SIZE,
            MessageType::RfEvent => RF_EVENT_SIZE,
            MessageType::GpsQuality => GPS_SIZE,
        }
    }

    pub const fn frame_size(self) -> usize {
        HEADER_SIZE + self.payload_size()
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Telemetry),
            2 => Ok(MessageType::RfEvent),
            3 => Ok(MessageType::GpsQuality),
            other => Err(ProtocolError::UnsupportedMessageType(other)),
        }
    }
}

/// Header decodificado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub msg_type: u8,
    pub ttl: u8,
    pub hop_count: u8,
    pub seq_no: u32,
    pub src_id: String,
    pub dest_id: String,
}

/// Payload tipado. O `node_id` de cada registro vem do `src_id` do header.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Telemetry(TelemetryRecord),
    RfEvent(RfEventRecord),
    GpsQuality(GpsSample),
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Telemetry(_) => MessageType::Telemetry,
            Payload::RfEvent(_) => MessageType::RfEvent,
            Payload::GpsQuality(_) => MessageType::GpsQuality,
        }
    }
}

/// Frame completo: header + exatamente um payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Payload,
}

// ──────────────────────────────────────────────
// Layout de fio
// ──────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct WireHeader {
    version: u8,
    msg_type: u8,
    ttl: u8,
    hop_count: u8,
    seq_no: u32,
    src_id: [u8; NODE_ID_LEN],
    dest_id: [u8; NODE_ID_LEN],
}

#[derive(Serialize, Deserialize)]
struct WireTelemetry {
    timestamp_ms: u32,
    rf_power_dbm: f32,
    battery_v: f32,
    temp_c: f32,
    anomaly_score: f32,
}

#[derive(Serialize, Deserialize)]
struct WireRfEvent {
    timestamp_ms: u32,
    center_freq_hz: f32,
    bin_width_hz: f32,
    anomaly_score: f32,
    features: [f32; FEATURE_COUNT],
    band_id: [u8; BAND_ID_LEN],
}

#[derive(Serialize, Deserialize)]
struct WireGps {
    timestamp_ms: u32,
    num_sats: u8,
    snr_avg: f32,
    hdop: f32,
    valid_fix: u8,
    jamming_indicator: f32,
    spoof_indicator: f32,
}

// ──────────────────────────────────────────────
// Decode
// ──────────────────────────────────────────────

/// Decodifica um frame recebido do gateway.
///
/// Falha com [`ProtocolError::UnsupportedMessageType`] se o byte de tipo não
/// for 1, 2 ou 3, e com [`ProtocolError::FrameTooShort`] se o buffer não
/// cobrir header + payload. Bytes além do payload são ignorados.
pub fn decode_frame(data: &[u8]) -> Result<Frame, ProtocolError> {
    if data.len() < 2 {
        return Err(ProtocolError::FrameTooShort {
            len: data.len(),
            required: HEADER_SIZE,
        });
    }

    let msg_type = MessageType::try_from(data[1])?;
    let required = msg_type.frame_size();
    if data.len() < required {
        return Err(ProtocolError::FrameTooShort {
            len: data.len(),
            required,
        });
    }

    let wire: WireHeader = deserialize(&data[..HEADER_SIZE])?;
    let header = FrameHeader {
        version: wire.version,
        msg_type: wire.msg_type,
        ttl: wire.ttl,
        hop_count: wire.hop_count,
        seq_no: wire.seq_no,
        src_id: read_c_string(&wire.src_id),
        dest_id: read_c_string(&wire.dest_id),
    };

    let body = &data[HEADER_SIZE..required];
    let node_id = header.src_id.clone();
    let payload = match msg_type {
        MessageType::Telemetry => {
            let w: WireTelemetry = deserialize(body)?;
            Payload::Telemetry(TelemetryRecord {
                node_id,
                timestamp: timestamp_from_ms(w.timestamp_ms),
                rf_power_dbm: w.rf_power_dbm,
                battery_v: w.battery_v,
                temp_c: w.temp_c,
                anomaly_score: w.anomaly_score,
            })
        }
        MessageType::RfEvent => {
            let w: WireRfEvent = deserialize(body)?;
            let band = read_c_string(&w.band_id);
            Payload::RfEvent(RfEventRecord {
                node_id,
                timestamp: timestamp_from_ms(w.timestamp_ms),
                band_id: if band.is_empty() { "unknown".into() } else { band },
                center_freq_hz: w.center_freq_hz,
                bin_width_hz: w.bin_width_hz,
                anomaly_score: w.anomaly_score,
                features: w.features.to_vec(),
            })
        }
        MessageType::GpsQuality => {
            let w: WireGps = deserialize(body)?;
            Payload::GpsQuality(GpsSample {
                node_id,
                timestamp: timestamp_from_ms(w.timestamp_ms),
                num_sats: w.num_sats,
                snr_avg: w.snr_avg,
                hdop: w.hdop,
                valid_fix: w.valid_fix != 0,
                jamming_indicator: w.jamming_indicator,
                spoof_indicator: w.spoof_indicator,
            })
        }
    };

    Ok(Frame { header, payload })
}

// ──────────────────────────────────────────────
// Encode
// ──────────────────────────────────────────────

/// Codifica um frame no layout do firmware.
///
/// O `msg_type` do header é sempre derivado do payload. Ids maiores que o
/// campo são truncados; features além de 4 são descartadas e as faltantes
/// viram zero.
pub fn encode_frame(header: &FrameHeader, payload: &Payload) -> Result<Vec<u8>, ProtocolError> {
    let msg_type = payload.message_type();
    let wire_header = WireHeader {
        version: header.version,
        msg_type: msg_type as u8,
        ttl: header.ttl,
        hop_count: header.hop_count,
        seq_no: header.seq_no,
        src_id: write_c_string(&header.src_id),
        dest_id: write_c_string(&header.dest_id),
    };

    let mut frame = Vec::with_capacity(msg_type.frame_size());
    frame.extend_from_slice(&serialize(&wire_header)?);

    let body = match payload {
        Payload::Telemetry(t) => serialize(&WireTelemetry {
            timestamp_ms: timestamp_to_ms(&t.timestamp),
            rf_power_dbm: t.rf_power_dbm,
            battery_v: t.battery_v,
            temp_c: t.temp_c,
            anomaly_score: t.anomaly_score,
        })?,
        Payload::RfEvent(e) => {
            let mut features = [0.0f32; FEATURE_COUNT];
            for (slot, value) in features.iter_mut().zip(&e.features) {
                *slot = *value;
            }
            serialize(&WireRfEvent {
                timestamp_ms: timestamp_to_ms(&e.timestamp),
                center_freq_hz: e.center_freq_hz,
                bin_width_hz: e.bin_width_hz,
                anomaly_score: e.anomaly_score,
                features,
                band_id: write_c_string(&e.band_id),
            })?
        }
        Payload::GpsQuality(g) => serialize(&WireGps {
            timestamp_ms: timestamp_to_ms(&g.timestamp),
            num_sats: g.num_sats,
            snr_avg: g.snr_avg,
            hdop: g.hdop,
            valid_fix: u8::from(g.valid_fix),
            jamming_indicator: g.jamming_indicator,
            spoof_indicator: g.spoof_indicator,
        })?,
    };
    frame.extend_from_slice(&body);

    Ok(frame)
}

// ──────────────────────────────────────────────
// Auxiliares
// ──────────────────────────────────────────────

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serialize(value).map_err(|e| ProtocolError::Serialize(e.to_string()))
}

fn deserialize<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, ProtocolError> {
    bincode::deserialize(bytes).map_err(|e| ProtocolError::Deserialize(e.to_string()))
}

/// Lê um buffer C: corta no primeiro NUL, o resto é descartado.
fn read_c_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn write_c_string<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let bytes = s.as_bytes();
    let len = bytes.len().min(N);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

/// `u32` em ms sempre cabe no intervalo do chrono.
fn timestamp_from_ms(ms: u32) -> Timestamp {
    DateTime::from_timestamp_millis(i64::from(ms)).unwrap_or_default()
}

/// O campo de fio tem 32 bits; o valor é truncado nesse tamanho.
fn timestamp_to_ms(ts: &Timestamp) -> u32 {
    ts.timestamp_millis() as u32
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
