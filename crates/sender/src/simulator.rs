//! Simulador de nós de campo.
//!
//! Cada nó mantém um estado com random walk (bateria, temperatura, potência
//! RF) e, a cada ciclo, gera três frames: telemetria, evento RF e qualidade
//! GNSS. Picos de anomalia e interferência aparecem com baixa probabilidade
//! para exercitar o motor de alertas do receiver.
//!
//! O campo `timestamp_ms` do frame tem 32 bits, como o `millis()` do
//! firmware: os nós simulados carimbam os registros com o uptime do
//! simulador em ms (volta a zero após ~49 dias), nunca com a hora de parede.

use chrono::DateTime;
use mesh_core::protocol::{self, FrameHeader, Payload, ProtocolError};
use mesh_core::types::{GpsSample, RfEventRecord, TelemetryRecord};
use mesh_core::PROTOCOL_VERSION;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// Destino lógico dos frames simulados.
pub const GATEWAY_ID: &str = "gateway";

/// Bandas monitoradas: (id, frequência central em Hz).
const BANDS: [(&str, f32); 3] = [("433mhz", 433.92e6), ("868mhz", 868.3e6), ("915mhz", 915.0e6)];
const BIN_WIDTH_HZ: f32 = 12_500.0;

/// Chance por ciclo de um pico de anomalia RF
const ANOMALY_SPIKE_P: f64 = 0.05;
/// Chance por ciclo de interferência GNSS
const INTERFERENCE_P: f64 = 0.03;

const BATTERY_RANGE: (f32, f32) = (3.3, 4.2);
const TEMP_RANGE: (f32, f32) = (-20.0, 70.0);
const RF_POWER_RANGE: (f32, f32) = (-110.0, -40.0);

struct SimNode {
    id: String,
    seq_no: u32,
    battery_v: f32,
    temp_c: f32,
    rf_power_dbm: f32,
}

pub struct NodeSimulator {
    nodes: Vec<SimNode>,
    rng: StdRng,
}

impl NodeSimulator {
    pub fn new(node_ids: &[String]) -> Self {
        Self::with_rng(node_ids, StdRng::from_entropy())
    }

    /// Simulador determinístico, usado nos testes.
    pub fn with_seed(node_ids: &[String], seed: u64) -> Self {
        Self::with_rng(node_ids, StdRng::seed_from_u64(seed))
    }

    fn with_rng(node_ids: &[String], mut rng: StdRng) -> Self {
        let nodes = node_ids
            .iter()
            .map(|id| SimNode {
                id: id.clone(),
                seq_no: 0,
                battery_v: rng.gen_range(3.8..4.2),
                temp_c: rng.gen_range(15.0..30.0),
                rf_power_dbm: rng.gen_range(-90.0..-60.0),
            })
            .collect();
        Self { nodes, rng }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Avança um ciclo e retorna os frames de todos os nós (três por nó),
    /// carimbados com `uptime_ms`.
    pub fn collect(&mut self, uptime_ms: u32) -> Vec<(FrameHeader, Payload)> {
        let now = DateTime::from_timestamp_millis(i64::from(uptime_ms)).unwrap_or_default();
        let mut frames = Vec::with_capacity(self.nodes.len() * 3);
        for node in &mut self.nodes {
            let rng = &mut self.rng;
            node.step(rng);

            let telemetry = Payload::Telemetry(TelemetryRecord {
                node_id: node.id.clone(),
                timestamp: now,
                rf_power_dbm: node.rf_power_dbm,
                battery_v: node.battery_v,
                temp_c: node.temp_c,
                anomaly_score: anomaly_score(rng),
            });
            frames.push((node.header(rng), telemetry));

            let (band_id, center_freq_hz) = BANDS[rng.gen_range(0..BANDS.len())];
            let rf_event = Payload::RfEvent(RfEventRecord {
                node_id: node.id.clone(),
                timestamp: now,
                band_id: band_id.into(),
                center_freq_hz,
                bin_width_hz: BIN_WIDTH_HZ,
                anomaly_score: anomaly_score(rng),
                features: vec![
                    node.rf_power_dbm,
                    rng.gen_range(-120.0..-100.0),
                    rng.gen_range(0.0..1.0),
                    rng.gen_range(1.0..6.0),
                ],
            });
            frames.push((node.header(rng), rf_event));

            let (jamming_indicator, spoof_indicator) = if rng.gen_bool(INTERFERENCE_P) {
                if rng.gen_bool(0.5) {
                    (rng.gen_range(0.6..0.95), rng.gen_range(0.0..0.3))
                } else {
                    (rng.gen_range(0.0..0.3), rng.gen_range(0.6..0.95))
                }
            } else {
                (rng.gen_range(0.0..0.3), rng.gen_range(0.0..0.3))
            };
            let hdop = rng.gen_range(0.8..3.0);
            let gps = Payload::GpsQuality(GpsSample {
                node_id: node.id.clone(),
                timestamp: now,
                num_sats: rng.gen_range(4..13),
                snr_avg: rng.gen_range(25.0..45.0),
                hdop,
                valid_fix: hdop < 2.5,
                jamming_indicator,
                spoof_indicator,
            });
            frames.push((node.header(rng), gps));
        }
        frames
    }

    /// Mesmo que [`collect`](Self::collect), já serializado para envio.
    pub fn encode_cycle(&mut self, uptime_ms: u32) -> Result<Vec<Vec<u8>>, ProtocolError> {
        self.collect(uptime_ms)
            .iter()
            .map(|(header, payload)| protocol::encode_frame(header, payload))
            .collect()
    }
}

impl SimNode {
    fn step(&mut self, rng: &mut StdRng) {
        self.battery_v = walk(self.battery_v, rng.gen_range(-0.004..0.001), BATTERY_RANGE);
        self.temp_c = walk(self.temp_c, rng.gen_range(-0.3..0.3), TEMP_RANGE);
        self.rf_power_dbm = walk(self.rf_power_dbm, rng.gen_range(-1.5..1.5), RF_POWER_RANGE);
    }

    fn header(&mut self, rng: &mut StdRng) -> FrameHeader {
        self.seq_no = self.seq_no.wrapping_add(1);
        FrameHeader {
            version: PROTOCOL_VERSION,
            msg_type: 0,
            ttl: 8,
            hop_count: rng.gen_range(0..4),
            seq_no: self.seq_no,
            src_id: self.id.clone(),
            dest_id: GATEWAY_ID.into(),
        }
    }
}

/// Relógio de 32 bits em ms desde `started`, com a mesma volta do `millis()`.
pub fn uptime_ms(started: Instant) -> u32 {
    started.elapsed().as_millis() as u32
}

fn walk(value: f32, delta: f32, (min, max): (f32, f32)) -> f32 {
    (value + delta).clamp(min, max)
}

fn anomaly_score(rng: &mut StdRng) -> f32 {
    if rng.gen_bool(ANOMALY_SPIKE_P) {
        rng.gen_range(0.8..1.0)
    } else {
        rng.gen_range(0.0..0.6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::protocol::{decode_frame, MessageType};

    fn ids() -> Vec<String> {
        vec!["edge-1".into(), "edge-2".into()]
    }

    #[test]
    fn three_frames_per_node() {
        let mut sim = NodeSimulator::with_seed(&ids(), 7);
        let frames = sim.collect(1_000);
        assert_eq!(frames.len(), 6);

        let kinds: Vec<MessageType> = frames.iter().map(|(_, p)| p.message_type()).collect();
        assert_eq!(
            &kinds[..3],
            &[MessageType::Telemetry, MessageType::RfEvent, MessageType::GpsQuality]
        );
        assert_eq!(frames[3].0.src_id, "edge-2");
    }

    #[test]
    fn sequence_numbers_increase_per_node() {
        let mut sim = NodeSimulator::with_seed(&ids(), 7);
        sim.collect(1_000);
        let frames = sim.collect(3_000);
        let seqs: Vec<u32> = frames
            .iter()
            .filter(|(h, _)| h.src_id == "edge-1")
            .map(|(h, _)| h.seq_no)
            .collect();
        assert_eq!(seqs, vec![4, 5, 6]);
    }

    #[test]
    fn walk_stays_in_range() {
        let mut sim = NodeSimulator::with_seed(&ids(), 42);
        for cycle in 0..2_000u32 {
            for (_, payload) in sim.collect(cycle * 2_000) {
                match payload {
                    Payload::Telemetry(t) => {
                        assert!((BATTERY_RANGE.0..=BATTERY_RANGE.1).contains(&t.battery_v));
                        assert!((TEMP_RANGE.0..=TEMP_RANGE.1).contains(&t.temp_c));
                        assert!((0.0..=1.0).contains(&t.anomaly_score));
                    }
                    Payload::GpsQuality(g) => {
                        assert!((4..=12).contains(&g.num_sats));
                        assert!(g.jamming_indicator < 1.0 && g.spoof_indicator < 1.0);
                    }
                    Payload::RfEvent(e) => assert_eq!(e.features.len(), 4),
                }
            }
        }
    }

    #[test]
    fn encoded_frames_decode_with_source_as_node() {
        let mut sim = NodeSimulator::with_seed(&ids(), 3);
        let encoded = sim.encode_cycle(123_456).unwrap();
        assert_eq!(encoded.len(), 6);
        for (i, bytes) in encoded.iter().enumerate() {
            let frame = decode_frame(bytes).unwrap();
            let expected = if i < 3 { "edge-1" } else { "edge-2" };
            assert_eq!(frame.header.src_id, expected);
            assert_eq!(frame.header.dest_id, GATEWAY_ID);
            let timestamp = match &frame.payload {
                Payload::Telemetry(t) => t.timestamp,
                Payload::RfEvent(e) => e.timestamp,
                Payload::GpsQuality(g) => g.timestamp,
            };
            assert_eq!(timestamp.timestamp_millis(), 123_456);
            let node_id = match &frame.payload {
                Payload::Telemetry(t) => &t.node_id,
                Payload::RfEvent(e) => &e.node_id,
                Payload::GpsQuality(g) => &g.node_id,
            };
            assert_eq!(node_id, expected);
        }
    }

    #[test]
    fn same_seed_same_values() {
        let a = NodeSimulator::with_seed(&ids(), 11).collect(5_000);
        let b = NodeSimulator::with_seed(&ids(), 11).collect(5_000);
        assert_eq!(a, b);
    }

    #[test]
    fn uptime_clock_fits_wire_field() {
        let started = Instant::now();
        let ms = uptime_ms(started);
        assert!(ms < 60_000);

        // O carimbo atravessa o frame sem perder nada.
        let mut sim = NodeSimulator::with_seed(&ids(), 5);
        let bytes = &sim.encode_cycle(u32::MAX).unwrap()[0];
        match decode_frame(bytes).unwrap().payload {
            Payload::Telemetry(t) => assert_eq!(t.timestamp.timestamp_millis(), i64::from(u32::MAX)),
            other => panic!("esperava telemetria, veio {other:?}"),
        }
    }
}
