//! Fusão de estado por nó.
//!
//! [`FusionStore`] é o dono exclusivo do mapa `node_id → NodeStatus`. Cada
//! operação faz o read-modify-write de um nó sob o lock de escrita, então
//! ingestões concorrentes para o mesmo nó ficam em last-write-wins por campo.
//! Não há reordenação por timestamp: um frame atrasado sobrescreve os campos
//! que ele carrega.

use crate::types::{GpsQuality, GpsSample, NodeStatus, RfEventRecord, TelemetryRecord, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct FusionStore {
    nodes: RwLock<HashMap<String, NodeStatus>>,
}

impl FusionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Telemetria completa: sobrescreve potência, bateria, temperatura,
    /// anomalia e `last_seen`. O bloco GNSS é preservado.
    pub fn apply_telemetry(&self, record: &TelemetryRecord) -> NodeStatus {
        self.update(&record.node_id, record.timestamp, |status| {
            status.rf_power_dbm = record.rf_power_dbm;
            status.battery_v = record.battery_v;
            status.temp_c = record.temp_c;
            status.anomaly_score = record.anomaly_score;
        })
    }

    /// Evento RF: anomalia sempre, potência só se o evento tiver features.
    pub fn apply_rf_event(&self, event: &RfEventRecord) -> NodeStatus {
        self.update(&event.node_id, event.timestamp, |status| {
            status.anomaly_score = event.anomaly_score;
            if let Some(&power) = event.features.first() {
                status.rf_power_dbm = power;
            }
        })
    }

    /// Amostra GNSS: só `last_seen` e `gps_quality` mudam.
    pub fn apply_gps_quality(&self, sample: &GpsSample) -> NodeStatus {
        self.update(&sample.node_id, sample.timestamp, |status| {
            status.gps_quality = Some(GpsQuality::from(sample));
        })
    }

    /// Garante um snapshot zerado para um nó recém-cadastrado.
    /// Retorna `false` se o nó já tinha status.
    pub fn ensure(&self, node_id: &str, at: Timestamp) -> bool {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(node_id) {
            return false;
        }
        nodes.insert(node_id.to_string(), NodeStatus::empty(node_id, at));
        true
    }

    pub fn get(&self, node_id: &str) -> Option<NodeStatus> {
        self.nodes.read().get(node_id).cloned()
    }

    /// Todos os snapshots, ordenados por `node_id`.
    pub fn list(&self) -> Vec<NodeStatus> {
        let mut all: Vec<NodeStatus> = self.nodes.read().values().cloned().collect();
        all.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        all
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    fn update(
        &self,
        node_id: &str,
        seen: Timestamp,
        apply: impl FnOnce(&mut NodeStatus),
    ) -> NodeStatus {
        let mut nodes = self.nodes.write();
        let status = nodes
            .entry(node_id.to_string())
            .or_insert_with(|| NodeStatus::empty(node_id, seen));
        status.last_seen = seen;
        apply(status);
        status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::sync::Arc;

    fn at(ms: i64) -> Timestamp {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn telemetry(node: &str, ms: i64) -> TelemetryRecord {
        TelemetryRecord {
            node_id: node.into(),
            timestamp: at(ms),
            rf_power_dbm: -55.0,
            battery_v: 3.72,
            temp_c: 33.5,
            anomaly_score: 0.22,
        }
    }

    fn gps(node: &str, ms: i64) -> GpsSample {
        GpsSample {
            node_id: node.into(),
            timestamp: at(ms),
            num_sats: 7,
            snr_avg: 31.0,
            hdop: 1.4,
            valid_fix: true,
            jamming_indicator: 0.1,
            spoof_indicator: 0.0,
        }
    }

    fn rf(node: &str, ms: i64, features: Vec<f32>) -> RfEventRecord {
        RfEventRecord {
            node_id: node.into(),
            timestamp: at(ms),
            band_id: "2.4ghz".into(),
            center_freq_hz: 2.42e9,
            bin_width_hz: 20_000.0,
            anomaly_score: 0.81,
            features,
        }
    }

    #[test]
    fn gps_after_telemetry_keeps_radio_fields() {
        let store = FusionStore::new();
        let before = store.apply_telemetry(&telemetry("edge-1", 1_000));
        let after = store.apply_gps_quality(&gps("edge-1", 2_000));

        assert_eq!(after.rf_power_dbm, before.rf_power_dbm);
        assert_eq!(after.battery_v, before.battery_v);
        assert_eq!(after.temp_c, before.temp_c);
        assert_eq!(after.anomaly_score, before.anomaly_score);
        assert_eq!(after.last_seen, at(2_000));
        assert_eq!(after.gps_quality.unwrap().num_sats, 7);
    }

    #[test]
    fn telemetry_and_rf_never_clear_gps() {
        let store = FusionStore::new();
        store.apply_gps_quality(&gps("edge-1", 1_000));
        store.apply_telemetry(&telemetry("edge-1", 2_000));
        let status = store.apply_rf_event(&rf("edge-1", 3_000, vec![]));
        assert!(status.gps_quality.is_some());
    }

    #[test]
    fn rf_event_power_comes_from_first_feature() {
        let store = FusionStore::new();
        store.apply_telemetry(&telemetry("edge-1", 1_000));

        let status = store.apply_rf_event(&rf("edge-1", 2_000, vec![-40.0, -41.0]));
        assert_eq!(status.rf_power_dbm, -40.0);
        assert_eq!(status.battery_v, 3.72);
        assert_eq!(status.anomaly_score, 0.81);

        let status = store.apply_rf_event(&rf("edge-1", 3_000, vec![]));
        assert_eq!(status.rf_power_dbm, -40.0);
    }

    #[test]
    fn first_contact_by_rf_zeroes_health_fields() {
        let store = FusionStore::new();
        let status = store.apply_rf_event(&rf("edge-9", 1_000, vec![-60.0]));
        assert_eq!(status.battery_v, 0.0);
        assert_eq!(status.temp_c, 0.0);
        assert_eq!(status.rf_power_dbm, -60.0);
    }

    #[test]
    fn gps_only_node_has_zeroed_fields() {
        let store = FusionStore::new();
        let status = store.apply_gps_quality(&gps("edge-5", 1_000));
        assert_eq!(status.battery_v, 0.0);
        assert_eq!(status.anomaly_score, 0.0);
        assert!(status.gps_quality.is_some());
        assert_eq!(store.get("edge-5"), Some(status));
    }

    #[test]
    fn late_frame_overwrites_last_seen() {
        let store = FusionStore::new();
        store.apply_telemetry(&telemetry("edge-1", 5_000));
        let status = store.apply_gps_quality(&gps("edge-1", 1_000));
        assert_eq!(status.last_seen, at(1_000));
    }

    #[test]
    fn ensure_does_not_replace_existing() {
        let store = FusionStore::new();
        store.apply_telemetry(&telemetry("edge-1", 1_000));
        assert!(!store.ensure("edge-1", at(9_000)));
        assert_eq!(store.get("edge-1").unwrap().battery_v, 3.72);
        assert!(store.ensure("edge-2", at(9_000)));
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn concurrent_updates_keep_one_snapshot_per_node() {
        let store = Arc::new(FusionStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for n in 0..100 {
                        let node = format!("edge-{}", n % 4);
                        if i % 2 == 0 {
                            store.apply_telemetry(&telemetry(&node, n));
                        } else {
                            store.apply_gps_quality(&gps(&node, n));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 4);
        assert!(store.list().iter().all(|s| s.gps_quality.is_some()));
    }
}
