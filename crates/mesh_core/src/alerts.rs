//! Motor de alertas – avaliação de thresholds sobre eventos ingeridos.
//!
//! Funções puras: não há janela de deduplicação, cada evento que cruza o
//! limiar gera o seu próprio alerta.

use crate::config::AlertThresholds;
use crate::types::{AlertKind, GpsSample, NewAlert, RfEventRecord, Severity, TelemetryRecord, Timestamp};

/// Severidade para um score de anomalia, ou `None` abaixo do limiar médio.
pub fn level_for_score(score: f32, thresholds: &AlertThresholds) -> Option<Severity> {
    if score >= thresholds.rf_high {
        Some(Severity::High)
    } else if score >= thresholds.rf_medium {
        Some(Severity::Med)
    } else {
        None
    }
}

/// Avalia uma amostra de telemetria.
pub fn evaluate_telemetry(record: &TelemetryRecord, thresholds: &AlertThresholds) -> Option<NewAlert> {
    anomaly_alert(&record.node_id, record.anomaly_score, record.timestamp, thresholds)
}

/// Avalia um evento RF.
pub fn evaluate_rf_event(event: &RfEventRecord, thresholds: &AlertThresholds) -> Option<NewAlert> {
    anomaly_alert(&event.node_id, event.anomaly_score, event.timestamp, thresholds)
}

/// Avalia uma amostra GNSS. Jamming vence só quando estritamente maior que
/// spoofing.
pub fn evaluate_gps(sample: &GpsSample, thresholds: &AlertThresholds) -> Option<NewAlert> {
    if !sample.is_interference(thresholds.gps_interference) {
        return None;
    }

    let kind = if sample.jamming_indicator > sample.spoof_indicator {
        AlertKind::GpsJam
    } else {
        AlertKind::GpsSpoof
    };

    Some(NewAlert {
        node_ids: vec![sample.node_id.clone()],
        kind,
        severity: Severity::High,
        message: format!(
            "GNSS interference detected (jam {:.2}, spoof {:.2})",
            sample.jamming_indicator, sample.spoof_indicator
        ),
        created_at: sample.timestamp,
    })
}

fn anomaly_alert(
    node_id: &str,
    score: f32,
    timestamp: Timestamp,
    thresholds: &AlertThresholds,
) -> Option<NewAlert> {
    let severity = level_for_score(score, thresholds)?;
    Some(NewAlert {
        node_ids: vec![node_id.to_string()],
        kind: AlertKind::RfAnomaly,
        severity,
        message: format!("Anomaly score {score:.2}"),
        created_at: timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn rf(score: f32) -> RfEventRecord {
        RfEventRecord {
            node_id: "edge-2".into(),
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            band_id: "915mhz".into(),
            center_freq_hz: 915.0e6,
            bin_width_hz: 12_500.0,
            anomaly_score: score,
            features: vec![-48.0],
        }
    }

    fn gps(jam: f32, spoof: f32) -> GpsSample {
        GpsSample {
            node_id: "edge-3".into(),
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            num_sats: 4,
            snr_avg: 22.0,
            hdop: 3.1,
            valid_fix: false,
            jamming_indicator: jam,
            spoof_indicator: spoof,
        }
    }

    #[test]
    fn anomaly_boundaries() {
        let t = AlertThresholds::default();
        assert_eq!(evaluate_rf_event(&rf(0.79), &t), None);
        assert_eq!(evaluate_rf_event(&rf(0.8), &t).unwrap().severity, Severity::Med);
        assert_eq!(evaluate_rf_event(&rf(0.94), &t).unwrap().severity, Severity::Med);
        assert_eq!(evaluate_rf_event(&rf(0.95), &t).unwrap().severity, Severity::High);
        assert_eq!(evaluate_rf_event(&rf(1.0), &t).unwrap().severity, Severity::High);
    }

    #[test]
    fn alert_carries_origin_node_and_event_time() {
        let event = rf(0.97);
        let alert = evaluate_rf_event(&event, &AlertThresholds::default()).unwrap();
        assert_eq!(alert.node_ids, vec!["edge-2".to_string()]);
        assert_eq!(alert.created_at, event.timestamp);
        assert_eq!(alert.kind, AlertKind::RfAnomaly);
    }

    #[test]
    fn telemetry_uses_same_scale() {
        let record = TelemetryRecord {
            node_id: "edge-1".into(),
            timestamp: DateTime::from_timestamp_millis(0).unwrap(),
            rf_power_dbm: -50.0,
            battery_v: 3.9,
            temp_c: 30.0,
            anomaly_score: 0.96,
        };
        let alert = evaluate_telemetry(&record, &AlertThresholds::default()).unwrap();
        assert_eq!(alert.severity, Severity::High);
    }

    #[test]
    fn jamming_dominant_is_gps_jam() {
        let alert = evaluate_gps(&gps(0.6, 0.3), &AlertThresholds::default()).unwrap();
        assert_eq!(alert.kind, AlertKind::GpsJam);
        assert_eq!(alert.severity, Severity::High);
    }

    #[test]
    fn spoof_wins_ties() {
        let alert = evaluate_gps(&gps(0.7, 0.7), &AlertThresholds::default()).unwrap();
        assert_eq!(alert.kind, AlertKind::GpsSpoof);
        let alert = evaluate_gps(&gps(0.2, 0.9), &AlertThresholds::default()).unwrap();
        assert_eq!(alert.kind, AlertKind::GpsSpoof);
    }

    #[test]
    fn quiet_gps_has_no_alert() {
        assert_eq!(evaluate_gps(&gps(0.5, 0.5), &AlertThresholds::default()), None);
    }
}
