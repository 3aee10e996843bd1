//! Configuração unificada via TOML.
//!
//! Um único `config.toml` serve o simulador (`[sender]`) e o backend
//! (`[receiver]`). Campos ausentes assumem o valor padrão.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Variável de ambiente que sobrepõe o caminho do config.
pub const CONFIG_ENV: &str = "RFMESH_CONFIG";

/// Configuração do simulador de nós de campo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// IP do backend
    pub dest_ip: String,
    /// Porta UDP do backend
    pub port: u16,
    /// Intervalo entre rodadas de frames (segundos)
    pub interval_secs: f64,
    /// Nós simulados
    pub node_ids: Vec<String>,
    /// IP local para bind (vazio = auto)
    pub bind_ip: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            dest_ip: "127.0.0.1".into(),
            port: 5600,
            interval_secs: 2.0,
            node_ids: vec!["edge-1".into(), "edge-2".into(), "gw-1".into()],
            bind_ip: String::new(),
        }
    }
}

/// Limiares do motor de alertas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Score de anomalia a partir do qual o alerta é `med`
    pub rf_medium: f32,
    /// Score de anomalia a partir do qual o alerta é `high`
    pub rf_high: f32,
    /// Indicador de jamming/spoofing acima do qual há interferência GNSS
    pub gps_interference: f32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            rf_medium: 0.8,
            rf_high: 0.95,
            gps_interference: 0.5,
        }
    }
}

/// Maior intervalo aceito entre ciclos de manutenção (1 semana).
pub const MAX_MAINTENANCE_INTERVAL_SECS: u64 = 7 * 24 * 3600;
/// Maior retenção aceita (10 anos).
pub const MAX_RETENTION_DAYS: u32 = 3650;
/// Maior janela de rollup aceita (1 ano).
pub const MAX_ROLLUP_WINDOW_HOURS: u32 = 24 * 365;

/// Ciclo de retenção e rollups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub interval_secs: u64,
    pub retention_days: u32,
    pub rollup_window_hours: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            retention_days: 7,
            rollup_window_hours: 24,
        }
    }
}

impl MaintenanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn rollup_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.rollup_window_hours))
    }
}

/// Configuração do backend de ingestão.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// IP para bind dos listeners
    pub bind_ip: String,
    /// Porta UDP onde chegam os frames do gateway
    pub udp_port: u16,
    /// Porta TCP do stream de eventos (JSON por linha)
    pub subscriber_port: u16,
    /// Mensagens pendentes por assinante antes de desconectá-lo
    pub subscriber_buffer: usize,
    pub alerts: AlertThresholds,
    pub maintenance: MaintenanceConfig,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".into(),
            udp_port: 5600,
            subscriber_port: 5601,
            subscriber_buffer: 256,
            alerts: AlertThresholds::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

/// Configuração raiz (simulador + backend).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sender: SenderConfig,
    pub receiver: ReceiverConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Caminho do config: `$RFMESH_CONFIG` ou `config.toml` ao lado do executável.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.sender.port == 0 {
            errors.push("Porta do sender não pode ser 0".into());
        }
        if self.sender.interval_secs < 0.1 || self.sender.interval_secs > 3600.0 {
            errors.push(format!(
                "Intervalo do sender inválido: {} (0.1–3600.0)",
                self.sender.interval_secs
            ));
        }

        let rx = &self.receiver;
        if rx.udp_port == 0 || rx.subscriber_port == 0 {
            errors.push("Portas do receiver não podem ser 0".into());
        }
        if rx.udp_port == rx.subscriber_port {
            errors.push(format!("udp_port e subscriber_port iguais ({})", rx.udp_port));
        }
        if rx.subscriber_buffer == 0 {
            errors.push("subscriber_buffer deve ser > 0".into());
        }

        let a = &rx.alerts;
        if !(0.0..=1.0).contains(&a.rf_medium) || !(0.0..=1.0).contains(&a.rf_high) {
            errors.push("Limiares de anomalia devem estar em 0–1".into());
        }
        if a.rf_medium > a.rf_high {
            errors.push(format!(
                "rf_medium ({}) maior que rf_high ({})",
                a.rf_medium, a.rf_high
            ));
        }

        let m = &rx.maintenance;
        if m.interval_secs == 0 || m.interval_secs > MAX_MAINTENANCE_INTERVAL_SECS {
            errors.push(format!(
                "Intervalo de manutenção inválido: {} (1–{MAX_MAINTENANCE_INTERVAL_SECS})",
                m.interval_secs
            ));
        }
        if m.retention_days == 0 || m.retention_days > MAX_RETENTION_DAYS {
            errors.push(format!(
                "retention_days inválido: {} (1–{MAX_RETENTION_DAYS})",
                m.retention_days
            ));
        }
        if m.rollup_window_hours == 0 || m.rollup_window_hours > MAX_ROLLUP_WINDOW_HOURS {
            errors.push(format!(
                "rollup_window_hours inválido: {} (1–{MAX_ROLLUP_WINDOW_HOURS})",
                m.rollup_window_hours
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.sender.port, parsed.sender.port);
        assert_eq!(config.receiver.alerts.rf_high, parsed.receiver.alerts.rf_high);
        assert_eq!(config.sender.node_ids, parsed.sender.node_ids);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[receiver.maintenance]
retention_days = 30
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.receiver.maintenance.retention_days, 30);
        // Outros campos devem ter valor padrão
        assert_eq!(config.receiver.maintenance.interval_secs, 3600);
        assert_eq!(config.receiver.alerts.rf_medium, 0.8);
        assert_eq!(config.receiver.udp_port, 5600);
    }

    #[test]
    fn inverted_thresholds_are_reported() {
        let mut config = AppConfig::default();
        config.receiver.alerts.rf_medium = 0.99;
        let errors = config.validate();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].contains("rf_medium"));
    }

    #[test]
    fn maintenance_durations() {
        let m = MaintenanceConfig::default();
        assert_eq!(m.interval(), Duration::from_secs(3600));
        assert_eq!(m.retention(), chrono::Duration::days(7));
        assert_eq!(m.rollup_window(), chrono::Duration::hours(24));
    }

    #[test]
    fn oversized_maintenance_windows_are_reported() {
        let mut config = AppConfig::default();
        config.receiver.maintenance.retention_days = u32::MAX;
        config.receiver.maintenance.rollup_window_hours = u32::MAX;
        config.receiver.maintenance.interval_secs = u64::MAX;
        let errors = config.validate();
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("retention_days")));
        assert!(errors.iter().any(|e| e.contains("rollup_window_hours")));

        config.receiver.maintenance = MaintenanceConfig {
            interval_secs: MAX_MAINTENANCE_INTERVAL_SECS,
            retention_days: MAX_RETENTION_DAYS,
            rollup_window_hours: MAX_ROLLUP_WINDOW_HOURS,
        };
        assert!(config.validate().is_empty());
    }
}
