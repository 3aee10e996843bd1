//! # RF Mesh Receiver
//!
//! Backend da malha RF: recebe frames via UDP, grava eventos e alertas, e
//! transmite tudo ao vivo para assinantes TCP (JSON por linha).
//!
//! Encerra com Ctrl+C. O ciclo de manutenção em andamento termina antes da
//! saída.

use anyhow::{Context, bail};
use mesh_core::config::AppConfig;
use mesh_receiver::{BroadcastHub, IngestService, MaintenanceScheduler, MemoryStore, net};
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível criar {}: {e}", config_path.display());
        }
    }

    let errors = config.validate();
    if !errors.is_empty() {
        bail!("Configuração inválida: {}", errors.join("; "));
    }
    let rx = config.receiver;

    // ── Pipeline ──
    let store = Arc::new(MemoryStore::new());
    let hub = Arc::new(BroadcastHub::new());
    let service = Arc::new(IngestService::new(store.clone(), hub.clone(), rx.alerts.clone()));
    let scheduler = MaintenanceScheduler::new(store, rx.maintenance.clone(), rx.alerts.gps_interference);

    // ── Rede ──
    let udp_addr = format!("{}:{}", rx.bind_ip, rx.udp_port);
    let socket = UdpSocket::bind(&udp_addr)
        .await
        .with_context(|| format!("Falha ao bind UDP {udp_addr}"))?;
    let tcp_addr = format!("{}:{}", rx.bind_ip, rx.subscriber_port);
    let listener = TcpListener::bind(&tcp_addr)
        .await
        .with_context(|| format!("Falha ao bind TCP {tcp_addr}"))?;

    let cancel = CancellationToken::new();
    let frames = tokio::spawn(net::run_frame_listener(socket, service, cancel.clone()));
    let subscribers = tokio::spawn(net::run_subscriber_listener(
        listener,
        hub,
        rx.subscriber_buffer,
        cancel.clone(),
    ));
    let maintenance = scheduler.spawn(cancel.clone());

    info!("Receiver pronto – Ctrl+C para sair");

    tokio::signal::ctrl_c().await.context("Falha ao instalar handler de Ctrl+C")?;
    info!("Encerrando...");
    cancel.cancel();

    for (name, task) in [("frames", frames), ("assinantes", subscribers), ("manutenção", maintenance)] {
        if let Err(e) = task.await {
            warn!("Task {name} terminou com erro: {e}");
        }
    }

    info!("Receiver encerrado");
    Ok(())
}
