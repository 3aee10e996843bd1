//! # RF Mesh Sender
//!
//! Simula os nós de campo da malha: a cada intervalo gera telemetria, um
//! evento RF e uma amostra GNSS por nó e envia os frames via UDP para o
//! receiver.
//!
//! ## Uso
//! ```bash
//! RFMESH_CONFIG=./config.toml mesh_sender
//! ```

mod simulator;

use anyhow::{Context, bail};
use mesh_core::config::AppConfig;
use simulator::{NodeSimulator, uptime_ms};
use std::net::UdpSocket;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

fn main() -> anyhow::Result<()> {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let sender_cfg = &config.sender;
    if sender_cfg.node_ids.is_empty() {
        bail!("Nenhum nó configurado em [sender].node_ids");
    }
    let interval = Duration::from_secs_f64(sender_cfg.interval_secs.max(0.1));

    // ── Socket UDP ──
    let bind_addr = if sender_cfg.bind_ip.is_empty() {
        "0.0.0.0:0".to_string()
    } else {
        format!("{}:0", sender_cfg.bind_ip)
    };
    let sock = UdpSocket::bind(&bind_addr).with_context(|| format!("Falha ao criar socket UDP em {bind_addr}"))?;
    let dest_addr = format!("{}:{}", sender_cfg.dest_ip, sender_cfg.port);

    let mut sim = NodeSimulator::new(&sender_cfg.node_ids);
    let started = Instant::now();
    info!(nodes = sim.node_count(), "Simulador inicializado");

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   📡 RF MESH SENDER – SIMULADOR ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Destino:   {dest_addr}");
    println!("  Nós:       {}", sender_cfg.node_ids.join(", "));
    println!("  Intervalo: {:.1}s", sender_cfg.interval_secs);
    println!("  Protocolo: frame empacotado v{}", mesh_core::PROTOCOL_VERSION);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    loop {
        let cycle_start = Instant::now();

        match sim.encode_cycle(uptime_ms(started)) {
            Ok(frames) => {
                let mut bytes = 0;
                for frame in &frames {
                    match sock.send_to(frame, &dest_addr) {
                        Ok(sent) => bytes += sent,
                        Err(e) => error!("Erro ao enviar UDP: {e}"),
                    }
                }
                debug!(frames = frames.len(), bytes, "→ {dest_addr}");
            }
            Err(e) => error!("Erro ao serializar frames: {e}"),
        }

        // Dormir pelo tempo restante do intervalo
        let elapsed = cycle_start.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }
}
