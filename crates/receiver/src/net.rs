//! Listeners de rede: frames dos nós via UDP e assinantes ao vivo via TCP.
//!
//! Cada datagrama vira uma task própria, então frames de nós diferentes são
//! processados em paralelo. Cada assinante TCP recebe as mensagens do hub
//! como JSON, uma por linha.

use crate::hub::{BroadcastHub, ChannelSubscriber, HubMessage, SubscriberId};
use crate::ingest::IngestService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Maior datagrama UDP possível.
const MAX_DATAGRAM: usize = 65_536;

// ──────────────────────────────────────────────
// Frames (UDP)
// ──────────────────────────────────────────────

/// Recebe datagramas até `cancel` e entrega cada um ao serviço de ingestão.
///
/// Frames inválidos e falhas de persistência são logados e descartados; o
/// listener nunca para por causa de um frame.
pub async fn run_frame_listener(socket: UdpSocket, service: Arc<IngestService>, cancel: CancellationToken) {
    if let Ok(addr) = socket.local_addr() {
        info!("Frames: escutando UDP em {addr}");
    }

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (size, source) = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(v) => v,
                Err(e) => {
                    warn!("Erro ao receber UDP: {e}");
                    continue;
                }
            },
        };

        let data = buf[..size].to_vec();
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            if let Err(e) = service.ingest_frame(&data).await {
                debug!(%source, size, "Frame descartado: {e}");
            }
        });
    }

    info!("Frames: listener encerrado");
}

// ──────────────────────────────────────────────
// Assinantes (TCP)
// ──────────────────────────────────────────────

/// Aceita conexões até `cancel`. Cada conexão vira um assinante do hub com
/// buffer de `buffer` mensagens; quem não drena o buffer a tempo é removido.
pub async fn run_subscriber_listener(
    listener: TcpListener,
    hub: Arc<BroadcastHub>,
    buffer: usize,
    cancel: CancellationToken,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("Assinantes: escutando TCP em {addr}");
    }

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(v) => v,
                Err(e) => {
                    warn!("Erro ao aceitar conexão: {e}");
                    continue;
                }
            },
        };

        let (subscriber, rx) = ChannelSubscriber::new(buffer);
        let id = hub.connect(Arc::new(subscriber));
        info!(subscriber = id, %peer, "Assinante conectado");

        let (reader, writer) = stream.into_split();
        tokio::spawn(serve_subscriber(
            id,
            peer,
            reader,
            writer,
            rx,
            Arc::clone(&hub),
            cancel.child_token(),
        ));
    }

    info!("Assinantes: listener encerrado");
}

async fn serve_subscriber(
    id: SubscriberId,
    peer: SocketAddr,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    rx: mpsc::Receiver<HubMessage>,
    hub: Arc<BroadcastHub>,
    cancel: CancellationToken,
) {
    if let Err(e) = pump(reader, writer, rx, &cancel).await {
        debug!(subscriber = id, %peer, "Conexão encerrada com erro: {e}");
    }
    // O hub pode já ter removido o assinante por falha de entrega.
    hub.disconnect(id);
    info!(subscriber = id, %peer, "Assinante saiu");
}

/// Escreve as mensagens do channel como JSON lines até o cliente fechar, o
/// hub descartar o assinante ou `cancel` disparar.
async fn pump(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<HubMessage>,
    cancel: &CancellationToken,
) -> std::io::Result<()> {
    // O cliente não manda nada útil; a leitura só serve para notar o EOF.
    let mut scratch = [0u8; 256];
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = reader.read(&mut scratch) => {
                if read? == 0 {
                    return Ok(());
                }
                continue;
            }
            next = rx.recv() => match next {
                Some(m) => m,
                None => return Ok(()),
            },
        };

        let mut line = message.to_json().map_err(std::io::Error::other)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
    }
}
