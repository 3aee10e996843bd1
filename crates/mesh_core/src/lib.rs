//! # Mesh Core
//!
//! Crate compartilhada entre o backend (`mesh_receiver`) e o simulador de
//! nós (`mesh_sender`): protocolo binário do enlace mesh, registros do
//! pipeline, configuração TOML, regras de alerta e fusão de status por nó.
//!
//! ## Módulos
//! - [`types`] – Registros ingeridos, status, alertas e rollups
//! - [`protocol`] – Encode/decode dos frames empacotados do firmware
//! - [`config`] – Configuração unificada via TOML
//! - [`alerts`] – Thresholds de anomalia e interferência GNSS
//! - [`fusion`] – Snapshot mutável por nó com campos "sticky"

pub mod types;
pub mod protocol;
pub mod config;
pub mod alerts;
pub mod fusion;

// Re-exports convenientes
pub use config::{AppConfig, ReceiverConfig, SenderConfig};
pub use fusion::FusionStore;
pub use protocol::{decode_frame, encode_frame, Frame, FrameHeader, Payload, PROTOCOL_VERSION};
