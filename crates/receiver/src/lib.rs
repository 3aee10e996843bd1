//! # RF Mesh Receiver
//!
//! Backend que recebe frames dos nós da malha via UDP, funde o status de cada
//! nó, grava eventos, dispara alertas e repassa tudo ao vivo para assinantes
//! conectados via TCP.
//!
//! ## Módulos
//! - [`store`] – Persistência de eventos, alertas, nós e rollups
//! - [`hub`] – Broadcast para assinantes ao vivo
//! - [`ingest`] – Pipeline de ingestão e consultas
//! - [`maintenance`] – Retenção e rollups periódicos
//! - [`net`] – Listeners UDP (frames) e TCP (assinantes)

pub mod store;
pub mod hub;
pub mod ingest;
pub mod maintenance;
pub mod net;

pub use hub::{BroadcastHub, HubMessage};
pub use ingest::{IngestError, IngestService};
pub use maintenance::{MaintenanceError, MaintenanceScheduler};
pub use store::{EventStore, MemoryStore};
