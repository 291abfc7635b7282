//! Log collection and forwarding agent.
//!
//! Producers push `(category, message)` records through the listeners in
//! [`server`]; the [`ingest::Ingestor`] validates and parks them on a
//! lease-based queue; the [`dispatch::DispatchEngine`] drains the queue once
//! a second and hands each record to the [`writers`] backend configured for
//! its category; the [`reclaimer::OrphanReclaimer`] returns abandoned leases
//! so delivery stays at-least-once.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod reclaimer;
pub mod record;
pub mod server;
pub mod wire;
pub mod writers;

pub use config::Config;
pub use dispatch::DispatchEngine;
pub use ingest::Ingestor;
pub use reclaimer::OrphanReclaimer;
pub use writers::WriterRegistry;
