//! Register polling and tag-binding engine for paper machine PLC acquisition
//!
//! `plcpoll` reads raw byte buffers from a controller's register blocks on a
//! fixed cadence, decodes them into a live reel/winder model according to an
//! external tag table, and turns watched field transitions into downstream
//! roll events exactly once per transition.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │  Tag table   │──►│ Layout builder│──►│ Block layouts│
//! │  (CSV)       │   │ (startup)     │   │ + buffer len │
//! └──────────────┘   └───────────────┘   └──────┬───────┘
//!                                               │ per cycle
//! ┌──────────────┐   ┌───────────────┐   ┌──────▼───────┐
//! │ Reconnect    │◄─►│ Connection    │◄──│ Block poller │
//! │ loop (5 s)   │   │ state         │   │ (1–2 s)      │
//! └──────────────┘   └───────────────┘   └──────┬───────┘
//!                                               │ buffers
//!                    ┌───────────────┐   ┌──────▼───────┐
//!                    │ Change        │◄──│ Model binder │
//!                    │ detector      │   │ + slot list  │
//!                    └──────┬────────┘   └──────────────┘
//!                           │ per-field queues
//!                    ┌──────▼────────┐
//!                    │ Event sink    │
//!                    └───────────────┘
//! ```
//!
//! The engine is a library component: a host process loads the
//! configuration and tag table, provides a [`link::PlcLink`] and an
//! [`events::EventSink`] implementation, and drives the lifecycle through
//! [`engine::PollEngine`] and [`engine::EngineHandle`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plcpoll::{ConversionCatalog, EngineConfig, PollEngine};
//! # struct MyLink;
//! # #[async_trait::async_trait]
//! # impl plcpoll::PlcLink for MyLink {
//! #     async fn connect(&mut self, _: &str, _: u16, _: u16) -> i32 { 0 }
//! #     async fn disconnect(&mut self) {}
//! #     async fn read_block(&mut self, _: u16, _: usize, _: &mut [u8]) -> i32 { 0 }
//! #     fn error_text(&self, code: i32) -> String { format!("{code}") }
//! # }
//! # struct MySink;
//! # #[async_trait::async_trait]
//! # impl plcpoll::EventSink for MySink {
//! #     async fn record_exists(&self, _: &plcpoll::EventKey) -> plcpoll::Result<bool> { Ok(false) }
//! #     async fn append(&self, r: plcpoll::RollRecord) -> plcpoll::Result<plcpoll::RollRecord> { Ok(r) }
//! # }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = EngineConfig::load("config/plcpoll.yaml")?;
//! let tags = plcpoll::load_tag_table("config/tags.csv")?;
//!
//! let engine = PollEngine::new(
//!     config,
//!     &tags,
//!     ConversionCatalog::with_defaults(),
//!     Box::new(MyLink),
//!     Arc::new(MySink),
//! )?;
//!
//! let handle = engine.start();
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod events;
pub mod layout;
pub mod link;
pub mod logging;
pub mod model;
mod poller;

// Re-export the types a host process touches
pub use config::{load_tag_table, EngineConfig, TagRecord};
pub use convert::{ConversionCatalog, TagValue};
pub use engine::{EngineHandle, PollEngine};
pub use error::{PlcPollError, Result};
pub use events::{EventKey, EventKind, EventSink, RollRecord};
pub use layout::{build_layouts, BlockLayout};
pub use link::{ConnectionState, PlcLink};
pub use model::{ReelState, RollSlot};
