//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the
//! Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  ScoreStore │ DerivedCountProvider │ EventPublisher        │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ InMemoryScoreStore │ InMemoryDerivedCounts                 │ │
//! │  │ LoggingEventPublisher │ InMemoryEventCollector             │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use podium::adapters::InMemoryScoreStore;
//! use podium::engine::LeaderboardEngine;
//!
//! let store = Arc::new(InMemoryScoreStore::from_seed_file("seed.yaml").await?);
//! let engine = LeaderboardEngine::builder(store).build()?;
//! engine.open().await?;
//! ```

mod event_publisher;
mod memory_store;

pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use memory_store::{InMemoryDerivedCounts, InMemoryScoreStore, SeedFile};
