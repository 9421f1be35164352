//! Domain Layer
//!
//! Value objects, ports and events for the ranking engine.
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for the Score Store, the
//!   derived-count provider and event publishing
//! - **Events** (`events.rs`) - Domain events for audit and decoupling
//!
//! # Usage
//!
//! ```ignore
//! use podium::domain::ports::{EntityId, ScoreStore};
//!
//! async fn current_score<S: ScoreStore>(store: &S, id: &EntityId) -> Result<Option<u64>> {
//!     Ok(store.get_score_record(id).await?.map(|r| r.score))
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::{DomainEvent, InvalidationReason};
pub use ports::{
    DerivedCountProvider, DerivedCounts, EntityId, EventPublisher, ScoreRecord, ScoreRecordStream,
    ScoreStore,
};
