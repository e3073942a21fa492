//! taglog-core library.
//!
//! An append-only event log with dynamic consistency boundaries: events carry
//! a type and a set of tags, readers select slices of the log with ad hoc
//! [`Query`] values, and writers guard appends with an [`AppendCondition`]
//! scoped to the same query instead of a fixed stream id.
//!
//! ```
//! use taglog_core::{
//!     AppendCondition, Event, EventData, EventId, EventStore, EventType, EventTypes,
//!     ExpectedHighestSequenceNumber, InMemoryEventStore, Query, ReadOptions,
//! };
//!
//! let mut store = InMemoryEventStore::new();
//! let query = Query::for_event_types(EventTypes::try_from_strings(["UsernameClaimed"])?)?;
//!
//! // Decide on the current slice, then append guarded by what was observed.
//! let seen = store.read(&query, ReadOptions::backwards()).next().map(|e| e.position);
//! let condition = AppendCondition::new(query, ExpectedHighestSequenceNumber::from_position(seen));
//! let event = Event::new(
//!     EventId::new("3f1c")?,
//!     EventType::new("UsernameClaimed")?,
//!     EventData::new(r#"{"username":"ada"}"#),
//! );
//! store.append(event.into(), Some(condition))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums for library failures, each with an
//!   [`ErrorCode`]; `anyhow::Result` for config loading.
//! - **Logging**: `tracing` macros (`debug!`, `warn!`, `trace!`). The library
//!   never installs a subscriber.

pub mod append;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod position;
pub mod query;
pub mod store;
pub mod tag;

pub use append::AppendCondition;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{StoreConfig, load_store_config};
pub use error::{AppendError, ConditionalAppendFailed, ErrorCode, SerializationError, ValidationError};
pub use event::{Event, EventData, EventId, EventMetadata, EventType, EventTypes, Events, SequencedEvent};
pub use position::{ExpectedHighestSequenceNumber, SequencePosition};
pub use query::{Criteria, Criterion, Query};
pub use store::{EventStore, EventStream, InMemoryEventStore, ReadOptions};
pub use tag::{Tag, Tags};
