//! janusIAM core library
//!
//! Multi-tenant identity and access management backend built on event
//! sourcing with CQRS: an append-only event store, pure aggregate
//! reducers, a command engine and per-read-model projections.

pub mod aggregate;
pub mod command;
pub mod config;
pub mod crypto;
pub mod db;
pub mod domain;
pub mod error;
pub mod event_store;
pub mod ports;
pub mod projection;
pub mod query;

pub use command::{CommandContext, Commands};
pub use config::Config;
pub use error::{AppResult, Error, ErrorKind};
pub use event_store::{Event, EventCommand, EventFilter, EventStore};
pub use projection::Supervisor;
pub use query::Queries;
