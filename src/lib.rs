//! Legal-matter CSV loader and object-query response shaper.
//!
//! A [`MatterStore`] materializes a fixed-schema matter export into a local
//! libSQL table, then answers select-style query text with a
//! [`ResponseEnvelope`] shaped like a remote object-query API response.

pub mod config;
pub mod envelope;
pub mod error;
pub mod record;
pub mod schema;
pub mod seed;
pub mod server;
pub mod statement;
pub mod store;

pub use envelope::{RecordAttributes, RecordView, ResponseEnvelope};
pub use error::{ConfigError, QueryFault, StoreError};
pub use record::MatterRecord;
pub use schema::{MATTER_COLUMNS, MATTER_OBJECT_TYPE, TableSchema};
pub use store::{LoadSummary, MatterStore};
