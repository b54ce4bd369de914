//! Litharvest Core — shared bibliographic record model.

pub mod models;

pub use models::{CanonicalRecord, DateParseError, PublicationDate, RawRecord};
