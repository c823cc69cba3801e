//! Models module for the ETL
//!
//! Defines the five normalized entities produced by the projector and
//! loaded into the store.

pub mod entity;
pub mod records;

pub use entity::Entity;
pub use records::{ArtistRecord, SongPlayFact, SongRecord, TimeRecord, UserRecord};
