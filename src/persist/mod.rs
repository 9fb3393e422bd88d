//! Signals that persist themselves to a key-value store.
//!
//! A [`PersistentCell`] restores its value from the store when created and
//! writes it back on every change. [`persistent_durable`] and
//! [`persistent_session`] pick the process-wide store for the caller.

pub mod codec;

mod cell;
mod error;
mod registry;
mod scoped;

pub use cell::{create_persistent_cell, PersistentCell};
pub use error::PersistError;
pub use registry::{KeyClaim, KeyRegistry};
pub use scoped::{persistent_durable, persistent_session};
