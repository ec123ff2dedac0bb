//! File-mutation events.
//!
//! An [`EventPayload`] is the logical record of one mutation. Its canonical
//! byte form (see [`codec`]) is hashed to obtain the event's storage key and
//! signed by the identity that wrote it. A [`SignedEvent`] carries the
//! payload together with that signature and has its own small envelope
//! format for persistence.

pub mod codec;
pub mod signed;

pub use codec::{CreateFile, DeleteFile, EventPayload, EventType};
pub use signed::SignedEvent;
