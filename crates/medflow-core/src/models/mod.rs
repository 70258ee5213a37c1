//! Domain models for the MedFlow system.

mod patient;
pub mod presence;
mod record;
mod stored;

pub use patient::*;
pub use presence::{is_sentinel, present, Presence, MISSING};
pub use record::*;
pub use stored::*;
