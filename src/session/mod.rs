//! Wizard session: stage, collected fields, entry flag and start time,
//! persisted through an injected port.

pub mod port;
pub mod stage;
pub mod store;

pub use port::{FilePort, MemoryPort, SessionPort};
pub use stage::Stage;
pub use store::{Fields, Session, SessionKeys, SessionStore};
