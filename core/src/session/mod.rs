//! Session lifecycle: the unit binding a conversation, a scene, and a
//! running simulation

pub mod registry;
pub mod service;
pub mod session;

pub use registry::SessionRegistry;
pub use service::{ChatOutcome, SceneService};
pub use session::{HistoryEntry, MessageRole, Session};
