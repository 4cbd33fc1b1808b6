//! Scene specification schema and the agent that generates it

pub mod agent;
pub mod schema;

pub use agent::SceneAgent;
pub use schema::{SceneSpec, SceneSummary};
