pub mod assets;
pub mod config;
pub mod error;
pub mod exporter;
pub mod llm;
pub mod logger;
pub mod protocol;
pub mod scene;
pub mod session;
pub mod sim;

// Re-exports for convenience
pub use config::Config;
pub use error::{NeosceneError, Result};
pub use scene::schema::SceneSpec;
pub use session::service::SceneService;
