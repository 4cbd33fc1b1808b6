//! Structured error types for Neoscene
//!
//! One taxonomy for the whole crate: session lookup, scene generation and
//! validation, scene build/export, and simulation runtime faults.

use std::time::Duration;
use thiserror::Error;

/// Primary error type for Neoscene operations
#[derive(Error, Debug)]
pub enum NeosceneError {
    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Session not found (unknown or evicted id)
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// Session evicted for inactivity
    #[error("session expired: {session_id}")]
    SessionExpired { session_id: String },

    // =========================================================================
    // Scene Generation / Validation Errors
    // =========================================================================
    /// LLM call failed (network, quota, provider fault)
    #[error("llm error ({provider}): {message}")]
    Llm { provider: String, message: String },

    /// Generated text could not be parsed/validated into a scene
    #[error("scene validation failed: {message}")]
    SceneValidation {
        message: String,
        errors: Vec<String>,
        raw_preview: Option<String>,
    },

    /// Asset id referenced by a scene is not in the catalog
    #[error("asset not found: '{asset_id}'")]
    AssetNotFound {
        asset_id: String,
        suggestions: Vec<String>,
    },

    /// Scene-to-backend translation failed
    #[error("scene build failed: {message}")]
    SceneBuild {
        message: String,
        asset_id: Option<String>,
    },

    /// A layout could not place its objects
    #[error("layout error ({layout_type}): {message}")]
    Layout {
        layout_type: String,
        message: String,
    },

    // =========================================================================
    // Simulation Runtime Errors
    // =========================================================================
    /// Backend faulted mid-run; the session stays addressable
    #[error("simulation degraded: {reason}")]
    SimulationDegraded { reason: String },

    /// Expected transient condition: no handle, unknown camera, no frame yet
    #[error("render unavailable: {reason}")]
    RenderUnavailable { reason: String },

    /// Backend fault while rendering
    #[error("render failed: {reason}")]
    RenderFailed { reason: String },

    // =========================================================================
    // Configuration / Input Errors
    // =========================================================================
    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Invalid user input
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    // =========================================================================
    // External Error Wrappers
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),
}

impl NeosceneError {
    /// Check if error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Llm { .. } => true,
            Self::RenderUnavailable { .. } => true,

            Self::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),

            Self::SessionNotFound { .. }
            | Self::SessionExpired { .. }
            | Self::SceneValidation { .. }
            | Self::AssetNotFound { .. }
            | Self::SceneBuild { .. }
            | Self::Layout { .. }
            | Self::SimulationDegraded { .. }
            | Self::RenderFailed { .. }
            | Self::InvalidConfig { .. }
            | Self::InvalidInput { .. }
            | Self::Json { .. } => false,
        }
    }

    /// Get suggested retry delay for retryable errors
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::Llm { .. } => Some(Duration::from_secs(3)),
            Self::RenderUnavailable { .. } => Some(Duration::from_millis(500)),
            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::SessionNotFound { .. } | Self::SessionExpired { .. } => {
                "Session not found. Please start a new session.".to_string()
            }
            Self::Llm { .. } => {
                "The scene generator is unavailable right now. Please try again.".to_string()
            }
            Self::SceneValidation { errors, .. } => {
                if errors.is_empty() {
                    "I could not turn that into a valid scene. Try rephrasing.".to_string()
                } else {
                    format!(
                        "I could not turn that into a valid scene ({} issue(s)). Try rephrasing.",
                        errors.len()
                    )
                }
            }
            Self::AssetNotFound {
                asset_id,
                suggestions,
            } => {
                if suggestions.is_empty() {
                    format!("No asset named '{}' is available.", asset_id)
                } else {
                    format!(
                        "No asset named '{}' is available. Did you mean: {}?",
                        asset_id,
                        suggestions[..suggestions.len().min(3)].join(", ")
                    )
                }
            }
            Self::SceneBuild { .. } => {
                "The scene could not be built for simulation. The previous scene is still running."
                    .to_string()
            }
            Self::SimulationDegraded { .. } => {
                "The simulation stopped unexpectedly. Send a new message to rebuild the scene."
                    .to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Short machine-readable code for wire protocol error events
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound { .. } => "session_not_found",
            Self::SessionExpired { .. } => "session_expired",
            Self::Llm { .. } => "llm_error",
            Self::SceneValidation { .. } => "scene_validation",
            Self::AssetNotFound { .. } => "asset_not_found",
            Self::SceneBuild { .. } => "scene_build",
            Self::Layout { .. } => "layout_error",
            Self::SimulationDegraded { .. } => "simulation_degraded",
            Self::RenderUnavailable { .. } => "render_unavailable",
            Self::RenderFailed { .. } => "render_failed",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }
}

/// Convert from serde_json::Error to NeosceneError
impl From<serde_json::Error> for NeosceneError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias using NeosceneError
pub type Result<T> = std::result::Result<T, NeosceneError>;
