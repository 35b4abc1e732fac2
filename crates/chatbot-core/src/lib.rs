pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod state;
pub mod trimmer;
pub mod voice;

// Re-export main types for convenience
pub use client::ChatbotClient;
pub use config::{Config, VoiceConfig};
pub use error::{Error, Result};
pub use session::{CallSession, CallStatus};
pub use state::{ChatMessage, ChatRole};
pub use trimmer::{trim_response, ResponseTrimmer, DEFAULT_MARKERS};
