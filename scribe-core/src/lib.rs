pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod mock;
pub mod models;
pub mod parser;
pub mod status;
pub mod store;
pub mod template;
pub mod vault;

pub use config::ScribeConfig;
pub use error::ScribeError;
pub use generation::{AnthropicClient, AnthropicConfig, GenerationError, TextGenerator};
pub use models::{Capture, GeneratedNote, Template};
pub use parser::{parse_response, ParsedResponse};
pub use status::{CaptureStatus, TransitionError};
pub use store::{CaptureStore, MemoryCaptureStore, PgCaptureStore};
pub use vault::{VaultError, VaultWriter};
