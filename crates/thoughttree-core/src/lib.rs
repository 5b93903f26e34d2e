pub mod config;
pub mod error;
pub mod types;

pub use config::SearchConfig;
pub use error::{Result, ThoughtTreeError};
pub use types::{GenerationConfig, Message, MessageRole};
