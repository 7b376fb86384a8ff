//! GhostMesh Conversational Front End
//!
//! Ties a memory store to a local language model: each turn retrieves the
//! memories closest to the user's words, asks the model for a reply in the
//! ghost's voice, and remembers the exchange.
//!
//! # Components
//!
//! - **Config**: command line arguments resolved into store, embedding and
//!   generation settings
//! - **Generation**: the model behind the ghost, normally `ollama run`
//! - **Session**: one retrieve, generate, remember turn
//! - **Repl**: the interactive loop on stdin/stdout

pub mod config;
pub mod generation;
pub mod repl;
pub mod session;

pub use config::{Args, EmbeddingBackend, GhostConfig};
pub use generation::{GenerationError, GenerationProvider, MockGenerator, OllamaGenerator};
pub use repl::ExitReason;
pub use session::{
    compose_prompt, format_exchange, persona_header, Session, Turn, UnrememberedReply,
};
