//! External service connectors
//!
//! The model server is reached only through the `ModelConnector` trait so the
//! chat relay can be exercised without HTTP.

pub mod errors;
pub mod model_server;

pub use errors::ConnectorError;
pub use model_server::{
    ChunkStream, LmStudioClient, ModelConnector, PromptMessage, StreamChunk,
};
#[cfg(test)]
pub use model_server::{ScriptStep, ScriptedModel};
