pub mod chat;
pub mod conversation;
pub mod health_checks;
pub mod preset;
pub mod statistics;

pub use health_checks::*;
