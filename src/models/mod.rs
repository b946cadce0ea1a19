mod conversation;
mod message;
mod preset;

pub use conversation::*;
pub use message::*;
pub use preset::*;
