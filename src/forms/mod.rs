mod conversation;
mod preset;

pub use conversation::*;
pub use preset::*;
