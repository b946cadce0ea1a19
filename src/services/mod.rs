pub mod chat_relay;
pub mod preset_registry;
pub mod session_multiplexer;
pub mod sweeper;

pub use chat_relay::{ChatRelay, TurnEvent, TurnOutcome, TurnRequest, TurnState};
pub use preset_registry::{Persona, PresetRegistry};
pub use session_multiplexer::{ServerFrame, SessionMultiplexer, TurnGuard};
pub use sweeper::{ConfigurationPolicy, FixedPolicy, RetentionPolicy, RetentionSweeper};
