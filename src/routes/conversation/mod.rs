pub mod add;
pub mod delete;
pub mod duplicate;
pub mod export;
pub mod get;
pub mod messages;
pub mod update;
