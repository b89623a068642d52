pub mod chat;
pub mod enhance;
pub mod enums;
pub mod providers;
