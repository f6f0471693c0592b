pub mod chat;
pub mod gateway;
pub mod poll;
mod wire;
