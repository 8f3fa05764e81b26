//! Request handlers for the wire surface.

pub mod health;
pub mod messages;
pub mod pairing;
pub mod reply;
pub mod webhook;
