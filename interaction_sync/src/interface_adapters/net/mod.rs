// Network adapter modules split by participant sockets vs operator HTTP routes.

pub mod client;
pub mod internal;

pub use client::ws_handler;
pub use internal::{despawn_object_handler, health_handler, spawn_object_handler};
