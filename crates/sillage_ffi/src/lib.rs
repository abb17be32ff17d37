//! Flutter-facing bindings for the sillage engine.

pub mod api;
