// Network adapter modules split by participant sockets vs HTTP management routes.

pub mod client;
pub mod internal;

pub use client::{spawn_table_serializers, ws_handler};
pub use internal::create_table_handler;
