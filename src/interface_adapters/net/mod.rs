// Network adapter modules split by client sockets vs plain HTTP reads.

pub mod client;
pub mod internal;

pub use client::{spawn_session_serializer, ws_handler};
pub use internal::{online_players_handler, session_snapshot_handler};
