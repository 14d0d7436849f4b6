// Interface adapters: wire protocol, catalog and network handling.

pub mod catalog;
pub mod http;
pub mod net;
pub mod protocol;
pub mod state;
pub mod utils;
