// ABOUTME: Concrete leaf sessions reaching real servers
// ABOUTME: A bridge process per server speaking newline-delimited JSON-RPC over stdio

pub mod bridge;
pub mod protocol;

pub use bridge::{BridgeConnector, BridgeSession};
