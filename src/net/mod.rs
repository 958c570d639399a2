//! RESP wire codec and connection helpers shared by the replication client
//! (talking to a master) and the migration engine (talking to a target).

pub mod connection;
pub mod resp;

pub use connection::Endpoint;
pub use resp::{CommandFrame, Reply};
