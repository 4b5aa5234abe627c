//! Modbus/TCP protocol layer for the tank digital twin.
//!
//! Covers the subset of Modbus the scenario needs: function codes 1-5
//! over TCP, a typed frame codec, a register/coil datastore, and small
//! async client/server implementations built on it. Unsupported function
//! codes survive the codec as raw payloads so interposing code can
//! forward them untouched.

pub mod client;
pub mod constants;
pub mod error;
pub mod frame;
pub mod net;
pub mod server;
pub mod store;

pub use client::ModbusTcpClient;
pub use error::{ProtocolError, Result};
pub use frame::{CoilState, Direction, MbapHeader, ModbusAdu, Pdu};
pub use server::{serve, SharedStore};
pub use store::DataStore;
