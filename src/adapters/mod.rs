// Adapters layer: concrete implementations of the directory ports and the HTTP boundary.

pub mod http;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;
