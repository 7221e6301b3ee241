pub mod error;
pub mod hub;
pub mod model;
pub mod persistence;
pub mod state;

#[cfg(test)]
mod tests;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_WS_PATH: &str = "/ws";
