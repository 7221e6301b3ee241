pub mod error;
pub mod logger;
pub mod settings;

#[cfg(test)]
mod tests;
