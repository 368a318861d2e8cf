pub mod board;
pub mod cache;
pub mod cli;
pub mod error;
pub mod export;
pub mod gateway;
pub mod logging;
pub mod notification;
pub mod projector;
pub mod reorder;
pub mod session;
pub mod settings;
pub mod types;

#[cfg(test)]
mod test_support;
