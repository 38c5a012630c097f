//! CLI command implementations

pub mod config;
pub mod key;
pub mod retrieve;
pub mod store;

pub use config::execute as config;
pub use key::execute as key;
pub use retrieve::execute as retrieve;
pub use store::execute as store;
