pub mod config;
pub mod guard;
pub mod identity;
pub mod resolver;
pub mod shared;
pub mod store;
pub mod tests;
