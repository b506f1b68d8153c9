pub mod config;
pub mod db;
pub mod error;
pub mod globals;
pub mod models;
pub mod tasks;

pub mod server_fns;

#[cfg(test)]
mod test_support;

pub use server_fns::*;
pub use tasks::TaskManager;
