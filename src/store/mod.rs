//! User record store - the external owner of profiles and win/loss counters

pub mod memory;
pub mod rest;
pub mod users;

pub use memory::MemoryUserStore;
pub use rest::RestUserStore;
pub use users::{StoreError, UserStore};
