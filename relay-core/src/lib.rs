pub mod config;
pub mod context;
pub mod error;
pub mod store;
pub mod types;

pub use config::Config;
pub use context::RelayContext;
pub use error::{RelayError, Result};
pub use store::{PaginatedUserTokens, Store};
