pub mod config_store;
pub mod fallback_store;
pub mod schema;

pub use config_store::ConfigStore;
pub use fallback_store::FallbackStore;
