pub mod credentials;
pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, load_config_with};
pub use schema::{BackendConfig, Config, GatewayConfig, StoreConfig, SyncConfig, WhatsAppConfig};
