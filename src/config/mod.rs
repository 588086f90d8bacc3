mod settings;

pub use settings::{
    ApiConfig, DatabaseConfig, LogConfig, ServerConfig, Settings, StoreConfig, TransportConfig,
};
