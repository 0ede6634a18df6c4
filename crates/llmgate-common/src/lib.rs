pub mod config;
pub mod error;
pub mod ids;

pub use config::{GlobalConfig, GlobalConfigPatch};
pub use error::{ErrorKind, ProxyError};
pub use ids::new_trace_id;
