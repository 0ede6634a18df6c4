//! Request-path and background orchestration shared by every binary in this
//! workspace: authentication, model resolution, the outbound HTTP client
//! pool, async logging, readiness, and the per-request dispatcher that ties
//! them together.

pub mod auth_cache;
pub mod background;
pub mod client_pool;
pub mod dispatcher;
pub mod logger;
pub mod ready;
pub mod resolver;

pub use auth_cache::{AuthCache, AuthError, extract_presented_key, hash_key};
pub use background::{spawn_log_retention_sweeper, spawn_pricing_refresh, spawn_rate_limiter_sweeper};
pub use client_pool::{ClientPool, ClientPoolConfig, ClientPoolError, UpstreamBody, UpstreamResponse};
pub use dispatcher::{CancelFuture, Dispatch, DispatchBody, DispatchResponse, Dispatcher};
pub use logger::{AsyncLogger, LoggerConfig};
pub use ready::ReadinessProbe;
pub use resolver::{Resolver, ResolverError};
