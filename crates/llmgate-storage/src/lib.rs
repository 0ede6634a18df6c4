pub mod crypto;
pub mod model;
pub mod pricing;
pub mod store;

pub use crypto::{AesGcmCrypto, Crypto, CryptoError};
pub use model::{Dialect, LlmKey, LogEntry, ModelRecord, PriceEntry, ResolvedModel, Upstream};
pub use pricing::PricingTracker;
pub use store::{InMemoryStore, Store, StoreError, dialect_label};
