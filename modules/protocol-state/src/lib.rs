//! Single-use protocol state.
//!
//! The stores whose correctness underpins the OAuth surface: pushed
//! authorization requests and authorization codes are consume-once keys,
//! refresh tokens rotate in families with reuse detection. Each key has
//! exactly one owner (a shard mutex); `consume` is one exclusive critical
//! section, so concurrent consumers produce exactly one winner.

pub mod config;
pub mod domain;

pub use config::ProtocolStateConfig;
pub use domain::codes::AuthCodeStore;
pub use domain::error::{RotationError, SingleUseError};
pub use domain::journal::{KvJournal, MemoryJournal, StateEvent, StateJournal};
pub use domain::model::{AuthCode, ParRequest, RefreshToken, StoreHealth};
pub use domain::par::ParStore;
pub use domain::rotation::RotationStore;
pub use domain::single_use::SingleUseStore;
