mod client;
mod config;
mod coordinator;
mod device;
mod diff;
mod error;
mod home;
mod logger;
mod protocol;
mod scheduler;
mod types;

pub use client::{ApiSession, ApiSessionBuilder, DEFAULT_TIMEOUT};
pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorBuilder, RefreshOutcome, SharedHome};
pub use device::{
    Device, DeviceKind, DeviceType, OnOff, Radiator, Unknown, WRITABLE_MODES, decode_mode, encode_mode,
};
pub use error::{Error, Result};
pub use home::{Home, User, family_code};
pub use logger::MessageLogMode;
pub use protocol::{ApiResult, ApiStatus, DEFAULT_HOST, DEFAULT_LANG, password_hash};
pub use scheduler::{
    Clock, ManualClock, PollDecision, PollScheduler, PollState, SchedulerConfig, SystemClock,
};
pub use types::*;
