//! Configuration handling: connection-string parsing and the env-style
//! alias resolver.

pub mod connection_string;
pub mod resolver;

pub use resolver::ConfigResolver;

use std::time::Duration;

// Pool bounds, sized for low-concurrency agent workloads.
pub const POOL_MIN_CONNECTIONS: u32 = 1;
pub const POOL_MAX_CONNECTIONS: u32 = 5;
pub const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
