pub mod memory_backend;

use std::time::Duration;

use ferry_core::client::ClientOptions;
use ferry_core::retry::RetryPolicy;

/// Client options with millisecond backoff so retry paths stay fast.
pub fn fast_options() -> ClientOptions {
    ClientOptions {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..ClientOptions::default()
    }
}
