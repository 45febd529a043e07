//! Shared test setup: a single `env_logger` init, matching the teacher
//! codebase's `INIT.call_once(init_log)` convention from its old
//! `#[cfg(test)] mod tests` blocks.

use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_log() {
    INIT.call_once(|| {
        env_logger::Builder::from_default_env()
            .format_timestamp_millis()
            .is_test(true)
            .try_init()
            .ok();
    });
}
