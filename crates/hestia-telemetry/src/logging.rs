// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logger installation for binaries embedding the function manager.
//!
//! Library code only logs through the `log` facade; installing a logger is
//! left to the host process.

use env_logger::{Builder, Env};

/// Installs an `env_logger` honouring `RUST_LOG`, falling back to
/// `default_filter` (for example `"info"` or `"hestia_control=debug"`).
///
/// Returns `false` when a logger was already installed.
pub fn init(default_filter: &str) -> bool {
    Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}

/// Installs a logger suited to tests. Safe to call from every test.
pub fn init_for_tests() {
    let _ = Builder::from_env(Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_refused() {
        init_for_tests();
        assert!(!init("info"));
        log::info!("logger still usable");
    }
}
