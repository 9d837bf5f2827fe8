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

use crate::config::ConfigError;
use hestia_core::{PersistenceError, RegistryError};
use thiserror::Error;

/// Errors raised while opening, starting or shutting down a
/// [`FunctionManager`](crate::FunctionManager).
#[derive(Debug, Error)]
pub enum HestiaError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to spawn background task: {0}")]
    Spawn(#[from] std::io::Error),
}
