// This file is part of staking-indexer.
// Copyright (C) 2025 Staking Indexer Contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod file;
pub mod in_mem;

use crate::{
    domain::cache::{CacheBackend, CacheError},
    infra::cache::{file::FileCache, in_mem::InMemCache},
};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

/// Cache backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum Config {
    InMem,
    File { path: PathBuf },
}

/// The [CacheBackend] selected by [Config].
#[derive(Debug, Clone)]
pub enum AnyCache {
    InMem(InMemCache),
    File(FileCache),
}

impl AnyCache {
    pub fn new(config: Config) -> Self {
        match config {
            Config::InMem => Self::InMem(InMemCache::default()),
            Config::File { path } => Self::File(FileCache::new(path)),
        }
    }
}

impl CacheBackend for AnyCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        match self {
            Self::InMem(cache) => cache.get(key).await,
            Self::File(cache) => cache.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        match self {
            Self::InMem(cache) => cache.set(key, value).await,
            Self::File(cache) => cache.set(key, value).await,
        }
    }
}
