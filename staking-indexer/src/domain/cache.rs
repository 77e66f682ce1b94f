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

use crate::domain::Era;
use derive_more::Display;
use log::{debug, warn};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use staking_common::error::{BoxError, StdErrorExt};
use thiserror::Error;

/// Attribute of a cached value holding the era it was computed for.
pub const ERA_ATTRIBUTE: &str = "activeEra";

/// Key-value store for cached JSON values.
#[trait_variant::make(Send)]
pub trait CacheBackend
where
    Self: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError>;
}

/// Names of the cached data sets.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    #[display("valid")]
    Valid,

    #[display("nominators")]
    Nominators,

    #[display("validatorDetail")]
    ValidatorDetail,

    #[display("chainNominators")]
    ChainNominators,
}

/// Cache whose entries are valid for exactly the era they were computed for.
#[derive(Debug, Clone)]
pub struct SnapshotCache<B> {
    backend: B,
}

impl<B> SnapshotCache<B>
where
    B: CacheBackend,
{
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Return the cached value for the given key if it was computed for the given era. Missing,
    /// unreadable or undecodable entries are treated as absent.
    pub async fn fetch<T>(&self, era: Era, key: CacheKey) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let key = key.to_string();

        let value = match self.backend.get(&key).await {
            Ok(value) => value?,
            Err(error) => {
                warn!(error = error.as_chain(), key; "cannot read cache entry");
                return None;
            }
        };

        let cached_era = value.get(ERA_ATTRIBUTE).and_then(era_of);
        if cached_era != Some(era) {
            debug!(key, era, cached_era:?; "cache entry outdated");
            return None;
        }

        serde_json::from_value(value)
            .inspect_err(|error| warn!(error:%, key; "cannot decode cache entry"))
            .ok()
    }

    /// Replace the entry for the given key. The value must carry its era as `activeEra`.
    pub async fn update<T>(&self, key: CacheKey, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let value = serde_json::to_value(value).map_err(|error| CacheError::Encode(error.into()))?;
        if value.get(ERA_ATTRIBUTE).and_then(era_of).is_none() {
            return Err(CacheError::MissingEra);
        }

        self.backend.set(&key.to_string(), value).await
    }
}

/// Normalize an era stored either as a number or as a numeric string.
fn era_of(value: &Value) -> Option<Era> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| Era::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cannot access cache store")]
    Io(#[from] std::io::Error),

    #[error("cannot encode cache entry")]
    Encode(#[source] BoxError),

    #[error("cannot decode cache entry")]
    Decode(#[source] BoxError),

    #[error("cached value has no {ERA_ATTRIBUTE} attribute")]
    MissingEra,
}
