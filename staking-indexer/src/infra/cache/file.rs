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

use crate::domain::cache::{CacheBackend, CacheError};
use log::debug;
use serde_json::Value;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, sync::Mutex};

/// [CacheBackend] implementation storing one JSON file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Arc::new(dir.into()),
            write_lock: Default::default(),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl CacheBackend for FileCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let path = self.path(key);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path:? = path; "no cache file");
                return Ok(None);
            }
            Err(error) => return Err(error.into()),
        };

        let value =
            serde_json::from_slice(&bytes).map_err(|error| CacheError::Decode(error.into()))?;
        Ok(Some(value))
    }

    /// Write to a temporary file first and rename it, so readers never see a partial entry.
    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&value).map_err(|error| CacheError::Encode(error.into()))?;

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(self.dir.as_path()).await?;
        let path = self.path(key);
        let tmp_path = tmp_path(&path);
        fs::write(&tmp_path, bytes).await?;
        fs::rename(&tmp_path, &path).await?;

        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}
