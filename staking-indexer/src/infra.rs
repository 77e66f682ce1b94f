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

pub mod cache;
pub mod http_aggregator;
pub mod storage;
pub mod subxt_chain;

use serde::Deserialize;
use staking_common::infra::pool;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "node")]
    pub node_config: subxt_chain::Config,

    #[serde(rename = "aggregator")]
    pub aggregator_config: http_aggregator::Config,

    #[serde(rename = "storage")]
    pub storage_config: pool::postgres::Config,

    #[serde(rename = "cache")]
    pub cache_config: cache::Config,
}
