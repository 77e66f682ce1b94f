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

pub mod collector;
pub mod query;
pub mod scheduler;

use crate::{
    application::{
        collector::SnapshotCollector,
        query::QueryService,
        scheduler::{CycleReport, FireOutcome, IngestionScheduler},
    },
    domain::{
        Era,
        aggregator::Aggregator,
        apy::ApyCalculator,
        cache::{CacheBackend, SnapshotCache},
        chain::Chain,
        era_resolver,
        repository::NominationRepository,
        storage::Storage,
    },
};
use log::{debug, info, warn};
use serde::Deserialize;
use std::time::Duration;
use tokio::{
    select,
    signal::unix::Signal,
    time::{MissedTickBehavior, interval},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "eras_per_year_default")]
    pub eras_per_year: u32,

    #[serde(flatten)]
    pub era_resolver_config: era_resolver::Config,

    pub page_size_limit: u32,
}

pub async fn run(
    config: Config,
    chain: impl Chain,
    aggregator: impl Aggregator,
    storage: impl Storage,
    cache: impl CacheBackend,
    mut sigterm: Signal,
) -> anyhow::Result<()> {
    let Config {
        interval: fire_interval,
        eras_per_year,
        era_resolver_config,
        page_size_limit,
    } = config;

    let collector = SnapshotCollector::new(chain, aggregator, era_resolver_config);
    let repository = NominationRepository::new(storage);
    let cache = SnapshotCache::new(cache);
    let scheduler = IngestionScheduler::new(
        collector.clone(),
        repository.clone(),
        cache.clone(),
        ApyCalculator::new(eras_per_year),
    );
    let query_service = QueryService::new(collector, repository, cache, page_size_limit);

    let mut ticker = interval(fire_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval:? = fire_interval; "scheduler started");

    loop {
        select! {
            _ = ticker.tick() => {
                let scheduler = scheduler.clone();
                let query_service = query_service.clone();

                tokio::spawn(async move {
                    let outcome = scheduler.fire().await;
                    if let FireOutcome::Completed(CycleReport { era: Some(era), .. }) = outcome {
                        warm_up(&query_service, era).await;
                    }
                });
            }

            _ = sigterm.recv() => {
                warn!("SIGTERM received");
                return Ok(());
            }
        }
    }
}

/// Fill the caches for the aggregator data sets of the new era. Building the nominator list also
/// builds the candidate list.
async fn warm_up<C, A, S, B>(query_service: &QueryService<C, A, S, B>, era: Era)
where
    C: Chain,
    A: Aggregator,
    S: Storage,
    B: CacheBackend,
{
    match query_service.nominators().await {
        Ok(nominators) => {
            debug!(era, len = nominators.nominators.len(); "aggregator caches warmed up")
        }

        Err(error) => match error.payload() {
            Some(payload) => warn!(
                era,
                error_code = payload.error_code,
                error_msg = payload.error_msg.as_str();
                "cannot warm up aggregator caches"
            ),
            None => {
                let error = anyhow::Error::from(error);
                warn!(era, error:?; "cannot warm up aggregator caches")
            }
        },
    }
}

fn eras_per_year_default() -> u32 {
    365
}
