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

use anyhow::Context;
use log::{error, info};
use staking_common::{
    config::ConfigExt,
    infra::{migrations, pool::postgres::PostgresPool},
    telemetry,
};
use staking_indexer::{
    application,
    config::Config,
    infra::{
        self, cache::AnyCache, http_aggregator::HttpAggregator, storage::postgres::PostgresStorage,
        subxt_chain::SubxtChain,
    },
};
use std::panic;
use tokio::signal::unix::{SignalKind, signal};

#[tokio::main]
async fn main() {
    telemetry::init_logging();
    panic::set_hook(Box::new(|panic| error!(panic:%; "process panicked")));

    if let Err(error) = run().await {
        let backtrace = error.backtrace();
        let error = format!("{error:#}");
        error!(error, backtrace:%; "process exited with ERROR");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler can be registered");

    let config = Config::load().context("load configuration")?;
    info!(config:?; "starting");
    let Config {
        run_migrations,
        application_config,
        infra_config,
        telemetry_config:
            telemetry::Config {
                tracing_config,
                metrics_config,
            },
    } = config;

    telemetry::init_tracing(tracing_config);
    telemetry::init_metrics(metrics_config);

    let infra::Config {
        node_config,
        aggregator_config,
        storage_config,
        cache_config,
    } = infra_config;

    let pool = PostgresPool::new(storage_config)
        .await
        .context("create DB pool for Postgres")?;
    if run_migrations {
        migrations::postgres::run(&pool)
            .await
            .context("run Postgres migrations")?;
    }
    let storage = PostgresStorage::new(pool);

    let chain = SubxtChain::new(node_config)
        .await
        .context("create SubxtChain")?;
    let aggregator = HttpAggregator::new(aggregator_config).context("create HttpAggregator")?;
    let cache = AnyCache::new(cache_config);

    application::run(application_config, chain, aggregator, storage, cache, sigterm)
        .await
        .context("run staking indexer application")
}
