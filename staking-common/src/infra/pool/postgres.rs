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

use derive_more::Deref;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
};
use std::time::Duration;
use thiserror::Error;

/// New type for a Postgres connection pool.
#[derive(Debug, Clone, Deref)]
pub struct PostgresPool(PgPool);

impl PostgresPool {
    /// Try to create a new [PostgresPool] with the given [Config].
    pub async fn new(config: Config) -> Result<Self, Error> {
        let Config {
            host,
            port,
            dbname,
            user,
            password,
            sslmode,
            max_connections,
            idle_timeout,
            max_lifetime,
        } = config;

        let connect_options = PgConnectOptions::new()
            .host(&host)
            .port(port)
            .database(&dbname)
            .username(&user)
            .password(password.expose_secret())
            .ssl_mode(sslmode);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(Some(idle_timeout))
            .max_lifetime(Some(max_lifetime))
            .connect_with(connect_options)
            .await?;

        Ok(Self(pool))
    }
}

/// Configuration for a [PostgresPool].
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,

    pub port: u16,

    pub dbname: String,

    pub user: String,

    pub password: SecretString,

    #[serde(deserialize_with = "deserialize_sslmode")]
    pub sslmode: PgSslMode,

    pub max_connections: u32,

    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub max_lifetime: Duration,
}

/// Error possibly returned by [PostgresPool::new].
#[derive(Debug, Error)]
#[error("cannot create Postgres pool")]
pub struct Error(#[from] sqlx::Error);

fn deserialize_sslmode<'de, D>(deserializer: D) -> Result<PgSslMode, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer)?
        .parse()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use crate::infra::pool::postgres::Config;
    use assert_matches::assert_matches;
    use secrecy::ExposeSecret;
    use sqlx::postgres::PgSslMode;
    use std::time::Duration;

    #[test]
    fn test_deserialize_config() {
        let config = serde_json::from_str::<Config>(
            r#"{
                "host": "localhost",
                "port": 5432,
                "dbname": "staking",
                "user": "staking",
                "password": "secret",
                "sslmode": "prefer",
                "max_connections": 10,
                "idle_timeout": "1m",
                "max_lifetime": "5m"
            }"#,
        );

        assert_matches!(config, Ok(config) => {
            assert_eq!(config.password.expose_secret(), "secret");
            assert_matches!(config.sslmode, PgSslMode::Prefer);
            assert_eq!(config.idle_timeout, Duration::from_secs(60));
            assert_eq!(config.max_lifetime, Duration::from_secs(300));
        });
    }

    #[test]
    fn test_deserialize_config_invalid_sslmode() {
        let config = serde_json::from_str::<Config>(
            r#"{
                "host": "localhost",
                "port": 5432,
                "dbname": "staking",
                "user": "staking",
                "password": "secret",
                "sslmode": "sometimes",
                "max_connections": 10,
                "idle_timeout": "1m",
                "max_lifetime": "5m"
            }"#,
        );

        assert!(config.is_err());
    }
}
