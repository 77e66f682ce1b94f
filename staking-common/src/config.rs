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

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;
use std::env;

/// Environment variable naming an alternative configuration file.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

const CONFIG_FILE: &str = "config.yaml";
const ENV_PREFIX: &str = "APP__";

/// Extension methods for configuration types.
pub trait ConfigExt
where
    Self: for<'de> Deserialize<'de>,
{
    /// Load the configuration from the YAML file at `$CONFIG_FILE` (defaulting to `config.yaml`)
    /// and merge environment variables prefixed with `APP__` over it; nested keys are separated
    /// by a double underscore, e.g. `APP__INFRA__STORAGE__PASSWORD`.
    fn load() -> Result<Self, Box<figment::Error>> {
        let config_file = env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| CONFIG_FILE.to_string());

        Figment::new()
            .merge(Yaml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }
}

impl<T> ConfigExt for T where T: for<'de> Deserialize<'de> {}

#[cfg(test)]
mod tests {
    use crate::config::ConfigExt;
    use figment::Jail;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    struct Config {
        name: String,
        nested: Nested,
    }

    #[derive(Debug, Deserialize)]
    struct Nested {
        #[serde(with = "humantime_serde")]
        interval: Duration,
        port: u16,
    }

    #[test]
    fn test_load() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                "name: staking\nnested:\n  interval: 5m\n  port: 5432\n",
            )?;
            jail.set_env("APP__NESTED__PORT", "6543");

            let config = Config::load().map_err(|error| error.to_string())?;
            assert_eq!(config.name, "staking");
            assert_eq!(config.nested.interval, Duration::from_secs(300));
            assert_eq!(config.nested.port, 6543);

            Ok(())
        });
    }

    #[test]
    fn test_load_config_file_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "other.yaml",
                "name: other\nnested:\n  interval: 10s\n  port: 1\n",
            )?;
            jail.set_env("CONFIG_FILE", "other.yaml");

            let config = Config::load().map_err(|error| error.to_string())?;
            assert_eq!(config.name, "other");
            assert_eq!(config.nested.interval, Duration::from_secs(10));

            Ok(())
        });
    }

    #[test]
    fn test_load_missing_field() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "name: staking\n")?;
            assert!(Config::load().is_err());
            Ok(())
        });
    }
}
