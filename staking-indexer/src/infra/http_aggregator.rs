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

use crate::domain::aggregator::{
    Aggregator, AggregatorError, AggregatorNominator, Candidate, RewardEvent,
};
use fastrace::trace;
use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;

const VALID_ENDPOINT: &str = "/valid";
const NOMINATORS_ENDPOINT: &str = "/nominators";
const CANDIDATES_ENDPOINT: &str = "/candidates";
const INVALID_ENDPOINT: &str = "/invalid";
const REWARDS_ENDPOINT: &str = "rewards";

const REWARD_PAGE_ROWS: u32 = 100;
const MAX_REWARD_PAGES: u32 = 1_000;

/// Config for the aggregation API.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub base_url: String,

    /// Paged reward history, answering `{ row, page, address }` with a code and a list.
    pub rewards_url: String,

    #[serde(default)]
    pub rewards_api_key: Option<SecretString>,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// An [Aggregator] implementation based on reqwest.
#[derive(Debug, Clone)]
pub struct HttpAggregator {
    client: Client,
    base_url: String,
    rewards_url: String,
    rewards_api_key: Option<SecretString>,
}

impl HttpAggregator {
    /// Create a new [HttpAggregator] with the given [Config].
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            rewards_url: config.rewards_url,
            rewards_api_key: config.rewards_api_key,
        })
    }

    /// Send the given request and fail unless it is answered with 200.
    async fn send(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, AggregatorError> {
        let response = request
            .send()
            .await
            .map_err(|error| AggregatorError::Request {
                endpoint: endpoint.to_owned(),
                source: error.into(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AggregatorError::Unavailable {
                endpoint: endpoint.to_owned(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    /// GET the given endpoint and decode a non-empty JSON array.
    async fn get_list<T>(&self, endpoint: &'static str) -> Result<Vec<T>, AggregatorError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{endpoint}", self.base_url);
        let response = self.send(endpoint, self.client.get(&url)).await?;

        let items = response
            .json::<Vec<T>>()
            .await
            .map_err(|error| AggregatorError::Decode {
                endpoint: endpoint.to_owned(),
                source: error.into(),
            })?;
        if items.is_empty() {
            return Err(AggregatorError::Empty {
                endpoint: endpoint.to_owned(),
            });
        }

        debug!(endpoint, len = items.len(); "aggregator response received");
        Ok(items)
    }

    /// GET the given endpoint and split its text into non-empty lines.
    async fn get_lines(&self, endpoint: &'static str) -> Result<Vec<String>, AggregatorError> {
        let url = format!("{}{endpoint}", self.base_url);
        let response = self.send(endpoint, self.client.get(&url)).await?;

        let text = response
            .text()
            .await
            .map_err(|error| AggregatorError::Decode {
                endpoint: endpoint.to_owned(),
                source: error.into(),
            })?;
        let lines = lines(&text);
        if lines.is_empty() {
            return Err(AggregatorError::Empty {
                endpoint: endpoint.to_owned(),
            });
        }

        debug!(endpoint, len = lines.len(); "aggregator response received");
        Ok(lines)
    }

    async fn reward_page(
        &self,
        address: &str,
        page: u32,
    ) -> Result<Vec<RewardEvent>, AggregatorError> {
        let body = RewardsRequest {
            row: REWARD_PAGE_ROWS,
            page,
            address,
        };
        let mut request = self.client.post(&self.rewards_url).json(&body);
        if let Some(api_key) = &self.rewards_api_key {
            request = request.header("x-api-key", api_key.expose_secret());
        }

        let response = self
            .send(REWARDS_ENDPOINT, request)
            .await?
            .json::<RewardsResponse>()
            .await
            .map_err(|error| AggregatorError::Decode {
                endpoint: REWARDS_ENDPOINT.to_owned(),
                source: error.into(),
            })?;

        response.into_events()
    }
}

impl Aggregator for HttpAggregator {
    #[trace]
    async fn valid_candidates(&self) -> Result<Vec<Candidate>, AggregatorError> {
        self.get_list(VALID_ENDPOINT).await
    }

    #[trace]
    async fn nominators(&self) -> Result<Vec<AggregatorNominator>, AggregatorError> {
        self.get_list(NOMINATORS_ENDPOINT).await
    }

    #[trace]
    async fn candidates(&self) -> Result<Vec<Candidate>, AggregatorError> {
        self.get_list(CANDIDATES_ENDPOINT).await
    }

    #[trace]
    async fn invalidity_reasons(&self) -> Result<Vec<String>, AggregatorError> {
        self.get_lines(INVALID_ENDPOINT).await
    }

    #[trace(properties = { "address": "{address}" })]
    async fn rewards(&self, address: &str) -> Result<Vec<RewardEvent>, AggregatorError> {
        let mut events = vec![];

        for page in 0..MAX_REWARD_PAGES {
            let page_events = self.reward_page(address, page).await?;
            let last = page_events.len() < REWARD_PAGE_ROWS as usize;
            events.extend(page_events);
            if last {
                break;
            }
        }

        debug!(address, len = events.len(); "rewards received");
        Ok(events)
    }
}

#[derive(Debug, Serialize)]
struct RewardsRequest<'a> {
    row: u32,
    page: u32,
    address: &'a str,
}

#[derive(Debug, Deserialize)]
struct RewardsResponse {
    code: i64,

    #[serde(default)]
    data: Option<RewardsData>,
}

#[derive(Debug, Deserialize)]
struct RewardsData {
    #[serde(default)]
    list: Option<Vec<RewardEvent>>,
}

impl RewardsResponse {
    fn into_events(self) -> Result<Vec<RewardEvent>, AggregatorError> {
        if self.code != 0 {
            return Err(AggregatorError::Refused {
                endpoint: REWARDS_ENDPOINT.to_owned(),
                code: self.code,
            });
        }

        let events = self.data.and_then(|data| data.list).unwrap_or_default();
        Ok(events)
    }
}

fn lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
