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

use crate::domain::{Amount, ValidatorId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use staking_common::error::BoxError;
use thiserror::Error;

/// Third-party source of curated validator candidates and their nominators.
#[trait_variant::make(Send)]
pub trait Aggregator
where
    Self: Clone + Send + Sync + 'static,
{
    async fn valid_candidates(&self) -> Result<Vec<Candidate>, AggregatorError>;

    async fn nominators(&self) -> Result<Vec<AggregatorNominator>, AggregatorError>;

    /// All known candidates, valid or not.
    async fn candidates(&self) -> Result<Vec<Candidate>, AggregatorError>;

    /// Human readable reasons why candidates are invalid, one per line.
    async fn invalidity_reasons(&self) -> Result<Vec<String>, AggregatorError>;

    /// All rewards received by the given address.
    async fn rewards(&self, address: &str) -> Result<Vec<RewardEvent>, AggregatorError>;
}

/// A validator candidate. Attributes beyond stash and name are passed through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub stash: ValidatorId,

    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// A nominator account managed by the aggregator, with its current targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorNominator {
    pub address: String,

    #[serde(default)]
    pub current: Vec<ValidatorId>,

    #[serde(default)]
    pub last_nomination: Option<Value>,

    #[serde(default)]
    pub created_at: Option<Value>,
}

/// A staking reward paid to an address.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEvent {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub amount: Amount,

    /// Seconds since the epoch.
    pub block_timestamp: i64,
}

/// The aggregation API could not deliver the requested data.
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("{endpoint} responded with status {status}")]
    Unavailable { endpoint: String, status: u16 },

    #[error("{endpoint} responded with no data")]
    Empty { endpoint: String },

    #[error("{endpoint} responded with error code {code}")]
    Refused { endpoint: String, code: i64 },

    #[error("cannot request {endpoint}")]
    Request {
        endpoint: String,
        #[source]
        source: BoxError,
    },

    #[error("cannot decode response of {endpoint}")]
    Decode {
        endpoint: String,
        #[source]
        source: BoxError,
    },
}

/// Tagged error returned to the serving layer instead of the requested data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_code: u16,
    pub error_msg: String,
}

impl ErrorPayload {
    pub const CANDIDATES_UNAVAILABLE: u16 = 1000;
    pub const NOMINATORS_UNAVAILABLE: u16 = 2000;
    pub const ALL_CANDIDATES_UNAVAILABLE: u16 = 3000;
    pub const INVALIDITY_REASONS_UNAVAILABLE: u16 = 4000;
    pub const REWARDS_UNAVAILABLE: u16 = 5000;

    pub fn candidates_unavailable() -> Self {
        Self {
            error_code: Self::CANDIDATES_UNAVAILABLE,
            error_msg: "Failed to fetch candidates.".to_owned(),
        }
    }

    pub fn nominators_unavailable() -> Self {
        Self {
            error_code: Self::NOMINATORS_UNAVAILABLE,
            error_msg: "Failed to fetch nominators.".to_owned(),
        }
    }

    pub fn all_candidates_unavailable() -> Self {
        Self {
            error_code: Self::ALL_CANDIDATES_UNAVAILABLE,
            error_msg: "Failed to fetch all candidates.".to_owned(),
        }
    }

    pub fn invalidity_reasons_unavailable() -> Self {
        Self {
            error_code: Self::INVALIDITY_REASONS_UNAVAILABLE,
            error_msg: "Failed to fetch invalidity reasons.".to_owned(),
        }
    }

    pub fn rewards_unavailable() -> Self {
        Self {
            error_code: Self::REWARDS_UNAVAILABLE,
            error_msg: "Failed to fetch rewards.".to_owned(),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use crate::domain::aggregator::{
        Aggregator, AggregatorError, AggregatorNominator, Candidate, RewardEvent,
    };
    use serde_json::Map;
    use std::{
        collections::HashMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    /// Aggregator serving fixed data, or failing if `available` is false.
    #[derive(Debug, Clone, Default)]
    pub struct MockAggregator {
        pub available: bool,
        pub candidates: Vec<Candidate>,
        pub nominators: Vec<AggregatorNominator>,
        pub all_candidates: Vec<Candidate>,
        pub invalidity_reasons: Vec<String>,
        pub rewards: HashMap<String, Vec<RewardEvent>>,
        calls: Arc<AtomicUsize>,
    }

    impl MockAggregator {
        pub fn new(candidates: Vec<Candidate>, nominators: Vec<AggregatorNominator>) -> Self {
            Self {
                available: true,
                candidates,
                nominators,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub fn candidate(stash: &str, name: &str) -> Candidate {
        Candidate {
            stash: stash.to_owned(),
            name: name.to_owned(),
            details: Map::new(),
        }
    }

    impl Aggregator for MockAggregator {
        async fn valid_candidates(&self) -> Result<Vec<Candidate>, AggregatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.available {
                return Err(AggregatorError::Unavailable {
                    endpoint: "/valid".to_owned(),
                    status: 503,
                });
            }
            Ok(self.candidates.clone())
        }

        async fn nominators(&self) -> Result<Vec<AggregatorNominator>, AggregatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.available {
                return Err(AggregatorError::Empty {
                    endpoint: "/nominators".to_owned(),
                });
            }
            Ok(self.nominators.clone())
        }

        async fn candidates(&self) -> Result<Vec<Candidate>, AggregatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.available || self.all_candidates.is_empty() {
                return Err(AggregatorError::Empty {
                    endpoint: "/candidates".to_owned(),
                });
            }
            Ok(self.all_candidates.clone())
        }

        async fn invalidity_reasons(&self) -> Result<Vec<String>, AggregatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.available || self.invalidity_reasons.is_empty() {
                return Err(AggregatorError::Empty {
                    endpoint: "/invalid".to_owned(),
                });
            }
            Ok(self.invalidity_reasons.clone())
        }

        async fn rewards(&self, address: &str) -> Result<Vec<RewardEvent>, AggregatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.available {
                return Err(AggregatorError::Refused {
                    endpoint: "/rewards".to_owned(),
                    code: 10004,
                });
            }
            Ok(self.rewards.get(address).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn test_deserialize_candidate() {
        let candidate = serde_json::from_str::<Candidate>(
            r#"{ "stash": "alice", "name": "Alice", "rank": 7, "faults": 0 }"#,
        );
        let candidate = candidate.expect("candidate can be deserialized");
        assert_eq!(candidate.stash, "alice");
        assert_eq!(candidate.details.get("rank"), Some(&7.into()));

        let json = serde_json::to_value(&candidate).expect("candidate can be serialized");
        assert_eq!(json["rank"], 7);
        assert_eq!(json["name"], "Alice");
    }
}
