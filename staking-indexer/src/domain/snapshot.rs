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

use crate::domain::{
    Amount, Era, ValidatorId,
    aggregator::{AggregatorNominator, Candidate, RewardEvent},
    chain::NominatorStake,
    nomination::{Exposure, NominatorEntry},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DisplayFromStr, serde_as};
use std::collections::{HashMap, HashSet};

/// Everything known about the validators in one era. `validator_count` is the number of
/// validator slots, `elected_count` the number of validators actually active. Waiting validators
/// are only included for the active era.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorSnapshot {
    pub active_era: Era,
    pub validator_count: usize,
    pub elected_count: usize,
    pub election_rate: f64,
    pub validators: Vec<ValidatorDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorDetail {
    pub stash_id: ValidatorId,
    pub display_name: String,
    pub exposure: Exposure,
    pub nominators: Vec<NominatorEntry>,
    pub total_nominators: usize,
    pub commission: f64,
    pub active: bool,
}

/// Raw per-validator chain data a [ValidatorSnapshot] is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorChainData {
    pub stash_id: ValidatorId,
    pub exposure: Exposure,
    pub commission: f64,
    pub active: bool,
}

impl ValidatorSnapshot {
    /// Join the chain data of the validators with the nominators targeting them and the
    /// names known to the aggregator; validators without a known name are named by their stash.
    pub fn build(
        active_era: Era,
        validator_count: u32,
        validators: Vec<ValidatorChainData>,
        nominators: &[NominatorStake],
        names: &HashMap<ValidatorId, String>,
    ) -> Self {
        let mut nominators_by_target = nominators
            .iter()
            .flat_map(|nominator| {
                nominator.targets.iter().map(|target| {
                    let entry = NominatorEntry {
                        address: nominator.account_id.to_owned(),
                        stake: nominator.stake,
                    };
                    (target.to_owned(), entry)
                })
            })
            .into_group_map();

        let validators = validators
            .into_iter()
            .map(|data| {
                let nominators = nominators_by_target
                    .remove(&data.stash_id)
                    .unwrap_or_default();
                let display_name = names
                    .get(&data.stash_id)
                    .filter(|name| !name.is_empty())
                    .cloned()
                    .unwrap_or_else(|| data.stash_id.clone());

                ValidatorDetail {
                    display_name,
                    total_nominators: nominators.len(),
                    nominators,
                    stash_id: data.stash_id,
                    exposure: data.exposure,
                    commission: data.commission,
                    active: data.active,
                }
            })
            .collect::<Vec<_>>();

        let validator_count = validator_count as usize;
        let elected_count = validators.iter().filter(|v| v.active).count();

        Self {
            active_era,
            validator_count,
            elected_count,
            election_rate: rate(elected_count, validator_count),
            validators,
        }
    }
}

/// Nominators as seen by the chain, tagged with the era they were read in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainNominatorSnapshot {
    pub active_era: Era,
    pub nominators: Vec<NominatorStake>,
}

/// Aggregator candidates flagged by membership in the active validator set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateList {
    pub active_era: Era,
    pub validator_count: usize,
    pub elected_count: usize,
    pub election_rate: f64,
    pub valid: Vec<CandidateStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateStatus {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub elected: bool,
}

impl CandidateList {
    pub fn build(
        active_era: Era,
        candidates: Vec<Candidate>,
        active_validators: &HashSet<ValidatorId>,
    ) -> Self {
        let valid = candidates
            .into_iter()
            .map(|mut candidate| {
                candidate.details.remove("elected");
                let elected = active_validators.contains(&candidate.stash);
                CandidateStatus { candidate, elected }
            })
            .collect::<Vec<_>>();

        let validator_count = valid.len();
        let elected_count = valid.iter().filter(|c| c.elected).count();

        Self {
            active_era,
            validator_count,
            elected_count,
            election_rate: rate(elected_count, validator_count),
            valid,
        }
    }

    fn get(&self, stash: &str) -> Option<&CandidateStatus> {
        self.valid.iter().find(|c| c.candidate.stash == stash)
    }
}

/// Aggregator nominators with their targets enriched from a [CandidateList].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NominatorList {
    pub active_era: Era,
    pub nominators: Vec<NominatorStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NominatorStatus {
    pub address: String,
    pub current: Vec<TargetStatus>,
    pub last_nomination: Option<Value>,
    pub created_at: Option<Value>,
}

/// A nomination target; name and elected are unknown for stashes which are not candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub stash: ValidatorId,
    pub name: Option<String>,
    pub elected: Option<bool>,
}

impl NominatorList {
    pub fn build(
        active_era: Era,
        nominators: Vec<AggregatorNominator>,
        candidates: &CandidateList,
    ) -> Self {
        let nominators = nominators
            .into_iter()
            .map(|nominator| {
                let current = nominator
                    .current
                    .into_iter()
                    .map(|stash| match candidates.get(&stash) {
                        Some(status) => TargetStatus {
                            name: Some(status.candidate.name.clone()),
                            elected: Some(status.elected),
                            stash,
                        },
                        None => TargetStatus {
                            stash,
                            name: None,
                            elected: None,
                        },
                    })
                    .collect();

                NominatorStatus {
                    address: nominator.address,
                    current,
                    last_nomination: nominator.last_nomination,
                    created_at: nominator.created_at,
                }
            })
            .collect();

        Self {
            active_era,
            nominators,
        }
    }
}

/// A nomination by an aggregator nominator of a stash which is not a valid candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FalseNomination {
    pub nominator_address: String,
    pub stash: ValidatorId,
    pub name: Option<String>,
    pub elected: bool,
    pub reason: Option<String>,
}

impl FalseNomination {
    /// Collect the targets of the given nominators which are not valid candidates. Names come
    /// from the full candidate list, reasons are the first invalidity line mentioning the name.
    pub fn collect(
        nominators: &NominatorList,
        candidates: &[Candidate],
        active_validators: &HashSet<ValidatorId>,
        reasons: &[String],
    ) -> Vec<Self> {
        nominators
            .nominators
            .iter()
            .flat_map(|nominator| {
                nominator
                    .current
                    .iter()
                    .filter(|target| target.name.is_none() || target.elected.is_none())
                    .map(move |target| {
                        let name = candidates
                            .iter()
                            .find(|c| c.stash == target.stash)
                            .map(|c| c.name.clone())
                            .filter(|name| !name.is_empty());
                        let reason = name.as_ref().and_then(|name| {
                            reasons.iter().find(|reason| reason.contains(name.as_str()))
                        });

                        Self {
                            nominator_address: nominator.address.clone(),
                            stash: target.stash.clone(),
                            elected: active_validators.contains(&target.stash),
                            reason: reason.cloned(),
                            name,
                        }
                    })
            })
            .collect()
    }
}

/// Rewards received by an address, in the smallest unit, with the times of the first and the
/// latest reward in seconds since the epoch.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardStatistic {
    pub stash: String,
    #[serde_as(as = "DisplayFromStr")]
    pub total_reward: Amount,
    pub reward_count: usize,
    pub first_reward: i64,
    pub latest_reward: i64,
}

impl RewardStatistic {
    /// Summarize the given reward events; there is nothing to summarize without events.
    pub fn build(stash: String, events: &[RewardEvent]) -> Option<Self> {
        let (first_reward, latest_reward) = events
            .iter()
            .map(|event| event.block_timestamp)
            .minmax()
            .into_option()?;
        let total_reward = events
            .iter()
            .map(|event| event.amount)
            .fold(0, Amount::saturating_add);

        Some(Self {
            stash,
            total_reward,
            reward_count: events.len(),
            first_reward,
            latest_reward,
        })
    }
}

fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}
