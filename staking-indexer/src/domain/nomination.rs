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

use crate::domain::{Amount, Era, ValidatorId};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use std::str::FromStr;
use thiserror::Error;

/// A validator and what was last observed about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorRecord {
    pub id: ValidatorId,
    pub display_name: String,
    pub commission_change: CommissionChange,
}

/// Direction of the last commission change, relative to the previous era.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionChange {
    #[default]
    #[display("NONE")]
    None,

    #[display("INCREASED")]
    Increased,

    #[display("DECREASED")]
    Decreased,
}

impl CommissionChange {
    /// Compare the commission of the previous era, if known, with the current one.
    pub fn detect(previous: Option<f64>, current: f64) -> Self {
        match previous {
            Some(previous) if current > previous => Self::Increased,
            Some(previous) if current < previous => Self::Decreased,
            _ => Self::None,
        }
    }
}

impl FromStr for CommissionChange {
    type Err = UnknownCommissionChange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Self::None),
            "INCREASED" => Ok(Self::Increased),
            "DECREASED" => Ok(Self::Decreased),
            other => Err(UnknownCommissionChange(other.to_owned())),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown commission change {0}")]
pub struct UnknownCommissionChange(String);

/// Stake backing a validator in an era.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Exposure {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub total: Amount,

    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub own: Amount,

    pub others: Vec<IndividualExposure>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualExposure {
    pub who: String,

    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub value: Amount,
}

/// A nominator backing a validator, with its bonded stake.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominatorEntry {
    pub address: String,

    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub stake: Amount,
}

/// What was observed about a validator in one era; unique per validator and era.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NominationRecord {
    pub validator_id: ValidatorId,
    pub era: Era,
    pub exposure: Exposure,
    pub nominators: Vec<NominatorEntry>,
    pub commission: f64,
    pub apy: f64,
}

/// A nomination to be persisted for a validator.
#[derive(Debug, Clone, PartialEq)]
pub struct NominationInput {
    pub era: Era,
    pub display_name: String,
    pub exposure: Exposure,
    pub nominators: Vec<NominatorEntry>,
    pub commission: f64,
    pub apy: f64,
}

impl NominationInput {
    /// Check the invariants which the types cannot express.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(index) = self.exposure.others.iter().position(|o| o.who.is_empty()) {
            return Err(ValidationError::IncompleteExposure(index));
        }

        if !(0.0..=100.0).contains(&self.commission) {
            return Err(ValidationError::Commission(self.commission));
        }

        if !self.apy.is_finite() || self.apy < 0.0 {
            return Err(ValidationError::Apy(self.apy));
        }

        Ok(())
    }

    pub fn into_record(self, validator_id: ValidatorId) -> NominationRecord {
        NominationRecord {
            validator_id,
            era: self.era,
            exposure: self.exposure,
            nominators: self.nominators,
            commission: self.commission,
            apy: self.apy,
        }
    }
}

impl TryFrom<&Value> for NominationInput {
    type Error = ValidationError;

    /// Decode a loosely structured JSON record, e.g.
    /// `{"era": 100, "displayName": "..", "exposure": {"total": .., "own": .., "others": [..]},
    /// "nominators": [..], "commission": 5, "apy": 0.12}`.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let era = value
            .get("era")
            .and_then(Value::as_u64)
            .and_then(|era| Era::try_from(era).ok())
            .ok_or(ValidationError::Era)?;

        let display_name = value
            .get("displayName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let exposure = value.get("exposure").ok_or(ValidationError::Missing("exposure"))?;
        let total =
            amount(exposure.get("total")).ok_or(ValidationError::Missing("exposure.total"))?;
        let own = amount(exposure.get("own")).ok_or(ValidationError::Missing("exposure.own"))?;
        let others = exposure
            .get("others")
            .and_then(Value::as_array)
            .ok_or(ValidationError::NotASequence("exposure.others"))?
            .iter()
            .enumerate()
            .map(|(index, other)| {
                let who = other.get("who").and_then(Value::as_str);
                let value = amount(other.get("value"));
                who.zip(value)
                    .map(|(who, value)| IndividualExposure {
                        who: who.to_owned(),
                        value,
                    })
                    .ok_or(ValidationError::IncompleteExposure(index))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let nominators = value
            .get("nominators")
            .and_then(Value::as_array)
            .ok_or(ValidationError::NotASequence("nominators"))?
            .iter()
            .map(|nominator| serde_json::from_value::<NominatorEntry>(nominator.to_owned()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ValidationError::Missing("nominators.address/stake"))?;

        let commission = value
            .get("commission")
            .and_then(Value::as_f64)
            .ok_or(ValidationError::Missing("commission"))?;
        let apy = value
            .get("apy")
            .and_then(Value::as_f64)
            .ok_or(ValidationError::Missing("apy"))?;

        let input = Self {
            era,
            display_name,
            exposure: Exposure { total, own, others },
            nominators,
            commission,
            apy,
        };
        input.validate()?;

        Ok(input)
    }
}

fn amount(value: Option<&Value>) -> Option<Amount> {
    match value? {
        Value::Number(n) => n.as_u64().map(Amount::from),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// A nomination record which must not be persisted.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("era must be a non-negative integer")]
    Era,

    #[error("{0} must be a sequence")]
    NotASequence(&'static str),

    #[error("missing or invalid {0}")]
    Missing(&'static str),

    #[error("exposure entry {0} must have an address and a value")]
    IncompleteExposure(usize),

    #[error("commission {0} out of range")]
    Commission(f64),

    #[error("invalid APY {0}")]
    Apy(f64),
}
