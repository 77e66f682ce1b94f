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
    Amount, Era,
    nomination::{
        CommissionChange, Exposure, IndividualExposure, NominationRecord, NominatorEntry,
        ValidatorRecord,
    },
    storage::Storage,
};
use fastrace::trace;
use indoc::indoc;
use sqlx::types::Json;
use staking_common::infra::pool::postgres::PostgresPool;

type ValidatorRow = (String, String, String);

type NominationRow = (
    String,
    i64,
    String,
    String,
    Json<Vec<IndividualExposure>>,
    Json<Vec<NominatorEntry>>,
    f64,
    f64,
);

/// Postgres based implementation of [Storage].
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PostgresPool,
}

impl PostgresStorage {
    /// Create a new [PostgresStorage].
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }
}

impl Storage for PostgresStorage {
    #[trace]
    async fn get_validator(&self, id: &str) -> Result<Option<ValidatorRecord>, sqlx::Error> {
        let query = indoc! {"
            SELECT id, display_name, commission_change
            FROM validators
            WHERE id = $1
        "};

        sqlx::query_as::<_, ValidatorRow>(query)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?
            .map(validator_from_row)
            .transpose()
    }

    #[trace]
    async fn get_nomination(
        &self,
        validator_id: &str,
        era: Era,
    ) -> Result<Option<NominationRecord>, sqlx::Error> {
        let query = indoc! {"
            SELECT
                validator_id,
                era,
                exposure_total::TEXT,
                exposure_own::TEXT,
                exposure_others,
                nominators,
                commission,
                apy
            FROM nominations
            WHERE validator_id = $1
            AND era = $2
        "};

        sqlx::query_as::<_, NominationRow>(query)
            .bind(validator_id)
            .bind(era as i64)
            .fetch_optional(&*self.pool)
            .await?
            .map(nomination_from_row)
            .transpose()
    }

    #[trace]
    async fn save_validator_nomination(
        &self,
        validator: &ValidatorRecord,
        nomination: &NominationRecord,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let query = indoc! {"
            INSERT INTO validators (id, display_name, commission_change)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                commission_change = EXCLUDED.commission_change
        "};

        sqlx::query(query)
            .bind(&validator.id)
            .bind(&validator.display_name)
            .bind(validator.commission_change.to_string())
            .execute(&mut *tx)
            .await?;

        let query = indoc! {"
            INSERT INTO nominations (
                validator_id,
                era,
                exposure_total,
                exposure_own,
                exposure_others,
                nominators,
                commission,
                apy
            )
            VALUES ($1, $2, $3::NUMERIC, $4::NUMERIC, $5, $6, $7, $8)
            ON CONFLICT (validator_id, era) DO UPDATE SET
                exposure_total = EXCLUDED.exposure_total,
                exposure_own = EXCLUDED.exposure_own,
                exposure_others = EXCLUDED.exposure_others,
                nominators = EXCLUDED.nominators,
                commission = EXCLUDED.commission,
                apy = EXCLUDED.apy
        "};

        sqlx::query(query)
            .bind(&nomination.validator_id)
            .bind(nomination.era as i64)
            .bind(nomination.exposure.total.to_string())
            .bind(nomination.exposure.own.to_string())
            .bind(Json(&nomination.exposure.others))
            .bind(Json(&nomination.nominators))
            .bind(nomination.commission)
            .bind(nomination.apy)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    #[trace]
    async fn get_nominations(
        &self,
        validator_id: &str,
    ) -> Result<Vec<NominationRecord>, sqlx::Error> {
        let query = indoc! {"
            SELECT
                validator_id,
                era,
                exposure_total::TEXT,
                exposure_own::TEXT,
                exposure_others,
                nominators,
                commission,
                apy
            FROM nominations
            WHERE validator_id = $1
            ORDER BY era
        "};

        sqlx::query_as::<_, NominationRow>(query)
            .bind(validator_id)
            .fetch_all(&*self.pool)
            .await?
            .into_iter()
            .map(nomination_from_row)
            .collect()
    }

    #[trace]
    async fn get_nominations_for_era(
        &self,
        era: Era,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<(ValidatorRecord, NominationRecord)>, sqlx::Error> {
        let query = indoc! {"
            SELECT
                validators.id,
                validators.display_name,
                validators.commission_change,
                nominations.validator_id,
                nominations.era,
                nominations.exposure_total::TEXT,
                nominations.exposure_own::TEXT,
                nominations.exposure_others,
                nominations.nominators,
                nominations.commission,
                nominations.apy
            FROM nominations
            INNER JOIN validators ON validators.id = nominations.validator_id
            WHERE nominations.era = $1
            ORDER BY nominations.id
            LIMIT $2
            OFFSET $3
        "};

        #[allow(clippy::type_complexity)]
        let rows = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                String,
                i64,
                String,
                String,
                Json<Vec<IndividualExposure>>,
                Json<Vec<NominatorEntry>>,
                f64,
                f64,
            ),
        >(query)
        .bind(era as i64)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&*self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(
                    id,
                    display_name,
                    commission_change,
                    validator_id,
                    era,
                    total,
                    own,
                    others,
                    nominators,
                    commission,
                    apy,
                )| {
                    let validator = validator_from_row((id, display_name, commission_change))?;
                    let nomination = nomination_from_row((
                        validator_id,
                        era,
                        total,
                        own,
                        others,
                        nominators,
                        commission,
                        apy,
                    ))?;
                    Ok((validator, nomination))
                },
            )
            .collect()
    }

    #[trace]
    async fn save_active_era(&self, era: Era) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            INSERT INTO chain_info (id, active_era)
            VALUES (TRUE, $1)
            ON CONFLICT (id) DO UPDATE SET active_era = EXCLUDED.active_era
        "};

        sqlx::query(query)
            .bind(era as i64)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn get_active_era(&self) -> Result<Option<Era>, sqlx::Error> {
        let query = indoc! {"
            SELECT active_era
            FROM chain_info
        "};

        sqlx::query_as::<_, (i64,)>(query)
            .fetch_optional(&*self.pool)
            .await?
            .map(|(era,)| to_era(era))
            .transpose()
    }
}

fn validator_from_row(row: ValidatorRow) -> Result<ValidatorRecord, sqlx::Error> {
    let (id, display_name, commission_change) = row;
    let commission_change = commission_change
        .parse::<CommissionChange>()
        .map_err(|error| sqlx::Error::Decode(error.into()))?;

    Ok(ValidatorRecord {
        id,
        display_name,
        commission_change,
    })
}

fn nomination_from_row(row: NominationRow) -> Result<NominationRecord, sqlx::Error> {
    let (validator_id, era, total, own, Json(others), Json(nominators), commission, apy) = row;

    Ok(NominationRecord {
        validator_id,
        era: to_era(era)?,
        exposure: Exposure {
            total: to_amount(&total)?,
            own: to_amount(&own)?,
            others,
        },
        nominators,
        commission,
        apy,
    })
}

fn to_era(era: i64) -> Result<Era, sqlx::Error> {
    Era::try_from(era).map_err(|error| sqlx::Error::Decode(error.into()))
}

fn to_amount(amount: &str) -> Result<Amount, sqlx::Error> {
    amount
        .parse()
        .map_err(|error: std::num::ParseIntError| sqlx::Error::Decode(error.into()))
}
