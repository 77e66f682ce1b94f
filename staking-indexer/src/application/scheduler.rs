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

use crate::{
    application::collector::SnapshotCollector,
    domain::{
        Era,
        aggregator::Aggregator,
        apy::ApyCalculator,
        cache::{CacheBackend, CacheKey, SnapshotCache},
        chain::{Chain, NominatorStake},
        nomination::NominationInput,
        repository::NominationRepository,
        snapshot::{ChainNominatorSnapshot, ValidatorSnapshot},
        storage::Storage,
    },
};
use anyhow::Context;
use fastrace::trace;
use log::{debug, error, info, warn};
use metrics::{counter, gauge, histogram};
use staking_common::error::StdErrorExt;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

/// Whether a collection cycle is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Result of a timer fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Completed(CycleReport),

    /// Another cycle was running; the fire was dropped.
    Skipped,
}

/// What a completed cycle achieved; `era` is `None` if the active era could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub era: Option<Era>,
    pub saved: usize,
    pub failed: usize,
    pub nominators_cached: bool,
}

/// Runs at most one collect-and-persist cycle at a time.
#[derive(Debug, Clone)]
pub struct IngestionScheduler<C, A, S, B> {
    collector: SnapshotCollector<C, A>,
    repository: NominationRepository<S>,
    cache: SnapshotCache<B>,
    apy_calculator: ApyCalculator,
    running: Arc<AtomicBool>,
}

impl<C, A, S, B> IngestionScheduler<C, A, S, B>
where
    C: Chain,
    A: Aggregator,
    S: Storage,
    B: CacheBackend,
{
    pub fn new(
        collector: SnapshotCollector<C, A>,
        repository: NominationRepository<S>,
        cache: SnapshotCache<B>,
        apy_calculator: ApyCalculator,
    ) -> Self {
        Self {
            collector,
            repository,
            cache,
            apy_calculator,
            running: Default::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Handle a timer fire: run a cycle if idle, otherwise drop the fire.
    pub async fn fire(&self) -> FireOutcome {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            debug!("collection cycle in progress, fire skipped");
            counter!("staking_indexer_cycles_skipped").increment(1);
            return FireOutcome::Skipped;
        };

        let started_at = Instant::now();
        let report = self.run_cycle().await;
        histogram!("staking_indexer_cycle_duration_seconds")
            .record(started_at.elapsed().as_secs_f64());
        counter!("staking_indexer_cycles_completed").increment(1);

        FireOutcome::Completed(report)
    }

    #[trace]
    async fn run_cycle(&self) -> CycleReport {
        let era = match self.collector.active_era().await {
            Ok(era) => era,
            Err(error) => {
                let error = anyhow::Error::from(error);
                error!(error:?; "cannot get active era, cycle aborted");
                return CycleReport::default();
            }
        };
        info!(era; "collection cycle started");
        gauge!("staking_indexer_active_era").set(era as f64);

        if let Err(error) = self.repository.save_active_era(era).await {
            error!(era, error = error.as_chain(); "cannot save active era");
        }

        let mut report = CycleReport {
            era: Some(era),
            ..Default::default()
        };

        let nominators = match self.collector.collect_validators(era).await {
            Ok((snapshot, nominators)) => {
                if let Err(error) = self.cache.update(CacheKey::ValidatorDetail, &snapshot).await {
                    warn!(era, error = error.as_chain(); "cannot cache validator snapshot");
                }

                match self.save_nominations(&snapshot).await {
                    Ok((saved, failed)) => {
                        report.saved = saved;
                        report.failed = failed;
                    }
                    Err(error) => error!(era, error:?; "cannot save nominations"),
                }

                Some(nominators)
            }

            Err(error) => {
                let error = anyhow::Error::from(error);
                error!(era, error:?; "cannot collect validators");
                None
            }
        };

        match self.cache_nominators(era, nominators).await {
            Ok(()) => report.nominators_cached = true,
            Err(error) => error!(era, error:?; "cannot cache nominators"),
        }

        info!(
            era,
            saved = report.saved,
            failed = report.failed;
            "collection cycle completed"
        );
        report
    }

    /// Persist one nomination per active validator; returns the numbers of saved and failed ones.
    async fn save_nominations(
        &self,
        snapshot: &ValidatorSnapshot,
    ) -> anyhow::Result<(usize, usize)> {
        let era = snapshot.active_era;
        let chain = self.collector.chain();

        // The reward of an era is only known once it has ended.
        let era_total_reward = match era.checked_sub(1) {
            Some(previous_era) => chain
                .era_total_reward(previous_era)
                .await
                .context("get era total reward")?
                .unwrap_or_default(),
            None => 0,
        };
        let validator_count = chain
            .validator_count()
            .await
            .context("get validator count")?;

        let mut saved = 0;
        let mut failed = 0;
        for validator in snapshot.validators.iter().filter(|v| v.active) {
            let apy = self.apy_calculator.compute(
                era_total_reward,
                validator_count,
                validator.commission,
                validator.exposure.total,
            );

            let input = NominationInput {
                era,
                display_name: validator.display_name.clone(),
                exposure: validator.exposure.clone(),
                nominators: validator.nominators.clone(),
                commission: validator.commission,
                apy,
            };

            if self.repository.save_nomination(&validator.stash_id, input).await {
                saved += 1;
            } else {
                failed += 1;
            }
        }

        Ok((saved, failed))
    }

    async fn cache_nominators(
        &self,
        era: Era,
        nominators: Option<Vec<NominatorStake>>,
    ) -> anyhow::Result<()> {
        let nominators = match nominators {
            Some(nominators) => nominators,
            None => self
                .collector
                .chain()
                .nominators()
                .await
                .context("get nominators")?,
        };

        let snapshot = ChainNominatorSnapshot {
            active_era: era,
            nominators,
        };
        self.cache
            .update(CacheKey::ChainNominators, &snapshot)
            .await
            .context("update cache")
    }
}

/// Marks the scheduler as running for as long as it lives.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(running))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        application::{
            collector::SnapshotCollector,
            scheduler::{FireOutcome, IngestionScheduler, RunningGuard, SchedulerState},
        },
        domain::{
            Era,
            aggregator::tests::{MockAggregator, candidate},
            apy::ApyCalculator,
            cache::{CacheKey, SnapshotCache},
            chain::{NominatorStake, ValidatorIntention, tests::MockChain},
            era_resolver,
            nomination::{CommissionChange, Exposure, IndividualExposure},
            repository::NominationRepository,
            snapshot::{ChainNominatorSnapshot, ValidatorSnapshot},
            storage::{Storage, tests::FailingStorage},
        },
        infra::{cache::in_mem::InMemCache, storage::in_mem::InMemStorage},
    };
    use assert_matches::assert_matches;
    use std::{sync::atomic::AtomicBool, time::Duration};

    const RESOLVER_CONFIG: era_resolver::Config = era_resolver::Config {
        approx_blocks_per_era: 10,
        correction_stride: 2,
        max_resolution_iterations: 100,
    };

    const ACTIVE_ERA: Era = 2;

    fn chain() -> MockChain {
        let mut chain = MockChain::with_era_lengths(&[10, 10, 10]);
        let validators = vec!["alice".to_owned(), "bob".to_owned()];
        chain.validators.insert(ACTIVE_ERA, validators.clone());

        for (validator, commission) in [("alice", 5.0), ("bob", 10.0)] {
            chain
                .commissions
                .insert((ACTIVE_ERA, validator.to_owned()), commission);
            chain.exposures.insert(
                (ACTIVE_ERA, validator.to_owned()),
                Exposure {
                    total: 1_000,
                    own: 400,
                    others: vec![IndividualExposure {
                        who: "n1".to_owned(),
                        value: 600,
                    }],
                },
            );
        }

        chain.nominators = vec![NominatorStake {
            account_id: "n1".to_owned(),
            targets: validators,
            stake: 600,
        }];
        chain.rewards.insert(ACTIVE_ERA - 1, 2_000);
        chain.validator_count = 2;
        chain
    }

    fn scheduler<S>(
        chain: MockChain,
        storage: S,
        cache: InMemCache,
    ) -> IngestionScheduler<MockChain, MockAggregator, S, InMemCache>
    where
        S: Storage,
    {
        let aggregator = MockAggregator::new(vec![candidate("alice", "Alice")], vec![]);
        IngestionScheduler::new(
            SnapshotCollector::new(chain, aggregator, RESOLVER_CONFIG),
            NominationRepository::new(storage),
            SnapshotCache::new(cache),
            ApyCalculator::new(365),
        )
    }

    #[tokio::test]
    async fn test_fire() {
        let storage = InMemStorage::default();
        let cache = InMemCache::default();
        let scheduler = scheduler(chain(), storage.clone(), cache.clone());

        let outcome = scheduler.fire().await;
        assert_matches!(outcome, FireOutcome::Completed(report) => {
            assert_eq!(report.era, Some(ACTIVE_ERA));
            assert_eq!(report.saved, 2);
            assert_eq!(report.failed, 0);
            assert!(report.nominators_cached);
        });
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        assert_matches!(storage.get_active_era().await, Ok(Some(ACTIVE_ERA)));

        let alice = storage.get_nomination("alice", ACTIVE_ERA).await;
        assert_matches!(alice, Ok(Some(nomination)) => {
            assert_eq!(nomination.commission, 5.0);
            assert_eq!(nomination.nominators.len(), 1);
            // 2_000 / 2 validators * 95% * 365 eras / 1_000 stake.
            assert!((nomination.apy - 346.75).abs() < 1e-9);
        });
        let alice = storage.get_validator("alice").await;
        assert_matches!(alice, Ok(Some(validator)) if validator.display_name == "Alice");
        let bob = storage.get_validator("bob").await;
        assert_matches!(bob, Ok(Some(validator)) if validator.display_name == "bob");

        let cache = SnapshotCache::new(cache);
        let snapshot = cache
            .fetch::<ValidatorSnapshot>(ACTIVE_ERA, CacheKey::ValidatorDetail)
            .await;
        assert_matches!(snapshot, Some(snapshot) if snapshot.validators.len() == 2);
        let nominators = cache
            .fetch::<ChainNominatorSnapshot>(ACTIVE_ERA, CacheKey::ChainNominators)
            .await;
        assert_matches!(nominators, Some(snapshot) if snapshot.nominators.len() == 1);
    }

    #[tokio::test]
    async fn test_fire_skips_waiting_validators() {
        let mut chain = chain();
        chain.intentions = vec![ValidatorIntention {
            stash_id: "carol".to_owned(),
            commission: 1.0,
        }];
        let storage = InMemStorage::default();
        let cache = InMemCache::default();
        let scheduler = scheduler(chain, storage.clone(), cache.clone());

        assert_matches!(
            scheduler.fire().await,
            FireOutcome::Completed(report) if report.saved == 2 && report.failed == 0
        );
        assert_matches!(storage.get_validator("carol").await, Ok(None));

        let snapshot = SnapshotCache::new(cache)
            .fetch::<ValidatorSnapshot>(ACTIVE_ERA, CacheKey::ValidatorDetail)
            .await;
        assert_matches!(snapshot, Some(snapshot) => {
            assert_eq!(snapshot.validators.len(), 3);
            assert_eq!(snapshot.elected_count, 2);
        });
    }

    #[tokio::test]
    async fn test_fire_twice_detects_commission_change() {
        let storage = InMemStorage::default();
        let scheduler = scheduler(chain(), storage.clone(), InMemCache::default());
        assert_matches!(scheduler.fire().await, FireOutcome::Completed(_));

        // Next era, alice raises her commission.
        let mut chain = chain();
        chain.eras = std::sync::Arc::new(
            chain.eras.iter().copied().chain([ACTIVE_ERA + 1; 10]).collect(),
        );
        for validator in ["alice", "bob"] {
            let exposure = chain.exposures[&(ACTIVE_ERA, validator.to_owned())].clone();
            chain
                .exposures
                .insert((ACTIVE_ERA + 1, validator.to_owned()), exposure);
        }
        chain.validators.insert(ACTIVE_ERA + 1, vec!["alice".to_owned(), "bob".to_owned()]);
        chain.commissions.insert((ACTIVE_ERA + 1, "alice".to_owned()), 7.0);
        chain.commissions.insert((ACTIVE_ERA + 1, "bob".to_owned()), 10.0);
        let scheduler = self::scheduler(chain, storage.clone(), InMemCache::default());

        assert_matches!(
            scheduler.fire().await,
            FireOutcome::Completed(report) if report.saved == 2
        );

        let alice = storage.get_validator("alice").await;
        assert_matches!(
            alice,
            Ok(Some(validator)) if validator.commission_change == CommissionChange::Increased
        );
        let bob = storage.get_validator("bob").await;
        assert_matches!(
            bob,
            Ok(Some(validator)) if validator.commission_change == CommissionChange::None
        );
        assert_matches!(storage.get_nominations("alice").await, Ok(n) if n.len() == 2);
    }

    #[tokio::test]
    async fn test_overlapping_fire_is_skipped() {
        let mut chain = chain();
        chain.delay = Some(Duration::from_millis(100));
        let storage = InMemStorage::default();
        let scheduler = scheduler(chain.clone(), storage.clone(), InMemCache::default());

        let second = scheduler.clone();
        let (first, second) = tokio::join!(scheduler.fire(), async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let state = second.state();
            (state, second.fire().await)
        });

        assert_matches!(first, FireOutcome::Completed(report) if report.saved == 2);
        assert_eq!(second, (SchedulerState::Running, FireOutcome::Skipped));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(chain.nominators_calls(), 1);

        for validator in ["alice", "bob"] {
            assert_matches!(storage.get_nominations(validator).await, Ok(n) if n.len() == 1);
        }

        // A fire after completion runs again.
        assert_matches!(scheduler.fire().await, FireOutcome::Completed(_));
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_stop_cycle() {
        let cache = InMemCache::default();
        let scheduler = scheduler(chain(), FailingStorage, cache.clone());

        let outcome = scheduler.fire().await;
        assert_matches!(outcome, FireOutcome::Completed(report) => {
            assert_eq!(report.saved, 0);
            assert_eq!(report.failed, 2);
            assert!(report.nominators_cached);
        });
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_matches!(scheduler.fire().await, FireOutcome::Completed(_));
    }

    #[tokio::test]
    async fn test_chain_failure_releases_guard() {
        let mut chain = chain();
        chain.fail_exposure = true;
        let scheduler = scheduler(chain.clone(), InMemStorage::default(), InMemCache::default());

        let outcome = scheduler.fire().await;
        assert_matches!(outcome, FireOutcome::Completed(report) => {
            assert_eq!(report.era, Some(ACTIVE_ERA));
            assert_eq!(report.saved, 0);
            assert!(report.nominators_cached);
        });
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(chain.nominators_calls(), 1);

        let scheduler = self::scheduler(
            MockChain::default(),
            InMemStorage::default(),
            InMemCache::default(),
        );
        assert_matches!(
            scheduler.fire().await,
            FireOutcome::Completed(report) if report.era.is_none()
        );
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_running_guard() {
        let running = AtomicBool::new(false);

        let guard = RunningGuard::acquire(&running);
        assert!(guard.is_some());
        assert!(RunningGuard::acquire(&running).is_none());

        drop(guard);
        assert!(RunningGuard::acquire(&running).is_some());
    }
}
