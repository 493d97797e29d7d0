// Copyright (c) 2026 Eonhub
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Collector construction or registration failed.
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Current eon number gauge.
    pub current_eon: IntGauge,
    /// Latest observed ledger height.
    pub block_height: IntGauge,
    /// Registered event watchers gauge.
    pub watchers: IntGauge,

    /// Admitted off-chain transfers.
    pub transfers_total: IntCounter,
    /// Credited deposits.
    pub deposits_total: IntCounter,
    /// Admitted withdrawals.
    pub withdrawals_total: IntCounter,
    /// Closed eons.
    pub eons_closed_total: IntCounter,
    /// Adjudicated challenges.
    pub challenges_total: IntCounter,
    /// Challenges resolved against the hub.
    pub hub_at_fault_total: IntCounter,
    /// Watchers dropped for queue overflow.
    pub watcher_overflow_total: IntCounter,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let current_eon = IntGauge::new("eonhub_current_eon", "Current eon number")
            .map_err(|_| MetricsError::Prom)?;
        let block_height = IntGauge::new("eonhub_block_height", "Latest observed ledger height")
            .map_err(|_| MetricsError::Prom)?;
        let watchers = IntGauge::new("eonhub_watchers", "Registered event watchers")
            .map_err(|_| MetricsError::Prom)?;

        let transfers_total =
            IntCounter::new("eonhub_transfers_total", "Admitted off-chain transfers")
                .map_err(|_| MetricsError::Prom)?;
        let deposits_total = IntCounter::new("eonhub_deposits_total", "Credited deposits")
            .map_err(|_| MetricsError::Prom)?;
        let withdrawals_total =
            IntCounter::new("eonhub_withdrawals_total", "Admitted withdrawals")
                .map_err(|_| MetricsError::Prom)?;
        let eons_closed_total = IntCounter::new("eonhub_eons_closed_total", "Closed eons")
            .map_err(|_| MetricsError::Prom)?;
        let challenges_total =
            IntCounter::new("eonhub_challenges_total", "Adjudicated challenges")
                .map_err(|_| MetricsError::Prom)?;
        let hub_at_fault_total = IntCounter::new(
            "eonhub_hub_at_fault_total",
            "Challenges resolved against the hub",
        )
        .map_err(|_| MetricsError::Prom)?;
        let watcher_overflow_total = IntCounter::new(
            "eonhub_watcher_overflow_total",
            "Watchers dropped for queue overflow",
        )
        .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(current_eon.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(block_height.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(watchers.clone()))
            .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(transfers_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(deposits_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(withdrawals_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(eons_closed_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(challenges_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(hub_at_fault_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(watcher_overflow_total.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            current_eon,
            block_height,
            watchers,
            transfers_total,
            deposits_total,
            withdrawals_total,
            eons_closed_total,
            challenges_total,
            hub_at_fault_total,
            watcher_overflow_total,
        })
    }
}
