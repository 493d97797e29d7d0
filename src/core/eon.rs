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

//! Eon state machine driven by ledger block height.
//!
//! `OPEN -> FREEZE` fires when the height passes
//! `start_height + blocks_per_eon`. The controller is a pure state machine:
//! the orchestrator performs the freeze (snapshot + root commitment) and then
//! acknowledges with [`EonController::root_committed`], which closes the eon
//! and immediately opens the next one. Height deltas are replayed block by
//! block, so a controller that missed ticks catches up without ever skipping
//! an eon number.

use thiserror::Error;

/// Eon controller errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EonError {
    /// `blocks_per_eon` was zero.
    #[error("blocks_per_eon must be positive")]
    InvalidConfig,
    /// Observed height is below the last observed height.
    #[error("block height went backwards")]
    HeightRegression,
    /// `root_committed` called while no eon is frozen.
    #[error("no freeze in progress")]
    NotFrozen,
}

/// Phase of the current eon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EonPhase {
    /// Transfers admitted.
    Open,
    /// Snapshot in progress; transfers rejected until the root is committed.
    Freeze,
}

/// One eon's identity and block span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EonSpan {
    /// Eon number, starting at 0 and strictly sequential.
    pub number: u64,
    /// First block height of the eon.
    pub start_height: u64,
}

/// Action the orchestrator must perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EonAction {
    /// Snapshot all accounts and commit the root for this eon.
    Freeze(EonSpan),
}

/// Height-driven epoch controller.
#[derive(Clone, Debug)]
pub struct EonController {
    blocks_per_eon: u64,
    current: EonSpan,
    phase: EonPhase,
    last_height: u64,
}

impl EonController {
    /// Start eon 0 at `start_height`.
    pub fn new(start_height: u64, blocks_per_eon: u64) -> Result<Self, EonError> {
        if blocks_per_eon == 0 {
            return Err(EonError::InvalidConfig);
        }
        Ok(Self {
            blocks_per_eon,
            current: EonSpan {
                number: 0,
                start_height,
            },
            phase: EonPhase::Open,
            last_height: start_height,
        })
    }

    /// Resume at `span` after a restart, picking up where a previously
    /// committed root left off. The controller opens `span` directly; heights
    /// observed afterwards replay from `span.start_height`.
    pub fn resume(span: EonSpan, blocks_per_eon: u64) -> Result<Self, EonError> {
        if blocks_per_eon == 0 {
            return Err(EonError::InvalidConfig);
        }
        Ok(Self {
            blocks_per_eon,
            current: span,
            phase: EonPhase::Open,
            last_height: span.start_height,
        })
    }

    /// Current eon span.
    pub fn current(&self) -> EonSpan {
        self.current
    }

    /// Current phase.
    pub fn phase(&self) -> EonPhase {
        self.phase
    }

    /// Eon length in blocks.
    pub fn blocks_per_eon(&self) -> u64 {
        self.blocks_per_eon
    }

    /// Last observed chain height.
    pub fn last_height(&self) -> u64 {
        self.last_height
    }

    /// Observe a new chain height, replaying every intermediate block.
    ///
    /// At most one `Freeze` is emitted per call: while frozen the controller
    /// holds position (the root for the frozen eon must be committed before
    /// the next eon can begin), so later boundaries are picked up by the
    /// `on_height` calls that follow `root_committed`.
    pub fn on_height(&mut self, height: u64) -> Result<Option<EonAction>, EonError> {
        if height < self.last_height {
            return Err(EonError::HeightRegression);
        }

        let mut action = None;
        for h in self.last_height + 1..=height {
            self.last_height = h;
            if self.phase == EonPhase::Open
                && h >= self.current.start_height + self.blocks_per_eon
            {
                self.phase = EonPhase::Freeze;
                action = Some(EonAction::Freeze(self.current));
                break;
            }
        }
        Ok(action)
    }

    /// Acknowledge that the frozen eon's root was handed to the ledger
    /// connector. Closes it and opens the next eon.
    pub fn root_committed(&mut self) -> Result<EonSpan, EonError> {
        if self.phase != EonPhase::Freeze {
            return Err(EonError::NotFrozen);
        }
        self.current = EonSpan {
            number: self.current.number + 1,
            start_height: self.current.start_height + self.blocks_per_eon,
        };
        self.phase = EonPhase::Open;
        Ok(self.current)
    }
}
