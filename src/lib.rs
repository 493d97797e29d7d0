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

//! Eonhub - an off-chain payment hub with on-chain fraud accountability.
//!
//! This repository provides:
//! - Deterministic types & canonical encoding
//! - An augmented Merkle tree committing per-account allotments with a
//!   solvency-sum root
//! - An eon state machine driving per-epoch freeze/commit/rollover
//! - A bilateral IOU transfer protocol with hub countersignatures
//! - A challenge engine adjudicating balance, delivery and timeout disputes
//! - Monitoring via Prometheus metrics and structured logging

/// Ledger connector interface and the in-memory dev chain.
pub mod chain;
/// Core protocol primitives (types, crypto, tree, eons, challenges, state).
pub mod core;
/// Hub orchestrator and event distribution.
pub mod hub;
/// Observability (metrics, structured logging helpers).
pub mod monitoring;
