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

//! Core protocol primitives: types, crypto, tree, eon machine, challenges,
//! durable state.

/// Augmented Merkle tree and proofs.
pub mod amt;
/// Fraud-proof verification engine.
pub mod challenge;
/// Crypto primitives.
pub mod crypto;
/// Eon state machine.
pub mod eon;
/// Durable state.
pub mod state;
/// Deterministic core types.
pub mod types;
