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

//! Augmented Merkle tree: per-eon authenticated balance commitment.

/// Membership proofs and augmented hashing.
pub mod proof;
/// The per-eon balance tree.
pub mod tree;
/// Plain Merkle tree over per-eon transaction sets.
pub mod txset;
