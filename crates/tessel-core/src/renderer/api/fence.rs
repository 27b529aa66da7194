// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Timeline fences used to track GPU completion.

/// An opaque handle to a timeline fence.
///
/// A timeline fence carries a monotonically increasing 64-bit value. Each
/// submission may ask the device to set the fence to a given value once the
/// GPU has finished executing it; waiting for value `n` therefore waits for
/// every submission that signals a value `<= n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceId(pub u64);

/// A request to signal `fence` with `value` when a submission completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceSignal {
    /// The fence to signal.
    pub fence: FenceId,
    /// The value to set; must be greater than any value signalled before.
    pub value: u64,
}

/// The outcome of a fence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence reached the awaited value.
    Signaled,
    /// The timeout elapsed first.
    TimedOut,
}
