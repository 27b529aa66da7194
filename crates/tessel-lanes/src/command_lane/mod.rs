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

//! Command recording, pooling and submission.
//!
//! A [`CommandPool`] recycles allocator/encoder pairs per [`CommandKind`].
//! A [`SubmissionQueue`] owns a pool, a timeline fence and a worker thread
//! that hands deferred commands to the GPU in FIFO order.
//!
//! [`CommandKind`]: tessel_core::renderer::CommandKind

mod pool;
mod queue;

pub use self::pool::{Command, CommandPool, CommandState, PoolStats};
pub use self::queue::{SubmissionQueue, SubmissionTicket};
