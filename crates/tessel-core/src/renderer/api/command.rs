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

//! Command recording handles and queue kinds.

use std::fmt;

/// The hardware queue a command targets.
///
/// Commands are pooled per kind; a command allocated for one kind is only ever
/// submitted to the queue of that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    /// General graphics/compute queue.
    Graphics,
    /// Copy-only queue used for uploads.
    Transfer,
}

impl CommandKind {
    /// Every kind, in a stable order.
    pub const ALL: [CommandKind; 2] = [CommandKind::Graphics, CommandKind::Transfer];
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Graphics => write!(f, "graphics"),
            CommandKind::Transfer => write!(f, "transfer"),
        }
    }
}

/// An opaque handle to a backend command allocator.
///
/// The allocator owns the memory that recorded commands live in; resetting it
/// invalidates everything recorded from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandAllocatorId(pub u64);
