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

//! Provides the public, backend-agnostic rendering contracts for Tessel.
//!
//! This module defines the 'what' of rendering: handles, descriptors, the
//! data layouts shared with shaders and the traits a backend implements.
//! The 'how' lives in `tessel-infra`. The lanes and agents only ever talk to
//! a `dyn GraphicsDevice`.

pub mod api;
pub mod error;
pub mod traits;

pub use self::api::*;
pub use self::error::{PipelineError, RenderError, ResourceError, SubmissionError};
pub use self::traits::{CommandEncoder, GraphicsDevice};
