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

//! Defines the hierarchy of error types for the rendering subsystem.

use crate::config::ConfigError;
use crate::memory::ArenaError;
use crate::renderer::api::{BufferId, BufferUsage, CommandKind, ComputePipelineId, ShaderModuleId};
use std::fmt;
use std::time::Duration;

/// An error related to the creation or management of a compute pipeline.
#[derive(Debug)]
pub enum PipelineError {
    /// The shader module referenced by the pipeline does not exist.
    InvalidShaderModule {
        /// The ID of the invalid shader module.
        id: ShaderModuleId,
        /// The label of the pipeline being created.
        pipeline_label: Option<String>,
    },
    /// The backend has no kernel for the requested entry point.
    UnknownEntryPoint {
        /// The entry point name that was not found.
        entry_point: String,
        /// The label of the pipeline being created.
        pipeline_label: Option<String>,
    },
    /// The specified compute pipeline ID is not valid.
    InvalidComputePipeline {
        /// The ID of the invalid compute pipeline.
        id: ComputePipelineId,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidShaderModule { id, pipeline_label } => {
                write!(
                    f,
                    "Invalid shader module {:?} for pipeline '{}'",
                    id,
                    pipeline_label.as_deref().unwrap_or("Unknown")
                )
            }
            PipelineError::UnknownEntryPoint {
                entry_point,
                pipeline_label,
            } => {
                write!(
                    f,
                    "Unknown entry point '{}' for pipeline '{}'",
                    entry_point,
                    pipeline_label.as_deref().unwrap_or("Unknown")
                )
            }
            PipelineError::InvalidComputePipeline { id } => {
                write!(f, "Invalid compute pipeline ID: {id:?}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// An error related to the creation or use of a GPU resource (buffers, fences, etc.).
#[derive(Debug)]
pub enum ResourceError {
    /// A pipeline-specific error occurred.
    Pipeline(PipelineError),
    /// A generic resource could not be found.
    NotFound,
    /// The handle or ID used to reference a resource is invalid.
    InvalidHandle,
    /// The buffer lacks a usage flag required by the operation.
    MissingUsage {
        /// The buffer being accessed.
        buffer: BufferId,
        /// The usage the operation needs.
        required: BufferUsage,
    },
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
    /// An attempt was made to access a buffer outside of its bounds.
    OutOfBounds {
        /// Start of the accessed range, in bytes.
        offset: u64,
        /// Length of the accessed range, in bytes.
        size: u64,
        /// Size of the resource, in bytes.
        capacity: u64,
    },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Pipeline(err) => write!(f, "Pipeline resource error: {err}"),
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::MissingUsage { buffer, required } => {
                write!(f, "Buffer {buffer:?} is missing required usage {required:?}")
            }
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
            ResourceError::OutOfBounds {
                offset,
                size,
                capacity,
            } => {
                write!(
                    f,
                    "Resource access out of bounds: {size} bytes at offset {offset} (capacity {capacity})."
                )
            }
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

/// An error raised by the command submission pipeline.
#[derive(Debug)]
pub enum SubmissionError {
    /// The device rejected a submission.
    SubmissionFailure {
        /// The queue the command was submitted to.
        kind: CommandKind,
        /// The debug label of the rejected command, if any.
        label: Option<String>,
        /// The backend's description of the failure.
        details: String,
    },
    /// A fence did not reach the awaited value before the watchdog expired.
    ///
    /// This usually means the GPU is hung; it is not recoverable by retrying.
    FenceTimeout {
        /// The fence value that was awaited.
        awaited: u64,
        /// The last value the fence was observed to have completed.
        completed: u64,
        /// The watchdog duration that elapsed.
        timeout: Duration,
    },
    /// The queue was stopped; no more work can be accepted.
    Stopped,
    /// A command was handed back in a state that cannot be submitted.
    InvalidCommand(String),
    /// A resource operation failed while preparing or reclaiming a command.
    Resource(ResourceError),
}

impl SubmissionError {
    /// `true` for errors after which the queue cannot make progress.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SubmissionError::FenceTimeout { .. } | SubmissionError::Stopped
        )
    }
}

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionError::SubmissionFailure {
                kind,
                label,
                details,
            } => {
                write!(
                    f,
                    "Submission of '{}' to the {kind} queue failed: {details}",
                    label.as_deref().unwrap_or("Unknown")
                )
            }
            SubmissionError::FenceTimeout {
                awaited,
                completed,
                timeout,
            } => {
                write!(
                    f,
                    "Fence timed out after {timeout:?} waiting for value {awaited} (completed: {completed}); the GPU may be hung"
                )
            }
            SubmissionError::Stopped => write!(f, "The submission queue has been stopped."),
            SubmissionError::InvalidCommand(msg) => write!(f, "Invalid command: {msg}"),
            SubmissionError::Resource(err) => write!(f, "Submission resource error: {err}"),
        }
    }
}

impl std::error::Error for SubmissionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubmissionError::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for SubmissionError {
    fn from(err: ResourceError) -> Self {
        SubmissionError::Resource(err)
    }
}

/// A high-level error that can occur while driving a frame.
#[derive(Debug)]
pub enum RenderError {
    /// An instance arena operation failed.
    Arena(ArenaError),
    /// Command submission failed.
    Submission(SubmissionError),
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// The engine configuration is invalid.
    Config(ConfigError),
    /// An unexpected or internal error occurred.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Arena(err) => write!(f, "Instance arena operation failed: {err}"),
            RenderError::Submission(err) => write!(f, "Command submission failed: {err}"),
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::Config(err) => write!(f, "Invalid engine configuration: {err}"),
            RenderError::Internal(msg) => {
                write!(f, "An internal or unexpected error occurred: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Arena(err) => Some(err),
            RenderError::Submission(err) => Some(err),
            RenderError::ResourceError(err) => Some(err),
            RenderError::Config(err) => Some(err),
            RenderError::Internal(_) => None,
        }
    }
}

impl From<ArenaError> for RenderError {
    fn from(err: ArenaError) -> Self {
        RenderError::Arena(err)
    }
}

impl From<SubmissionError> for RenderError {
    fn from(err: SubmissionError) -> Self {
        RenderError::Submission(err)
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

impl From<ConfigError> for RenderError {
    fn from(err: ConfigError) -> Self {
        RenderError::Config(err)
    }
}
