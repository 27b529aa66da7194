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

//! Shader modules, compute pipelines and dispatch descriptors.

use super::buffer::BufferId;
use std::borrow::Cow;

/// An opaque handle to a compiled shader module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderModuleId(pub u64);

/// The source code of a shader module.
#[derive(Debug, Clone)]
pub enum ShaderSourceData<'a> {
    /// WGSL source text.
    Wgsl(Cow<'a, str>),
}

/// A descriptor used to create a [`ShaderModuleId`].
#[derive(Debug, Clone)]
pub struct ShaderModuleDescriptor<'a> {
    /// An optional debug label for the module.
    pub label: Option<&'a str>,
    /// The shader source.
    pub source: ShaderSourceData<'a>,
}

/// An opaque handle to a compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineId(pub u64);

/// A descriptor used to create a [`ComputePipelineId`].
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor<'a> {
    /// An optional debug label for the pipeline.
    pub label: Option<Cow<'a, str>>,
    /// The module holding the compute entry point.
    pub module: ShaderModuleId,
    /// Name of the `@compute` function in the module.
    pub entry_point: Cow<'a, str>,
}

/// Binds a whole buffer to a slot of the pipeline's single bind group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    /// The `@binding` index in the shader.
    pub binding: u32,
    /// The bound buffer.
    pub buffer: BufferId,
}

/// Everything needed to record one compute dispatch.
#[derive(Debug, Clone, Copy)]
pub struct ComputeDispatch<'a> {
    /// An optional debug label for the dispatch.
    pub label: Option<&'a str>,
    /// The pipeline to run.
    pub pipeline: ComputePipelineId,
    /// The buffers bound for this dispatch.
    pub bindings: &'a [BufferBinding],
    /// Number of workgroups on each axis.
    pub workgroups: [u32; 3],
}

impl ComputeDispatch<'_> {
    /// Number of workgroups needed to cover `items` with groups of `group_size`.
    #[inline]
    pub fn workgroups_for(items: u32, group_size: u32) -> u32 {
        items.div_ceil(group_size.max(1))
    }

    /// Looks up the buffer bound at `binding`.
    pub fn binding(&self, binding: u32) -> Option<BufferId> {
        self.bindings
            .iter()
            .find(|b| b.binding == binding)
            .map(|b| b.buffer)
    }
}
