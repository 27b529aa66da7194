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

//! GPU objects shared by every render lane, created once at startup.

use super::shaders::CULL_INSTANCES_WGSL;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tessel_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, ComputePipelineDescriptor, ComputePipelineId,
    GraphicsDevice, ResourceError, ShaderModuleDescriptor, ShaderModuleId, ShaderSourceData,
    CULL_ENTRY_POINT,
};

/// Size of the constant-zero buffer, in bytes.
pub(crate) const ZERO_BUFFER_SIZE: u64 = 16;

/// Long-lived GPU objects: the zero buffer and the culling pipeline.
///
/// Built explicitly before the first frame and destroyed when dropped.
pub struct GraphicsResources {
    device: Arc<dyn GraphicsDevice>,
    zero_buffer: BufferId,
    cull_module: ShaderModuleId,
    cull_pipeline: ComputePipelineId,
}

impl fmt::Debug for GraphicsResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsResources")
            .field("zero_buffer", &self.zero_buffer)
            .field("cull_module", &self.cull_module)
            .field("cull_pipeline", &self.cull_pipeline)
            .finish_non_exhaustive()
    }
}

impl GraphicsResources {
    /// Creates every shared object. Nothing is leaked on failure.
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Result<Self, ResourceError> {
        log::info!("GraphicsResources: Initializing shared GPU objects...");

        let zero_buffer = device.create_buffer_with_data(
            &BufferDescriptor::new("tessel_zero", ZERO_BUFFER_SIZE, BufferUsage::COPY_SRC),
            &[0; ZERO_BUFFER_SIZE as usize],
        )?;

        let cull_module = match device.create_shader_module(&ShaderModuleDescriptor {
            label: Some("cull_instances"),
            source: ShaderSourceData::Wgsl(Cow::Borrowed(CULL_INSTANCES_WGSL)),
        }) {
            Ok(module) => module,
            Err(e) => {
                let _ = device.destroy_buffer(zero_buffer);
                return Err(e);
            }
        };

        let cull_pipeline = match device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some(Cow::Borrowed("cull_instances_pipeline")),
            module: cull_module,
            entry_point: Cow::Borrowed(CULL_ENTRY_POINT),
        }) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                let _ = device.destroy_shader_module(cull_module);
                let _ = device.destroy_buffer(zero_buffer);
                return Err(e);
            }
        };

        Ok(Self {
            device,
            zero_buffer,
            cull_module,
            cull_pipeline,
        })
    }

    /// The device the objects belong to.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// A small `COPY_SRC` buffer filled with zeros.
    pub fn zero_buffer(&self) -> BufferId {
        self.zero_buffer
    }

    /// The frustum-culling compute pipeline.
    pub fn cull_pipeline(&self) -> ComputePipelineId {
        self.cull_pipeline
    }
}

impl Drop for GraphicsResources {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_compute_pipeline(self.cull_pipeline) {
            log::warn!("GraphicsResources: Failed to destroy cull pipeline: {:?}", e);
        }
        if let Err(e) = self.device.destroy_shader_module(self.cull_module) {
            log::warn!("GraphicsResources: Failed to destroy cull shader: {:?}", e);
        }
        if let Err(e) = self.device.destroy_buffer(self.zero_buffer) {
            log::warn!("GraphicsResources: Failed to destroy zero buffer: {:?}", e);
        }
    }
}
