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

// Tessel Sandbox
// Drives the render agent over a small procedural scene.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tessel_agents::RenderAgent;
use tessel_core::config::EngineConfig;
use tessel_core::math::{Aabb, Mat4, Quat, Vec3};
use tessel_core::scene::{CameraId, MeshRange, NodeId, NodeRenderData, SceneGraph};
use tessel_infra::SoftwareDevice;

const CONFIG_PATH: &str = "tessel.toml";
const GRID_SIZE: i32 = 8;
const FRAME_COUNT: u64 = 240;
const CAMERA: CameraId = CameraId(0);

struct SandboxScene {
    nodes: HashMap<NodeId, NodeRenderData>,
    camera_yaw: f32,
}

impl SandboxScene {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        let mut next_id = 0;
        for x in -GRID_SIZE / 2..GRID_SIZE / 2 {
            for z in -GRID_SIZE / 2..GRID_SIZE / 2 {
                let transform = Mat4::from_scale_rotation_translation(
                    Vec3::splat(0.8),
                    Quat::from_rotation_y(next_id as f32 * 0.3),
                    Vec3::new(x as f32 * 4.0, 0.0, z as f32 * 4.0),
                );
                nodes.insert(
                    NodeId(next_id),
                    NodeRenderData {
                        world_transform: transform,
                        local_bounds: Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE),
                        mesh: MeshRange {
                            index_count: 36,
                            first_index: 0,
                            base_vertex: 0,
                        },
                        material_index: (next_id % 4) as u32,
                    },
                );
                next_id += 1;
            }
        }
        Self {
            nodes,
            camera_yaw: 0.0,
        }
    }

    fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl SceneGraph for SandboxScene {
    fn node_render_data(&self, node: NodeId) -> Option<NodeRenderData> {
        self.nodes.get(&node).copied()
    }

    fn first_enabled_camera(&self) -> Option<CameraId> {
        Some(CAMERA)
    }

    fn camera_view_projection(&self, camera: CameraId) -> Option<Mat4> {
        if camera != CAMERA {
            return None;
        }
        let eye = Vec3::new(self.camera_yaw.sin() * 10.0, 6.0, self.camera_yaw.cos() * 10.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(50f32.to_radians(), 16.0 / 9.0, 0.1, 60.0);
        Some(projection * view)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = EngineConfig::load_or_default(CONFIG_PATH)?;
    let device = SoftwareDevice::new();
    let mut agent = RenderAgent::new(Arc::new(device.clone()), config)?;
    let mut scene = SandboxScene::new();

    let ids = scene.node_ids();
    let (immediate, streamed) = ids.split_at(ids.len() / 2);
    for node in immediate {
        agent.add_node(*node, false);
    }
    for node in streamed {
        agent.add_node(*node, true);
    }

    for frame in 0..FRAME_COUNT {
        scene.camera_yaw = frame as f32 * 0.02;

        if frame == FRAME_COUNT / 2 {
            log::info!("Sandbox: Removing every other node");
            for node in ids.iter().step_by(2) {
                agent.remove_node(*node, true);
            }
        }

        let report = agent.render_frame(&scene)?;
        if frame % 30 == 0 {
            log::info!(
                "Frame {}: slot {}, {} draws submitted, {} visible (+{} -{} nodes)",
                report.frame_index,
                report.frame_slot,
                report.submitted_draws,
                report.visible_draws,
                report.tick.added.len(),
                report.tick.removed.len()
            );
        }
    }

    agent.wait_idle()?;
    log::info!(
        "Sandbox: {} visible draws after {} frames",
        agent.draw_commands_count(),
        agent.frame_count()
    );
    drop(agent);

    let stats = device.stats();
    log::info!(
        "Sandbox: {} submissions, peak {} bytes of GPU memory, {} buffers leaked",
        stats.submissions,
        stats.peak_allocated_bytes,
        stats.live_buffers
    );
    Ok(())
}
