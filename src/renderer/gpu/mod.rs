//! wgpu implementation of [`RenderBackend`].
//!
//! Every draw opens a short render pass against the current target with
//! load/store ops, so passes can be interleaved with uniform copies in a
//! single command encoder. Uniform writes are staged and copied inside the
//! encoder to keep them ordered with the draws that read them.

mod context;
mod programs;
mod textures;

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use wgpu::util::DeviceExt;
use winit::window::Window;

use self::context::{GpuContext, DEPTH_FORMAT};
use self::programs::{GpuProgram, Layouts, PipelineCache, PipelineKey, UNIFORM_CAPACITY};
use self::textures::{Fallbacks, GpuTexture};
use super::backend::{
    MeshId, Primitive, ProgramId, RenderBackend, RenderTarget, TextureId, TextureSlot,
    VertexLayout,
};
use super::state::{RenderState, Viewport};
use crate::error::RenderError;
use crate::settings::RenderSettings;

const STAGING_CAPACITY: u64 = 4 * 1024 * 1024;
const STAGING_ALIGNMENT: u64 = 256;

struct GpuMesh {
    buffer: wgpu::Buffer,
    layout: VertexLayout,
    vertex_count: u32,
}

struct Frame {
    surface: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// Views and formats of the target the next pass renders into.
struct Attachments<'a> {
    color: Option<&'a wgpu::TextureView>,
    color_format: Option<wgpu::TextureFormat>,
    depth: Option<&'a wgpu::TextureView>,
    width: u32,
    height: u32,
}

struct CopyDepth {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
}

impl CopyDepth {
    fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("CopyDepthLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("CopyDepthPipelineLayout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("copy_depth"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shader/copy_depth.wgsl").into()),
        });
        let pipeline =
            super::pipeline_builder::PipelineBuilder::new(device, &pipeline_layout, &shader)
            .with_label("CopyDepthPipeline")
            .with_depth(DEPTH_FORMAT, false, true)
            .build();
        Self { layout, pipeline }
    }
}

/// Renders through wgpu into a window surface.
pub struct WgpuBackend {
    context: GpuContext,
    layouts: Layouts,
    color_sampler: wgpu::Sampler,
    comparison_sampler: wgpu::Sampler,
    fallbacks: Fallbacks,
    screen_depth: GpuTexture,
    textures: HashMap<TextureId, GpuTexture>,
    texture_groups: HashMap<[u32; TextureSlot::COUNT], wgpu::BindGroup>,
    programs: HashMap<ProgramId, GpuProgram>,
    pipelines: PipelineCache,
    meshes: HashMap<MeshId, GpuMesh>,
    copy_depth: CopyDepth,
    staging: wgpu::Buffer,
    staging_offset: u64,
    encoder: Option<wgpu::CommandEncoder>,
    frame: Option<Frame>,
    state: RenderState,
    bound: [Option<TextureId>; TextureSlot::COUNT],
    next_texture: u32,
    next_mesh: u32,
}

impl WgpuBackend {
    pub async fn new(window: Arc<Window>, settings: &RenderSettings) -> Result<Self, RenderError> {
        let context = GpuContext::new(window, settings).await?;
        let device = &context.device;

        let layouts = Layouts::new(device);
        let color_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ColorSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let comparison_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ShadowSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let fallbacks = Fallbacks::new(device, &context.queue);
        let screen_depth =
            GpuTexture::framebuffer(device, context.config.width, context.config.height);
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("UniformStaging"),
            size: STAGING_CAPACITY,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let copy_depth = CopyDepth::new(device);
        let viewport = Viewport::new(context.config.width, context.config.height);

        info!("wgpu backend ready");
        Ok(Self {
            context,
            layouts,
            color_sampler,
            comparison_sampler,
            fallbacks,
            screen_depth,
            textures: HashMap::new(),
            texture_groups: HashMap::new(),
            programs: HashMap::new(),
            pipelines: PipelineCache::default(),
            meshes: HashMap::new(),
            copy_depth,
            staging,
            staging_offset: 0,
            encoder: None,
            frame: None,
            state: RenderState::new(viewport),
            bound: [None; TextureSlot::COUNT],
            next_texture: 1,
            next_mesh: 1,
        })
    }

    pub fn surface_size(&self) -> Viewport {
        Viewport::new(self.context.config.width, self.context.config.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.context.resize(width, height) {
            self.screen_depth = GpuTexture::framebuffer(&self.context.device, width, height);
        }
    }

    /// Acquires the next surface image. Returns `false` when the frame has
    /// to be skipped: the surface timed out, or was lost or outdated and
    /// has been reconfigured. Any other surface error is fatal.
    pub fn begin_frame(&mut self) -> Result<bool, RenderError> {
        let surface = match self.context.surface.get_current_texture() {
            Ok(surface) => surface,
            Err(err) if skips_frame(&err) => {
                if !matches!(err, wgpu::SurfaceError::Timeout) {
                    self.context.reconfigure();
                }
                warn!("Skipping frame: {err}");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };
        self.context
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let view = surface
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(Frame { surface, view });
        Ok(true)
    }

    /// Submits the frame's commands and presents it.
    pub fn end_frame(&mut self) {
        self.submit();
        if let Some(frame) = self.frame.take() {
            frame.surface.present();
            if let Some(err) = pollster::block_on(self.context.device.pop_error_scope()) {
                error!("GPU validation error: {err}");
            }
        }
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.context.queue.submit(Some(encoder.finish()));
        }
        self.staging_offset = 0;
    }

    /// Takes the frame encoder, creating one lazily; callers put it back
    /// with [`WgpuBackend::restore_encoder`] once their passes are recorded.
    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        match self.encoder.take() {
            Some(encoder) => encoder,
            None => self
                .context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("FrameEncoder"),
                }),
        }
    }

    fn restore_encoder(&mut self, encoder: wgpu::CommandEncoder) {
        self.encoder = Some(encoder);
    }

    fn allocate(&mut self, texture: GpuTexture) -> TextureId {
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(id, texture);
        id
    }

    fn attachments(&self, target: RenderTarget) -> Option<Attachments<'_>> {
        match target {
            RenderTarget::Screen => {
                let frame = self.frame.as_ref()?;
                Some(Attachments {
                    color: Some(&frame.view),
                    color_format: Some(self.context.config.format),
                    depth: self.screen_depth.depth_attachment(),
                    width: self.context.config.width,
                    height: self.context.config.height,
                })
            }
            RenderTarget::Framebuffer(id) => {
                let texture = self.textures.get(&id)?;
                let (width, height) = texture.size();
                Some(Attachments {
                    color: texture.color_attachment(),
                    color_format: Some(textures::COLOR_FORMAT),
                    depth: texture.depth_attachment(),
                    width,
                    height,
                })
            }
            RenderTarget::DepthMap(id) => {
                let texture = self.textures.get(&id)?;
                let (width, height) = texture.size();
                Some(Attachments {
                    color: None,
                    color_format: None,
                    depth: texture.depth_attachment(),
                    width,
                    height,
                })
            }
            RenderTarget::CubemapFace(id, face) => {
                let texture = self.textures.get(&id)?;
                let (width, height) = texture.size();
                Some(Attachments {
                    color: texture.face(face),
                    color_format: Some(textures::COLOR_FORMAT),
                    depth: None,
                    width,
                    height,
                })
            }
        }
    }

    /// Texture ids per slot after dropping anything that cannot be sampled
    /// there or is the texture being rendered into; 0 selects the fallback.
    fn slot_key(&self, target: Option<TextureId>) -> [u32; TextureSlot::COUNT] {
        let mut key = [0; TextureSlot::COUNT];
        for (index, bound) in self.bound.iter().enumerate() {
            let Some(id) = *bound else {
                continue;
            };
            if Some(id) == target {
                continue;
            }
            let Some(texture) = self.textures.get(&id) else {
                continue;
            };
            let usable = match index {
                i if i == TextureSlot::Main.index() => texture.sampled_color().is_some(),
                i if i == TextureSlot::Skybox.index() => texture.sampled_cube().is_some(),
                _ => texture.sampled_depth().is_some(),
            };
            if usable {
                key[index] = id.0;
            }
        }
        key
    }

    fn ensure_texture_group(&mut self, key: [u32; TextureSlot::COUNT]) {
        if self.texture_groups.contains_key(&key) {
            return;
        }
        let view = |slot: TextureSlot| self.textures.get(&TextureId(key[slot.index()]));
        let main = view(TextureSlot::Main)
            .and_then(GpuTexture::sampled_color)
            .or_else(|| self.fallbacks.color.sampled_color());
        let skybox = view(TextureSlot::Skybox)
            .and_then(GpuTexture::sampled_cube)
            .or_else(|| self.fallbacks.cube.sampled_cube());
        let depth_of = |slot: TextureSlot| {
            view(slot)
                .and_then(GpuTexture::sampled_depth)
                .or_else(|| self.fallbacks.depth.sampled_depth())
        };
        let (Some(main), Some(skybox), Some(shadows0), Some(shadows1), Some(depth)) = (
            main,
            skybox,
            depth_of(TextureSlot::Shadows0),
            depth_of(TextureSlot::Shadows1),
            depth_of(TextureSlot::Depth),
        ) else {
            error!("Fallback textures are missing a view");
            return;
        };
        let group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("TextureSlots"),
                layout: &self.layouts.textures,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(main),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.color_sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(skybox),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(shadows0),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(shadows1),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: wgpu::BindingResource::Sampler(&self.comparison_sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 6,
                        resource: wgpu::BindingResource::TextureView(depth),
                    },
                ],
            });
        self.texture_groups.insert(key, group);
    }

    fn draw(
        &mut self,
        program: ProgramId,
        primitive: Primitive,
        layout: VertexLayout,
        buffer: &wgpu::Buffer,
        vertex_count: u32,
    ) {
        if vertex_count == 0 {
            return;
        }
        let target = self.state.target;
        let Some((color_format, has_depth, width, height)) = self
            .attachments(target)
            .map(|a| (a.color_format, a.depth.is_some(), a.width, a.height))
        else {
            warn!("Draw into unavailable target {:?} skipped", target);
            return;
        };
        let scissor = match self.state.effective_scissor() {
            Some(rect) => {
                let rect = rect.intersect(&Viewport::new(width, height).full_rect());
                if rect.is_empty() {
                    return;
                }
                Some(rect)
            }
            None => None,
        };

        let Some(gpu_program) = self.programs.get(&program) else {
            warn!("Draw with unknown program {:?} skipped", program);
            return;
        };
        let key = PipelineKey::new(
            program,
            primitive,
            layout,
            &self.state,
            color_format,
            has_depth,
        );
        self.pipelines
            .prepare(&self.context.device, &self.layouts, gpu_program, key);
        let slots = self.slot_key(target.texture());
        self.ensure_texture_group(slots);

        let mut encoder = self.take_encoder();
        if let (Some(attachments), Some(gpu_program), Some(pipeline), Some(textures)) = (
            self.attachments(target),
            self.programs.get(&program),
            self.pipelines.get(&key),
            self.texture_groups.get(&slots),
        ) {
            let mut pass = begin_pass(&mut encoder, &attachments, None, false);
            pass.set_viewport(
                0.0,
                0.0,
                self.state.viewport.width.min(width).max(1) as f32,
                self.state.viewport.height.min(height).max(1) as f32,
                0.0,
                1.0,
            );
            if let Some(rect) = scissor {
                pass.set_scissor_rect(rect.x0 as u32, rect.y0 as u32, rect.width(), rect.height());
            }
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &gpu_program.uniform_group, &[]);
            pass.set_bind_group(1, textures, &[]);
            pass.set_vertex_buffer(0, buffer.slice(..));
            pass.draw(0..vertex_count, 0..1);
        }
        self.restore_encoder(encoder);
    }
}

/// Surface errors that only cost the current frame.
fn skips_frame(err: &wgpu::SurfaceError) -> bool {
    matches!(
        err,
        wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost
    )
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    attachments: &Attachments<'_>,
    clear_color: Option<[f32; 4]>,
    clear_depth: bool,
) -> wgpu::RenderPass<'e> {
    let color_load = match clear_color {
        Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        }),
        None => wgpu::LoadOp::Load,
    };
    let depth_load = if clear_depth {
        wgpu::LoadOp::Clear(1.0)
    } else {
        wgpu::LoadOp::Load
    };
    let color_attachments: Vec<_> = attachments
        .color
        .map(|view| wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: color_load,
                store: wgpu::StoreOp::Store,
            },
        })
        .into_iter()
        .map(Some)
        .collect();
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Pass"),
        color_attachments: &color_attachments,
        depth_stencil_attachment: attachments.depth.map(|view| {
            wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

impl RenderBackend for WgpuBackend {
    fn apply_state(&mut self, state: &RenderState) {
        self.state = *state;
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: bool) {
        let target = self.state.target;
        let mut encoder = self.take_encoder();
        match self.attachments(target) {
            Some(attachments) => {
                let attachments = Attachments {
                    color: color.and(attachments.color),
                    depth: if depth { attachments.depth } else { None },
                    ..attachments
                };
                if attachments.color.is_some() || attachments.depth.is_some() {
                    let _pass = begin_pass(&mut encoder, &attachments, color, depth);
                }
            }
            None => warn!("Clear of unavailable target {:?} skipped", target),
        }
        self.restore_encoder(encoder);
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> TextureId {
        let texture = GpuTexture::color(
            &self.context.device,
            &self.context.queue,
            width,
            height,
            rgba,
        );
        self.allocate(texture)
    }

    fn create_depth_map(&mut self, resolution: u32) -> TextureId {
        let texture = GpuTexture::depth_map(&self.context.device, resolution);
        self.allocate(texture)
    }

    fn create_cubemap(&mut self, size: u32) -> TextureId {
        let texture = GpuTexture::cubemap(&self.context.device, size);
        self.allocate(texture)
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> TextureId {
        let texture = GpuTexture::framebuffer(&self.context.device, width, height);
        self.allocate(texture)
    }

    fn release_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            debug!("Release of unknown texture {:?}", texture);
        }
        self.texture_groups
            .retain(|key, _| !key.contains(&texture.0));
        for bound in &mut self.bound {
            if *bound == Some(texture) {
                *bound = None;
            }
        }
    }

    fn copy_depth(&mut self, src: TextureId, dst: TextureId) {
        let Some(source) = self.textures.get(&src).and_then(GpuTexture::sampled_depth) else {
            warn!("Depth copy from {:?} without depth skipped", src);
            return;
        };
        let group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("CopyDepthGroup"),
                layout: &self.copy_depth.layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                }],
            });
        let mut encoder = self.take_encoder();
        match self.textures.get(&dst).and_then(GpuTexture::depth_attachment) {
            Some(depth) => {
                let attachments = Attachments {
                    color: None,
                    color_format: None,
                    depth: Some(depth),
                    width: 0,
                    height: 0,
                };
                let mut pass = begin_pass(&mut encoder, &attachments, None, false);
                pass.set_pipeline(&self.copy_depth.pipeline);
                pass.set_bind_group(0, &group, &[]);
                pass.draw(0..3, 0..1);
            }
            None => warn!("Depth copy into {:?} without depth skipped", dst),
        }
        self.restore_encoder(encoder);
    }

    fn compile_program(
        &mut self,
        id: ProgramId,
        name: &str,
        source: &str,
    ) -> Result<(), RenderError> {
        let program = GpuProgram::compile(&self.context.device, &self.layouts, name, source)?;
        self.pipelines.invalidate(id);
        if self.programs.insert(id, program).is_some() {
            debug!("Replaced program `{name}`");
        }
        Ok(())
    }

    fn write_uniforms(&mut self, program: ProgramId, bytes: &[u8]) {
        let size = bytes.len() as u64;
        if size == 0 || size > UNIFORM_CAPACITY || size % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            warn!("Uniform block of {size} bytes for {:?} rejected", program);
            return;
        }
        if !self.programs.contains_key(&program) {
            warn!("Uniforms for unknown program {:?} dropped", program);
            return;
        }
        if self.staging_offset + size > STAGING_CAPACITY {
            self.submit();
        }
        let offset = self.staging_offset;
        self.staging_offset += size.div_ceil(STAGING_ALIGNMENT) * STAGING_ALIGNMENT;
        self.context.queue.write_buffer(&self.staging, offset, bytes);
        let mut encoder = self.take_encoder();
        if let Some(gpu_program) = self.programs.get(&program) {
            encoder.copy_buffer_to_buffer(&self.staging, offset, &gpu_program.uniforms, 0, size);
        }
        self.restore_encoder(encoder);
    }

    fn bind_texture(&mut self, slot: TextureSlot, texture: Option<TextureId>) {
        self.bound[slot.index()] = texture;
    }

    fn create_mesh(&mut self, layout: VertexLayout, bytes: &[u8], vertex_count: u32) -> MeshId {
        let buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh"),
                contents: bytes,
                usage: wgpu::BufferUsages::VERTEX,
            });
        let id = MeshId(self.next_mesh);
        self.next_mesh += 1;
        self.meshes.insert(
            id,
            GpuMesh {
                buffer,
                layout,
                vertex_count,
            },
        );
        id
    }

    fn draw_mesh(&mut self, program: ProgramId, mesh: MeshId) {
        let Some((buffer, layout, count)) = self
            .meshes
            .get(&mesh)
            .map(|m| (m.buffer.clone(), m.layout, m.vertex_count))
        else {
            warn!("Draw of unknown mesh {:?} skipped", mesh);
            return;
        };
        self.draw(program, Primitive::Triangles, layout, &buffer, count);
    }

    fn release_mesh(&mut self, mesh: MeshId) {
        self.meshes.remove(&mesh);
    }

    fn draw_vertices(
        &mut self,
        program: ProgramId,
        primitive: Primitive,
        layout: VertexLayout,
        bytes: &[u8],
    ) {
        let vertex_count = (bytes.len() / layout.stride()) as u32;
        if vertex_count == 0 {
            return;
        }
        let buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Vertices"),
                contents: bytes,
                usage: wgpu::BufferUsages::VERTEX,
            });
        self.draw(program, primitive, layout, &buffer, vertex_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_surface_errors_skip_the_frame() {
        assert!(skips_frame(&wgpu::SurfaceError::Timeout));
        assert!(skips_frame(&wgpu::SurfaceError::Outdated));
        assert!(skips_frame(&wgpu::SurfaceError::Lost));
        assert!(!skips_frame(&wgpu::SurfaceError::OutOfMemory));
        assert!(!skips_frame(&wgpu::SurfaceError::Other));
    }
}
