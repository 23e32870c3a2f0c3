use std::collections::HashMap;

use super::context::DEPTH_FORMAT;
use crate::error::RenderError;
use crate::renderer::backend::{Primitive, ProgramId, VertexLayout};
use crate::renderer::pipeline_builder::PipelineBuilder;
use crate::renderer::state::{BlendMode, RenderState};

/// Size of each program's uniform buffer; the largest block is 432 bytes.
pub(crate) const UNIFORM_CAPACITY: u64 = 512;

/// Bind group layouts every program is compiled against: group 0 holds the
/// program's uniform block, group 1 the shared texture slots.
pub(crate) struct Layouts {
    pub(crate) uniforms: wgpu::BindGroupLayout,
    pub(crate) textures: wgpu::BindGroupLayout,
    pub(crate) pipeline: wgpu::PipelineLayout,
}

fn texture_entry(
    binding: u32,
    sample_type: wgpu::TextureSampleType,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, ty: wgpu::SamplerBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Sampler(ty),
        count: None,
    }
}

impl Layouts {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let uniforms = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ProgramUniformsLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let float = wgpu::TextureSampleType::Float { filterable: true };
        let d2 = wgpu::TextureViewDimension::D2;
        let textures = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("TextureSlotsLayout"),
            entries: &[
                texture_entry(0, float, d2),
                sampler_entry(1, wgpu::SamplerBindingType::Filtering),
                texture_entry(2, float, wgpu::TextureViewDimension::Cube),
                texture_entry(3, wgpu::TextureSampleType::Depth, d2),
                texture_entry(4, wgpu::TextureSampleType::Depth, d2),
                sampler_entry(5, wgpu::SamplerBindingType::Comparison),
                texture_entry(6, wgpu::TextureSampleType::Depth, d2),
            ],
        });

        let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ProgramPipelineLayout"),
            bind_group_layouts: &[&uniforms, &textures],
            push_constant_ranges: &[],
        });

        Self {
            uniforms,
            textures,
            pipeline,
        }
    }
}

pub(crate) struct GpuProgram {
    pub(crate) name: String,
    pub(crate) module: wgpu::ShaderModule,
    pub(crate) uniforms: wgpu::Buffer,
    pub(crate) uniform_group: wgpu::BindGroup,
}

impl GpuProgram {
    /// Validation errors of the module are returned instead of being
    /// reported through the device's uncaptured error handler.
    pub(crate) fn compile(
        device: &wgpu::Device,
        layouts: &Layouts,
        name: &str,
        source: &str,
    ) -> Result<Self, RenderError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::ShaderCompilation {
                name: name.to_string(),
                message: error.to_string(),
            });
        }

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ProgramUniforms"),
            size: UNIFORM_CAPACITY,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ProgramUniformsGroup"),
            layout: &layouts.uniforms,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        });

        Ok(Self {
            name: name.to_string(),
            module,
            uniforms,
            uniform_group,
        })
    }
}

/// Everything a cached pipeline depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub(crate) program: ProgramId,
    pub(crate) primitive: Primitive,
    pub(crate) layout: VertexLayout,
    pub(crate) color: Option<wgpu::TextureFormat>,
    pub(crate) depth: bool,
    pub(crate) depth_test: bool,
    pub(crate) depth_write: bool,
    pub(crate) cull: bool,
    pub(crate) blend: BlendMode,
}

impl PipelineKey {
    pub(crate) fn new(
        program: ProgramId,
        primitive: Primitive,
        layout: VertexLayout,
        state: &RenderState,
        color: Option<wgpu::TextureFormat>,
        depth: bool,
    ) -> Self {
        Self {
            program,
            primitive,
            layout,
            color,
            depth,
            depth_test: state.depth_test,
            depth_write: state.depth_write(),
            cull: state.cull_face && primitive == Primitive::Triangles,
            blend: state.blend_mode,
        }
    }
}

#[derive(Default)]
pub(crate) struct PipelineCache {
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    /// Builds the pipeline for `key` unless it is cached already.
    pub(crate) fn prepare(
        &mut self,
        device: &wgpu::Device,
        layouts: &Layouts,
        program: &GpuProgram,
        key: PipelineKey,
    ) {
        self.pipelines.entry(key).or_insert_with(|| {
            log::debug!("Building pipeline {:?}", key);
            let mut builder = PipelineBuilder::new(device, &layouts.pipeline, &program.module)
                .with_label(&program.name)
                .with_vertex_buffer(key.layout.buffer_layout())
                .with_primitive(key.primitive)
                .with_back_face_culling(key.cull);
            if key.depth {
                builder = builder.with_depth(DEPTH_FORMAT, key.depth_test, key.depth_write);
            }
            match key.color {
                Some(format) => builder.with_color_target(format, key.blend).build(),
                None => builder.depth_only().with_depth_bias(2, 2.0).build(),
            }
        });
    }

    pub(crate) fn get(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    /// Drops pipelines built from a program that is being replaced.
    pub(crate) fn invalidate(&mut self, program: ProgramId) {
        self.pipelines.retain(|key, _| key.program != program);
    }

    pub(crate) fn len(&self) -> usize {
        self.pipelines.len()
    }
}
