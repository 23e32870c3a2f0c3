use log::warn;

use super::context::DEPTH_FORMAT;
use crate::renderer::backend::CubeFace;

/// Format of color textures, framebuffers and the sky cubemap.
pub(crate) const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub(crate) enum GpuTexture {
    Color {
        _texture: wgpu::Texture,
        view: wgpu::TextureView,
        width: u32,
        height: u32,
    },
    DepthMap {
        _texture: wgpu::Texture,
        view: wgpu::TextureView,
        resolution: u32,
    },
    Cubemap {
        _texture: wgpu::Texture,
        view: wgpu::TextureView,
        faces: Vec<wgpu::TextureView>,
        size: u32,
    },
    Framebuffer {
        _color_texture: wgpu::Texture,
        color: wgpu::TextureView,
        _depth_texture: wgpu::Texture,
        depth: wgpu::TextureView,
        width: u32,
        height: u32,
    },
}

fn extent(width: u32, height: u32, layers: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: layers,
    }
}

fn texture_2d(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(width, height, 1),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    })
}

impl GpuTexture {
    /// Uploads `rgba` when it holds exactly `width * height` texels.
    pub(crate) fn color(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Self {
        let texture = texture_2d(
            device,
            "ColorTexture",
            width,
            height,
            COLOR_FORMAT,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        if rgba.len() == (width * height * 4) as usize {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                rgba,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(height),
                },
                extent(width, height, 1),
            );
        } else {
            warn!(
                "Texture data of {} bytes does not match {}x{}, left blank",
                rgba.len(),
                width,
                height
            );
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTexture::Color {
            _texture: texture,
            view,
            width,
            height,
        }
    }

    pub(crate) fn depth_map(device: &wgpu::Device, resolution: u32) -> Self {
        let texture = texture_2d(
            device,
            "ShadowMap",
            resolution,
            resolution,
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTexture::DepthMap {
            _texture: texture,
            view,
            resolution,
        }
    }

    pub(crate) fn cubemap(device: &wgpu::Device, size: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("SkyboxCubemap"),
            size: extent(size, size, 6),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("SkyboxCubeView"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(6),
            ..Default::default()
        });
        let faces = CubeFace::ALL
            .iter()
            .map(|face| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("SkyboxFaceView"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: face.index() as u32,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        GpuTexture::Cubemap {
            _texture: texture,
            view,
            faces,
            size,
        }
    }

    pub(crate) fn framebuffer(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let texture = |label, format| texture_2d(device, label, width, height, format, usage);
        let color_texture = texture("FramebufferColor", COLOR_FORMAT);
        let depth_texture = texture("FramebufferDepth", DEPTH_FORMAT);
        GpuTexture::Framebuffer {
            color: color_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            depth: depth_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            _color_texture: color_texture,
            _depth_texture: depth_texture,
            width,
            height,
        }
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        match self {
            GpuTexture::Color { width, height, .. }
            | GpuTexture::Framebuffer { width, height, .. } => (*width, *height),
            GpuTexture::DepthMap { resolution, .. } => (*resolution, *resolution),
            GpuTexture::Cubemap { size, .. } => (*size, *size),
        }
    }

    /// View usable in the `Main` slot.
    pub(crate) fn sampled_color(&self) -> Option<&wgpu::TextureView> {
        match self {
            GpuTexture::Color { view, .. } => Some(view),
            GpuTexture::Framebuffer { color, .. } => Some(color),
            _ => None,
        }
    }

    pub(crate) fn sampled_cube(&self) -> Option<&wgpu::TextureView> {
        match self {
            GpuTexture::Cubemap { view, .. } => Some(view),
            _ => None,
        }
    }

    /// View usable in the shadow and `Depth` slots.
    pub(crate) fn sampled_depth(&self) -> Option<&wgpu::TextureView> {
        match self {
            GpuTexture::DepthMap { view, .. } => Some(view),
            GpuTexture::Framebuffer { depth, .. } => Some(depth),
            _ => None,
        }
    }

    pub(crate) fn face(&self, face: CubeFace) -> Option<&wgpu::TextureView> {
        match self {
            GpuTexture::Cubemap { faces, .. } => faces.get(face.index()),
            _ => None,
        }
    }

    pub(crate) fn depth_attachment(&self) -> Option<&wgpu::TextureView> {
        match self {
            GpuTexture::DepthMap { view, .. } => Some(view),
            GpuTexture::Framebuffer { depth, .. } => Some(depth),
            _ => None,
        }
    }

    pub(crate) fn color_attachment(&self) -> Option<&wgpu::TextureView> {
        match self {
            GpuTexture::Framebuffer { color, .. } => Some(color),
            _ => None,
        }
    }
}

/// Stand-ins sampled by slots with nothing bound.
pub(crate) struct Fallbacks {
    pub(crate) color: GpuTexture,
    pub(crate) cube: GpuTexture,
    pub(crate) depth: GpuTexture,
}

impl Fallbacks {
    pub(crate) fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let fallbacks = Self {
            color: GpuTexture::color(device, queue, 1, 1, &[255, 255, 255, 255]),
            cube: GpuTexture::cubemap(device, 1),
            depth: GpuTexture::depth_map(device, 1),
        };
        // A far-plane depth means "nothing occludes" for every reader.
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("FallbackInit"),
        });
        if let Some(view) = fallbacks.depth.depth_attachment() {
            let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("FallbackDepthClear"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        queue.submit(Some(encoder.finish()));
        fallbacks
    }
}
