pub mod backend;
pub mod batch3d;
pub mod chunks;
pub mod collaborators;
pub mod config;
pub mod draw_context;
pub mod frustum;
pub mod gpu;
pub mod guides;
pub mod model_batch;
pub mod pipeline_builder;
pub mod postprocess;
pub mod recording;
pub mod scissor;
pub mod shaders;
pub mod shadows;
pub mod skybox;
pub mod state;
pub mod uniforms;
pub mod vertex;
pub mod world_renderer;

pub use backend::{RenderBackend, RenderTarget, TextureSlot};
pub use chunks::{ChunkMesh, ChunkMesher, LevelChunks};
pub use collaborators::WorldCollaborators;
pub use config::{DebugFlags, RenderConfig};
pub use draw_context::DrawContext;
pub use gpu::WgpuBackend;
pub use guides::ChunkBorderGuides;
pub use model_batch::MeshModelBatch;
pub use postprocess::ScenePostProcess;
pub use recording::RecordingBackend;
pub use scissor::ScissorStack;
pub use state::{BlendMode, RenderState, Viewport};
pub use world_renderer::{FrameInput, FrameStats, WorldRenderer};
