use std::collections::HashMap;

use log::debug;

use super::backend::{
    MeshId, Primitive, ProgramId, RenderBackend, RenderTarget, TextureId, TextureSlot,
    VertexLayout,
};
use super::state::{RenderState, Viewport};
use crate::error::RenderError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureKind {
    Color { width: u32, height: u32 },
    DepthMap { resolution: u32 },
    Cubemap { size: u32 },
    Framebuffer { width: u32, height: u32 },
}

/// One recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    ApplyState(RenderState),
    Clear {
        target: RenderTarget,
        color: Option<[f32; 4]>,
        depth: bool,
    },
    CreateTexture(TextureId, TextureKind),
    ReleaseTexture(TextureId),
    CopyDepth {
        src: TextureId,
        dst: TextureId,
    },
    CompileProgram {
        id: ProgramId,
        name: String,
        source: String,
    },
    WriteUniforms {
        program: ProgramId,
        bytes: Vec<u8>,
    },
    BindTexture(TextureSlot, Option<TextureId>),
    CreateMesh(MeshId, VertexLayout, u32),
    ReleaseMesh(MeshId),
    Draw {
        program: ProgramId,
        primitive: Primitive,
        layout: VertexLayout,
        state: RenderState,
        /// Raw vertex bytes; empty for mesh draws.
        vertices: Vec<u8>,
        mesh: Option<MeshId>,
    },
}

/// Headless backend that keeps a log of every command together with the
/// render state active when it was issued.
#[derive(Debug)]
pub struct RecordingBackend {
    commands: Vec<Command>,
    state: RenderState,
    textures: HashMap<TextureId, TextureKind>,
    meshes: HashMap<MeshId, (VertexLayout, u32)>,
    programs: HashMap<ProgramId, String>,
    next_texture: u32,
    next_mesh: u32,
    /// Program names whose compilation is made to fail.
    pub failing_programs: Vec<String>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            state: RenderState::new(Viewport::new(1, 1)),
            textures: HashMap::new(),
            meshes: HashMap::new(),
            programs: HashMap::new(),
            next_texture: 1,
            next_mesh: 1,
            failing_programs: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns and forgets the commands recorded so far; live resources are
    /// kept.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn current_state(&self) -> RenderState {
        self.state
    }

    pub fn applied_states(&self) -> impl Iterator<Item = RenderState> + '_ {
        self.commands.iter().filter_map(|command| match command {
            Command::ApplyState(state) => Some(*state),
            _ => None,
        })
    }

    /// Draw commands as `(program, state, vertex bytes)`.
    pub fn draws(&self) -> impl Iterator<Item = (ProgramId, &RenderState, &[u8])> + '_ {
        self.commands.iter().filter_map(|command| match command {
            Command::Draw {
                program,
                state,
                vertices,
                ..
            } => Some((*program, state, vertices.as_slice())),
            _ => None,
        })
    }

    pub fn live_textures(&self) -> &HashMap<TextureId, TextureKind> {
        &self.textures
    }

    pub fn texture_kind(&self, id: TextureId) -> Option<TextureKind> {
        self.textures.get(&id).copied()
    }

    pub fn program_name(&self, id: ProgramId) -> Option<&str> {
        self.programs.get(&id).map(String::as_str)
    }

    /// Last uniform block written for `program`.
    pub fn last_uniforms(&self, program: ProgramId) -> Option<&[u8]> {
        self.commands.iter().rev().find_map(|command| match command {
            Command::WriteUniforms { program: p, bytes } if *p == program => {
                Some(bytes.as_slice())
            }
            _ => None,
        })
    }

    fn allocate(&mut self, kind: TextureKind) -> TextureId {
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(id, kind);
        self.commands.push(Command::CreateTexture(id, kind));
        id
    }
}

impl RenderBackend for RecordingBackend {
    fn apply_state(&mut self, state: &RenderState) {
        self.state = *state;
        self.commands.push(Command::ApplyState(*state));
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: bool) {
        self.commands.push(Command::Clear {
            target: self.state.target,
            color,
            depth,
        });
    }

    fn create_texture(&mut self, width: u32, height: u32, _rgba: &[u8]) -> TextureId {
        self.allocate(TextureKind::Color { width, height })
    }

    fn create_depth_map(&mut self, resolution: u32) -> TextureId {
        self.allocate(TextureKind::DepthMap { resolution })
    }

    fn create_cubemap(&mut self, size: u32) -> TextureId {
        self.allocate(TextureKind::Cubemap { size })
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> TextureId {
        self.allocate(TextureKind::Framebuffer { width, height })
    }

    fn release_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            debug!("release of unknown texture {:?}", texture);
        }
        self.commands.push(Command::ReleaseTexture(texture));
    }

    fn copy_depth(&mut self, src: TextureId, dst: TextureId) {
        self.commands.push(Command::CopyDepth { src, dst });
    }

    fn compile_program(
        &mut self,
        id: ProgramId,
        name: &str,
        source: &str,
    ) -> Result<(), RenderError> {
        if self.failing_programs.iter().any(|failing| failing == name) {
            return Err(RenderError::ShaderCompilation {
                name: name.to_string(),
                message: "rejected by recording backend".to_string(),
            });
        }
        self.programs.insert(id, name.to_string());
        self.commands.push(Command::CompileProgram {
            id,
            name: name.to_string(),
            source: source.to_string(),
        });
        Ok(())
    }

    fn write_uniforms(&mut self, program: ProgramId, bytes: &[u8]) {
        self.commands.push(Command::WriteUniforms {
            program,
            bytes: bytes.to_vec(),
        });
    }

    fn bind_texture(&mut self, slot: TextureSlot, texture: Option<TextureId>) {
        self.commands.push(Command::BindTexture(slot, texture));
    }

    fn create_mesh(&mut self, layout: VertexLayout, _bytes: &[u8], vertex_count: u32) -> MeshId {
        let id = MeshId(self.next_mesh);
        self.next_mesh += 1;
        self.meshes.insert(id, (layout, vertex_count));
        self.commands.push(Command::CreateMesh(id, layout, vertex_count));
        id
    }

    fn draw_mesh(&mut self, program: ProgramId, mesh: MeshId) {
        let layout = self
            .meshes
            .get(&mesh)
            .map(|(layout, _)| *layout)
            .unwrap_or(VertexLayout::World);
        self.commands.push(Command::Draw {
            program,
            primitive: Primitive::Triangles,
            layout,
            state: self.state,
            vertices: Vec::new(),
            mesh: Some(mesh),
        });
    }

    fn release_mesh(&mut self, mesh: MeshId) {
        self.meshes.remove(&mesh);
        self.commands.push(Command::ReleaseMesh(mesh));
    }

    fn draw_vertices(
        &mut self,
        program: ProgramId,
        primitive: Primitive,
        layout: VertexLayout,
        bytes: &[u8],
    ) {
        self.commands.push(Command::Draw {
            program,
            primitive,
            layout,
            state: self.state,
            vertices: bytes.to_vec(),
            mesh: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_textures_are_forgotten() {
        let mut backend = RecordingBackend::new();
        let map = backend.create_depth_map(1024);
        assert_eq!(
            backend.texture_kind(map),
            Some(TextureKind::DepthMap { resolution: 1024 })
        );
        backend.release_texture(map);
        assert!(backend.live_textures().is_empty());
    }

    #[test]
    fn draws_capture_active_state() {
        let mut backend = RecordingBackend::new();
        let mut state = RenderState::new(Viewport::new(32, 32));
        state.target = RenderTarget::DepthMap(TextureId(9));
        backend.apply_state(&state);
        backend.draw_vertices(
            ProgramId(1),
            Primitive::Lines,
            VertexLayout::Batch,
            &[0; 36],
        );
        let (program, drawn, bytes) = backend.draws().next().expect("one draw");
        assert_eq!(program, ProgramId(1));
        assert_eq!(drawn.target, RenderTarget::DepthMap(TextureId(9)));
        assert_eq!(bytes.len(), 36);
    }

    #[test]
    fn failing_program_reports_compilation_error() {
        let mut backend = RecordingBackend::new();
        backend.failing_programs.push("main".into());
        let err = backend
            .compile_program(ProgramId(0), "main", "")
            .expect_err("compilation must fail");
        assert!(matches!(err, RenderError::ShaderCompilation { .. }));
    }
}
