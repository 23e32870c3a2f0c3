use std::fmt;

/// Kind of asset a lookup was performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Shader,
    Texture,
    Model,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::Shader => "shader",
            AssetKind::Texture => "texture",
            AssetKind::Model => "model",
        };
        f.write_str(name)
    }
}

/// Errors that stop a frame from being rendered.
///
/// Everything in here is treated as a content-integrity or startup bug: the
/// caller is expected to report it and shut down rather than retry.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("required {kind} `{name}` is missing")]
    MissingAsset { kind: AssetKind, name: String },

    #[error("unknown block id {0}")]
    UnknownBlock(u16),

    #[error("unknown item id {0}")]
    UnknownItem(u16),

    #[error("shader `{name}` failed to compile: {message}")]
    ShaderCompilation { name: String, message: String },

    #[error("shader `{name}` line {line}: {message}")]
    ShaderPreprocess {
        name: String,
        line: usize,
        message: String,
    },

    #[error(transparent)]
    Surface(#[from] wgpu::SurfaceError),

    #[error("graphics device unavailable: {0}")]
    Device(String),
}

/// Errors that end the application.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl RenderError {
    pub fn missing(kind: AssetKind, name: impl Into<String>) -> Self {
        RenderError::MissingAsset {
            kind,
            name: name.into(),
        }
    }
}
