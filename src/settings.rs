use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const MAX_SHADOWS_QUALITY: u32 = 3;
pub const MIN_LOAD_DISTANCE: u32 = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub present_mode: PresentModeSetting,
    #[serde(default)]
    pub graphics: GraphicsSettings,
    #[serde(default)]
    pub chunks: ChunkSettings,
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RenderSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        let graphics = &mut self.graphics;
        if graphics.shadows_quality > MAX_SHADOWS_QUALITY {
            warn!(
                "Shadows quality {} is out of range. Clamping to {}.",
                graphics.shadows_quality, MAX_SHADOWS_QUALITY
            );
            graphics.shadows_quality = MAX_SHADOWS_QUALITY;
        }

        if !(graphics.gamma.is_finite() && graphics.gamma > 0.0) {
            warn!("Gamma must be positive. Using default value.");
            graphics.gamma = GraphicsSettings::default_gamma();
        }

        if !(graphics.fog_curve.is_finite() && graphics.fog_curve > 0.0) {
            warn!("Fog curve must be positive. Using default value.");
            graphics.fog_curve = GraphicsSettings::default_fog_curve();
        }

        if graphics.skybox_resolution == 0 {
            warn!("Skybox resolution must be greater than zero. Using default value.");
            graphics.skybox_resolution = GraphicsSettings::default_skybox_resolution();
        }

        if self.chunks.load_distance < MIN_LOAD_DISTANCE {
            warn!(
                "Load distance {} is too small. Using {}.",
                self.chunks.load_distance, MIN_LOAD_DISTANCE
            );
            self.chunks.load_distance = MIN_LOAD_DISTANCE;
        }

        self
    }

    pub fn present_mode(&self, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let desired = self.present_mode.to_wgpu();
        if available.contains(&desired) {
            return desired;
        }

        warn!(
            "Requested present mode {:?} is not supported. Falling back to FIFO.",
            desired
        );

        if available.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            available
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        }
    }
}

/// Quality knobs read by the world renderer every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicsSettings {
    /// Deferred pipeline; shadows and SSAO are only available with it.
    #[serde(default = "GraphicsSettings::default_true")]
    pub advanced_render: bool,
    /// 0 disables shadows; each step doubles the shadow map resolution.
    #[serde(default = "GraphicsSettings::default_shadows_quality")]
    pub shadows_quality: u32,
    #[serde(default)]
    pub ssao: bool,
    #[serde(default = "GraphicsSettings::default_true")]
    pub frustum_culling: bool,
    #[serde(default = "GraphicsSettings::default_gamma")]
    pub gamma: f32,
    #[serde(default = "GraphicsSettings::default_fog_curve")]
    pub fog_curve: f32,
    #[serde(default = "GraphicsSettings::default_skybox_resolution")]
    pub skybox_resolution: u32,
}

impl Default for GraphicsSettings {
    fn default() -> Self {
        Self {
            advanced_render: true,
            shadows_quality: Self::default_shadows_quality(),
            ssao: false,
            frustum_culling: true,
            gamma: Self::default_gamma(),
            fog_curve: Self::default_fog_curve(),
            skybox_resolution: Self::default_skybox_resolution(),
        }
    }
}

impl GraphicsSettings {
    /// Shadow quality actually in effect: zero unless the deferred pipeline
    /// is enabled.
    pub fn effective_shadows_quality(&self) -> u32 {
        if self.advanced_render {
            self.shadows_quality.min(MAX_SHADOWS_QUALITY)
        } else {
            0
        }
    }

    const fn default_true() -> bool {
        true
    }

    const fn default_shadows_quality() -> u32 {
        1
    }

    const fn default_gamma() -> f32 {
        1.0
    }

    const fn default_fog_curve() -> f32 {
        1.0
    }

    const fn default_skybox_resolution() -> u32 {
        96
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSettings {
    /// Chunk radius kept loaded around the player.
    #[serde(default = "ChunkSettings::default_load_distance")]
    pub load_distance: u32,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            load_distance: Self::default_load_distance(),
        }
    }
}

impl ChunkSettings {
    /// Fog factor derived from the load distance, finite because the
    /// distance is at least [`MIN_LOAD_DISTANCE`].
    pub fn fog_factor(&self) -> f32 {
        15.0 / (self.load_distance.max(MIN_LOAD_DISTANCE) - 2) as f32
    }

    const fn default_load_distance() -> u32 {
        22
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    #[default]
    Fifo,
    FifoRelaxed,
    Immediate,
    Mailbox,
    AutoVsync,
    AutoNoVsync,
}

impl PresentModeSetting {
    fn to_wgpu(&self) -> wgpu::PresentMode {
        match self {
            PresentModeSetting::Fifo => wgpu::PresentMode::Fifo,
            PresentModeSetting::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
            PresentModeSetting::Immediate => wgpu::PresentMode::Immediate,
            PresentModeSetting::Mailbox => wgpu::PresentMode::Mailbox,
            PresentModeSetting::AutoVsync => wgpu::PresentMode::AutoVsync,
            PresentModeSetting::AutoNoVsync => wgpu::PresentMode::AutoNoVsync,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> RenderSettings {
        RenderSettings {
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            present_mode: PresentModeSetting::Immediate,
            graphics: GraphicsSettings {
                shadows_quality: 9,
                gamma: f32::NAN,
                fog_curve: 0.0,
                skybox_resolution: 0,
                ..GraphicsSettings::default()
            },
            chunks: ChunkSettings { load_distance: 2 },
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();
        let defaults = GraphicsSettings::default();

        assert_eq!(validated.resolution.width, Resolution::default().width);
        assert_eq!(validated.resolution.height, Resolution::default().height);
        assert_eq!(validated.graphics.shadows_quality, MAX_SHADOWS_QUALITY);
        assert_eq!(validated.graphics.gamma, defaults.gamma);
        assert_eq!(validated.graphics.fog_curve, defaults.fog_curve);
        assert_eq!(validated.graphics.skybox_resolution, defaults.skybox_resolution);
        assert_eq!(validated.chunks.load_distance, MIN_LOAD_DISTANCE);
        assert!(validated.chunks.fog_factor().is_finite());
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RenderSettings {
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            present_mode: PresentModeSetting::Mailbox,
            graphics: GraphicsSettings {
                shadows_quality: 2,
                gamma: 1.6,
                ..GraphicsSettings::default()
            },
            chunks: ChunkSettings { load_distance: 12 },
        };

        let validated = valid.clone().validate();

        assert_eq!(validated.resolution.width, valid.resolution.width);
        assert_eq!(validated.graphics, valid.graphics);
        assert_eq!(validated.chunks, valid.chunks);
    }

    #[test]
    fn partial_json_uses_field_defaults() {
        let settings: RenderSettings =
            serde_json::from_str(r#"{"graphics": {"shadows_quality": 2}}"#).unwrap();
        assert_eq!(settings.graphics.shadows_quality, 2);
        assert!(settings.graphics.advanced_render);
        assert_eq!(settings.chunks.load_distance, 22);
    }

    #[test]
    fn shadows_need_advanced_render() {
        let graphics = GraphicsSettings {
            advanced_render: false,
            shadows_quality: 3,
            ..GraphicsSettings::default()
        };
        assert_eq!(graphics.effective_shadows_quality(), 0);
    }

    #[test]
    fn fog_factor_follows_load_distance() {
        let chunks = ChunkSettings { load_distance: 17 };
        assert_eq!(chunks.fog_factor(), 1.0);
    }

    #[test]
    fn present_mode_returns_desired_when_available() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [
            wgpu::PresentMode::Fifo,
            wgpu::PresentMode::Mailbox,
            wgpu::PresentMode::Immediate,
        ];

        assert_eq!(
            settings.present_mode(&available),
            wgpu::PresentMode::Mailbox
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo_when_desired_missing() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate];

        assert_eq!(settings.present_mode(&available), wgpu::PresentMode::Fifo);
    }
}
