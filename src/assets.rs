use std::collections::HashMap;

use log::warn;

use crate::error::{AssetKind, RenderError};
use crate::models::Model;
use crate::renderer::backend::TextureId;
use crate::renderer::batch3d::UvRegion;
use crate::renderer::shaders::ShaderRegistry;

/// Texture plus the part of it a name refers to.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextureRegion {
    pub texture: Option<TextureId>,
    pub region: UvRegion,
}

/// A texture packed with named sub-images.
#[derive(Debug, Clone)]
pub struct Atlas {
    pub texture: TextureId,
    regions: HashMap<String, UvRegion>,
}

impl Atlas {
    pub fn new(texture: TextureId) -> Self {
        Self {
            texture,
            regions: HashMap::new(),
        }
    }

    pub fn add(&mut self, name: impl Into<String>, region: UvRegion) {
        self.regions.insert(name.into(), region);
    }

    pub fn get(&self, name: &str) -> Option<UvRegion> {
        self.regions.get(name).copied()
    }

    pub fn has(&self, name: &str) -> bool {
        self.regions.contains_key(name)
    }
}

/// Named assets the world renderer pulls from every frame.
pub struct Assets {
    pub shaders: ShaderRegistry,
    textures: HashMap<String, TextureId>,
    atlases: HashMap<String, Atlas>,
    models: HashMap<String, Model>,
}

impl Assets {
    pub fn new(shaders: ShaderRegistry) -> Self {
        Self {
            shaders,
            textures: HashMap::new(),
            atlases: HashMap::new(),
            models: HashMap::new(),
        }
    }

    pub fn add_texture(&mut self, name: impl Into<String>, texture: TextureId) {
        self.textures.insert(name.into(), texture);
    }

    pub fn texture(&self, name: &str) -> Option<TextureId> {
        self.textures.get(name).copied()
    }

    pub fn add_atlas(&mut self, name: impl Into<String>, atlas: Atlas) {
        self.atlases.insert(name.into(), atlas);
    }

    pub fn atlas(&self, name: &str) -> Option<&Atlas> {
        self.atlases.get(name)
    }

    pub fn add_model(&mut self, name: impl Into<String>, model: Model) {
        self.models.insert(name.into(), model);
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    pub fn require_model(&self, name: &str) -> Result<&Model, RenderError> {
        self.model(name)
            .ok_or_else(|| RenderError::missing(AssetKind::Model, name))
    }

    /// Resolves `atlas:region` or a plain texture name.
    ///
    /// An atlas name with an empty region (`blocks:`) yields the whole atlas
    /// texture with full coordinates, for meshes whose UVs are already baked
    /// into atlas space. Unknown regions fall back to `fallback`.
    pub fn texture_region(&self, name: &str, fallback: &str) -> TextureRegion {
        let Some((atlas_name, region_name)) = name.split_once(':') else {
            return TextureRegion {
                texture: self.texture(name),
                region: UvRegion::default(),
            };
        };
        let Some(atlas) = self.atlas(atlas_name) else {
            warn!("Atlas `{}` not found for texture `{}`", atlas_name, name);
            return TextureRegion::default();
        };
        if region_name.is_empty() {
            return TextureRegion {
                texture: Some(atlas.texture),
                region: UvRegion::default(),
            };
        }
        match atlas.get(region_name) {
            Some(region) => TextureRegion {
                texture: Some(atlas.texture),
                region,
            },
            None if !fallback.is_empty() && fallback != name => {
                self.texture_region(fallback, "")
            }
            None => TextureRegion {
                texture: Some(atlas.texture),
                region: UvRegion::default(),
            },
        }
    }
}
