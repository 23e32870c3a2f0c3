use std::collections::{BTreeMap, BTreeSet};

use log::info;

use super::backend::{ProgramId, RenderBackend};
use crate::error::{AssetKind, RenderError};
use crate::settings::GraphicsSettings;

pub const DEFINE_SHADOWS: &str = "ENABLE_SHADOWS";
pub const DEFINE_SSAO: &str = "ENABLE_SSAO";
pub const DEFINE_ADVANCED_RENDER: &str = "ADVANCED_RENDER";

/// Programs whose source depends on [`ShaderPipelineConfig`].
pub const CONFIG_SENSITIVE_SHADERS: [&str; 4] =
    ["main", "entity", "deferred_lighting", "translucent"];

/// Set of names visible to `#ifdef` / `#ifndef`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderDefines {
    names: BTreeSet<String>,
}

impl ShaderDefines {
    pub fn set(&mut self, name: &str, defined: bool) {
        if defined {
            self.names.insert(name.to_string());
        } else {
            self.names.remove(name);
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Compile-time rendering flags. Programs in [`CONFIG_SENSITIVE_SHADERS`]
/// are rebuilt whenever this value changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShaderPipelineConfig {
    pub advanced_render: bool,
    pub shadows: bool,
    pub ssao: bool,
}

impl ShaderPipelineConfig {
    /// `shadows` reflects whether shadow maps are currently allocated, not
    /// just the quality knob.
    pub fn from_settings(graphics: &GraphicsSettings, shadows: bool) -> Self {
        Self {
            advanced_render: graphics.advanced_render,
            shadows,
            ssao: graphics.ssao && graphics.advanced_render,
        }
    }

    pub fn defines(&self) -> ShaderDefines {
        let mut defines = ShaderDefines::default();
        defines.set(DEFINE_ADVANCED_RENDER, self.advanced_render);
        defines.set(DEFINE_SHADOWS, self.shadows);
        defines.set(DEFINE_SSAO, self.ssao);
        defines
    }
}

struct Frame {
    parent_active: bool,
    condition: bool,
    seen_else: bool,
}

impl Frame {
    fn active(&self) -> bool {
        self.parent_active && (self.condition != self.seen_else)
    }
}

/// Resolves `#define`, `#ifdef`, `#ifndef`, `#else` and `#endif` lines.
///
/// Removed lines are replaced by empty ones so compiler diagnostics keep
/// pointing at the right line of the original file.
pub fn preprocess(
    name: &str,
    source: &str,
    defines: &ShaderDefines,
) -> Result<String, RenderError> {
    let mut defines = defines.clone();
    let mut stack: Vec<Frame> = Vec::new();
    let mut output = String::with_capacity(source.len());

    let error = |line: usize, message: &str| RenderError::ShaderPreprocess {
        name: name.to_string(),
        line,
        message: message.to_string(),
    };

    for (index, line) in source.lines().enumerate() {
        let line_number = index + 1;
        let active = stack.last().map_or(true, Frame::active);
        let trimmed = line.trim_start();

        if let Some(directive) = trimmed.strip_prefix('#') {
            let mut parts = directive.split_whitespace();
            let keyword = parts.next().unwrap_or_default();
            let argument = parts.next();
            match keyword {
                "ifdef" | "ifndef" => {
                    let symbol =
                        argument.ok_or_else(|| error(line_number, "missing name after #ifdef"))?;
                    let defined = defines.is_defined(symbol);
                    stack.push(Frame {
                        parent_active: active,
                        condition: if keyword == "ifdef" { defined } else { !defined },
                        seen_else: false,
                    });
                }
                "else" => {
                    let frame = stack
                        .last_mut()
                        .ok_or_else(|| error(line_number, "#else without #ifdef"))?;
                    if frame.seen_else {
                        return Err(error(line_number, "duplicate #else"));
                    }
                    frame.seen_else = true;
                }
                "endif" => {
                    stack
                        .pop()
                        .ok_or_else(|| error(line_number, "#endif without #ifdef"))?;
                }
                "define" => {
                    let symbol =
                        argument.ok_or_else(|| error(line_number, "missing name after #define"))?;
                    if active {
                        defines.set(symbol, true);
                    }
                }
                other => {
                    return Err(error(line_number, &format!("unknown directive #{other}")));
                }
            }
            output.push('\n');
            continue;
        }

        if active {
            output.push_str(line);
        }
        output.push('\n');
    }

    if !stack.is_empty() {
        return Err(error(source.lines().count(), "unterminated #ifdef"));
    }
    Ok(output)
}

struct ShaderEntry {
    id: ProgramId,
    source: String,
}

/// Named shader programs and the defines they are currently built with.
pub struct ShaderRegistry {
    shaders: BTreeMap<String, ShaderEntry>,
    config: ShaderPipelineConfig,
    next_id: u32,
    compiles: u64,
}

impl Default for ShaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self {
            shaders: BTreeMap::new(),
            config: ShaderPipelineConfig::default(),
            next_id: 0,
            compiles: 0,
        }
    }

    /// Registry holding every program the world renderer draws with.
    pub fn with_builtin_shaders() -> Self {
        let bindings = include_str!("../shader/bindings.wgsl");
        let world = include_str!("../shader/world.wgsl");
        let sky = include_str!("../shader/sky.wgsl");

        let mut registry = Self::new();
        for (name, body) in [
            ("main", include_str!("../shader/main.wgsl")),
            ("entity", include_str!("../shader/entity.wgsl")),
            ("translucent", include_str!("../shader/translucent.wgsl")),
            ("shadows", include_str!("../shader/shadows.wgsl")),
            ("deferred_lighting", include_str!("../shader/deferred_lighting.wgsl")),
        ] {
            registry.register(name, format!("{bindings}\n{world}\n{body}"));
        }
        registry.register(
            "skybox_gen",
            format!("{sky}\n{}", include_str!("../shader/skybox_gen.wgsl")),
        );
        registry.register(
            "background",
            format!("{sky}\n{}", include_str!("../shader/background.wgsl")),
        );
        for (name, body) in [
            ("lines", include_str!("../shader/lines.wgsl")),
            ("ui3d", include_str!("../shader/ui3d.wgsl")),
            ("screen", include_str!("../shader/screen.wgsl")),
        ] {
            registry.register(name, format!("{bindings}\n{body}"));
        }
        registry
    }

    /// Adds or replaces a program source. A replaced program keeps its id.
    pub fn register(&mut self, name: impl Into<String>, source: impl Into<String>) -> ProgramId {
        let name = name.into();
        let source = source.into();
        if let Some(entry) = self.shaders.get_mut(&name) {
            entry.source = source;
            return entry.id;
        }
        let id = ProgramId(self.next_id);
        self.next_id += 1;
        self.shaders.insert(name, ShaderEntry { id, source });
        id
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.shaders.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<ProgramId> {
        self.shaders.get(name).map(|entry| entry.id)
    }

    pub fn require(&self, name: &str) -> Result<ProgramId, RenderError> {
        self.get(name)
            .ok_or_else(|| RenderError::missing(AssetKind::Shader, name))
    }

    pub fn config(&self) -> ShaderPipelineConfig {
        self.config
    }

    /// Number of program compilations issued so far.
    pub fn compile_count(&self) -> u64 {
        self.compiles
    }

    pub fn compile_all(&mut self, backend: &mut dyn RenderBackend) -> Result<(), RenderError> {
        let names: Vec<String> = self.shaders.keys().cloned().collect();
        for name in names {
            self.compile(backend, &name)?;
        }
        Ok(())
    }

    pub fn recompile(
        &mut self,
        backend: &mut dyn RenderBackend,
        names: &[&str],
    ) -> Result<(), RenderError> {
        for name in names {
            self.compile(backend, name)?;
        }
        Ok(())
    }

    /// Rebuilds the config-sensitive programs if `config` differs from the
    /// one they were last built with. Returns whether anything was rebuilt.
    pub fn apply_config(
        &mut self,
        backend: &mut dyn RenderBackend,
        config: ShaderPipelineConfig,
    ) -> Result<bool, RenderError> {
        if config == self.config {
            return Ok(false);
        }
        info!(
            "Shader pipeline changed: advanced_render={} shadows={} ssao={}",
            config.advanced_render, config.shadows, config.ssao
        );
        self.config = config;
        self.recompile(backend, &CONFIG_SENSITIVE_SHADERS)?;
        Ok(true)
    }

    fn compile(&mut self, backend: &mut dyn RenderBackend, name: &str) -> Result<(), RenderError> {
        let entry = self
            .shaders
            .get(name)
            .ok_or_else(|| RenderError::missing(AssetKind::Shader, name))?;
        let source = preprocess(name, &entry.source, &self.config.defines())?;
        backend.compile_program(entry.id, name, &source)?;
        self.compiles += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::RecordingBackend;

    fn defines(names: &[&str]) -> ShaderDefines {
        let mut defines = ShaderDefines::default();
        for name in names {
            defines.set(name, true);
        }
        defines
    }

    #[test]
    fn ifdef_selects_branch() {
        let source = "a\n#ifdef ENABLE_SHADOWS\nb\n#else\nc\n#endif\nd";
        let on = preprocess("t", source, &defines(&["ENABLE_SHADOWS"])).unwrap();
        let off = preprocess("t", source, &defines(&[])).unwrap();
        assert_eq!(on, "a\n\nb\n\n\n\nd\n");
        assert_eq!(off, "a\n\n\n\nc\n\nd\n");
    }

    #[test]
    fn nested_blocks_respect_outer_condition() {
        let source = "#ifndef ADVANCED_RENDER\n#ifdef ENABLE_SSAO\nx\n#endif\ny\n#endif";
        let out = preprocess("t", source, &defines(&["ENABLE_SSAO", "ADVANCED_RENDER"])).unwrap();
        assert!(!out.contains('x'));
        assert!(!out.contains('y'));
    }

    #[test]
    fn define_inside_source_is_visible_below() {
        let source = "#define LOCAL\n#ifdef LOCAL\nkept\n#endif";
        let out = preprocess("t", source, &ShaderDefines::default()).unwrap();
        assert!(out.contains("kept"));
    }

    #[test]
    fn unbalanced_directives_are_reported_with_line() {
        let err = preprocess("broken", "x\n#endif", &ShaderDefines::default()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::ShaderPreprocess { line: 2, .. }
        ));
        assert!(preprocess("broken", "#ifdef A\nx", &ShaderDefines::default()).is_err());
    }

    #[test]
    fn require_missing_shader_is_fatal() {
        let registry = ShaderRegistry::new();
        let err = registry.require("skybox_gen").unwrap_err();
        assert!(matches!(
            err,
            RenderError::MissingAsset {
                kind: AssetKind::Shader,
                ..
            }
        ));
    }

    #[test]
    fn unchanged_config_never_recompiles() {
        let mut backend = RecordingBackend::new();
        let mut registry = ShaderRegistry::new();
        for name in CONFIG_SENSITIVE_SHADERS {
            registry.register(name, "#ifdef ENABLE_SHADOWS\n#endif");
        }
        registry.compile_all(&mut backend).unwrap();
        let baseline = registry.compile_count();

        let config = ShaderPipelineConfig {
            advanced_render: true,
            shadows: true,
            ssao: false,
        };
        assert!(registry.apply_config(&mut backend, config).unwrap());
        assert!(!registry.apply_config(&mut backend, config).unwrap());
        assert!(!registry.apply_config(&mut backend, config).unwrap());
        assert_eq!(
            registry.compile_count() - baseline,
            CONFIG_SENSITIVE_SHADERS.len() as u64
        );
    }

    #[test]
    fn builtin_shaders_preprocess_in_every_configuration() {
        let registry = ShaderRegistry::with_builtin_shaders();
        for bits in 0..8u8 {
            let config = ShaderPipelineConfig {
                advanced_render: bits & 1 != 0,
                shadows: bits & 2 != 0,
                ssao: bits & 4 != 0,
            };
            for (name, entry) in &registry.shaders {
                preprocess(name, &entry.source, &config.defines())
                    .unwrap_or_else(|err| panic!("{name}: {err}"));
            }
        }
    }

    #[test]
    fn ssao_requires_advanced_render() {
        let mut graphics = GraphicsSettings::default();
        graphics.ssao = true;
        graphics.advanced_render = false;
        let config = ShaderPipelineConfig::from_settings(&graphics, false);
        assert!(!config.ssao);
    }
}
