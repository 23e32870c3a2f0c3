use bitflags::bitflags;

bitflags! {
    /// Debug visualisations toggled at runtime.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DebugFlags: u8 {
        /// Master switch; the other flags only take effect while it is set.
        const DEBUG = 1 << 0;
        /// Shade world geometry by light values only.
        const LIGHTS = 1 << 1;
        const CHUNK_BORDERS = 1 << 2;
        const ENTITIES = 1 << 3;
    }
}

/// Per-renderer configuration that would otherwise live in globals.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderConfig {
    flags: DebugFlags,
}

impl RenderConfig {
    pub fn new(flags: DebugFlags) -> Self {
        Self { flags }
    }

    pub fn flags(&self) -> DebugFlags {
        self.flags
    }

    pub fn set_flag(&mut self, flag: DebugFlags, value: bool) {
        self.flags.set(flag, value);
    }

    pub fn toggle(&mut self, flag: DebugFlags) {
        self.flags.toggle(flag);
    }

    pub fn debug(&self) -> bool {
        self.flags.contains(DebugFlags::DEBUG)
    }

    pub fn set_debug(&mut self, value: bool) {
        self.set_flag(DebugFlags::DEBUG, value);
    }

    pub fn lights_debug(&self) -> bool {
        self.flags.contains(DebugFlags::LIGHTS)
    }

    pub fn toggle_lights_debug(&mut self) {
        self.toggle(DebugFlags::LIGHTS);
    }

    pub fn show_chunk_borders(&self) -> bool {
        self.debug() && self.flags.contains(DebugFlags::CHUNK_BORDERS)
    }

    pub fn show_entities_debug(&self) -> bool {
        self.debug() && self.flags.contains(DebugFlags::ENTITIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_flags_need_master_switch() {
        let mut config = RenderConfig::new(DebugFlags::CHUNK_BORDERS | DebugFlags::ENTITIES);
        assert!(!config.show_chunk_borders());
        config.set_debug(true);
        assert!(config.show_chunk_borders());
        assert!(config.show_entities_debug());
    }

    #[test]
    fn lights_debug_toggles() {
        let mut config = RenderConfig::default();
        config.toggle_lights_debug();
        assert!(config.lights_debug());
        config.toggle_lights_debug();
        assert!(!config.lights_debug());
    }
}
