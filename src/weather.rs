use serde::Deserialize;

/// Falling-particle parameters of a weather preset (rain, snow, ...).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FallParams {
    /// Texture name; empty means the preset has no precipitation.
    pub texture: String,
    pub noise: String,
    pub vspeed: f32,
    pub hspeed: f32,
    pub scale: f32,
    pub min_opacity: f32,
    pub max_opacity: f32,
    pub max_intensity: f32,
    /// Opaque precipitation is alpha-clipped instead of blended.
    pub opaque: bool,
}

impl Default for FallParams {
    fn default() -> Self {
        Self {
            texture: String::new(),
            noise: String::new(),
            vspeed: 1.0,
            hspeed: 0.1,
            scale: 0.1,
            min_opacity: 0.0,
            max_opacity: 1.0,
            max_intensity: 1.0,
            opaque: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WeatherPreset {
    pub fall: FallParams,
    pub fog_opacity: f32,
    pub fog_density: f32,
    pub fog_curve: f32,
    pub clouds: f32,
    /// Blend weight of this preset inside a [`Weather`] mixer.
    #[serde(skip)]
    pub intensity: f32,
}

impl Default for WeatherPreset {
    fn default() -> Self {
        Self {
            fall: FallParams::default(),
            fog_opacity: 0.0,
            fog_density: 1.0,
            fog_curve: 1.0,
            clouds: 0.0,
            intensity: 1.0,
        }
    }
}

impl WeatherPreset {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn has_precipitation(&self) -> bool {
        self.intensity > 1e-3 && !self.fall.texture.is_empty()
    }

    /// Alpha-clip flag and opacity used when drawing this preset's
    /// precipitation.
    pub fn precipitation_opacity(&self) -> (bool, f32) {
        let zero = self.fall.min_opacity;
        let one = self.fall.max_opacity;
        let t = (self.intensity * (one - zero)) * self.fall.max_intensity + zero;
        if self.fall.opaque {
            (true, t * t)
        } else {
            (false, t.max(0.0))
        }
    }
}

/// Blends the current preset into an incoming one.
///
/// `t` only ever grows towards 1.0 between calls to [`Weather::change`]; once
/// it reaches 1.0 every reported scalar equals the incoming preset's own.
#[derive(Debug, Clone)]
pub struct Weather {
    pub current: WeatherPreset,
    pub incoming: WeatherPreset,
    pub current_name: String,
    pub incoming_name: String,
    t: f32,
    speed: f32,
}

impl Default for Weather {
    fn default() -> Self {
        let mut weather = Self {
            current: WeatherPreset::default(),
            incoming: WeatherPreset::default(),
            current_name: String::new(),
            incoming_name: String::new(),
            t: 1.0,
            speed: 0.0,
        };
        weather.update(0.0);
        weather
    }
}

impl Weather {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a transition to `preset` lasting `seconds`.
    pub fn change(&mut self, preset: WeatherPreset, seconds: f32, name: impl Into<String>) {
        std::mem::swap(&mut self.current, &mut self.incoming);
        std::mem::swap(&mut self.current_name, &mut self.incoming_name);
        self.incoming = preset;
        self.incoming_name = name.into();
        self.t = 0.0;
        self.speed = 1.0 / seconds.max(1e-5);
        self.update(0.0);
    }

    pub fn update(&mut self, delta: f32) {
        if delta.is_finite() && delta > 0.0 {
            self.t = (self.t + delta * self.speed).min(1.0);
        }
        self.incoming.intensity = self.t;
        self.current.intensity = 1.0 - self.t;
    }

    /// Transition progress in `0..=1`.
    pub fn progress(&self) -> f32 {
        self.t
    }

    pub fn fog_opacity(&self) -> f32 {
        self.mix(self.current.fog_opacity, self.incoming.fog_opacity, self.t)
    }

    pub fn fog_density(&self) -> f32 {
        self.mix(self.current.fog_density, self.incoming.fog_density, self.t)
    }

    pub fn fog_curve(&self) -> f32 {
        self.mix(self.current.fog_curve, self.incoming.fog_curve, self.t)
    }

    pub fn clouds(&self) -> f32 {
        self.mix(self.current.clouds, self.incoming.clouds, self.t.sqrt())
    }

    pub fn presets(&self) -> [&WeatherPreset; 2] {
        [&self.current, &self.incoming]
    }

    fn mix(&self, from: f32, to: f32, t: f32) -> f32 {
        if t >= 1.0 {
            return to.max(0.0);
        }
        (to * t + from * (1.0 - t)).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rain() -> WeatherPreset {
        WeatherPreset {
            fall: FallParams {
                texture: "misc/rain".into(),
                min_opacity: 0.2,
                max_opacity: 0.8,
                max_intensity: 1.0,
                opaque: false,
                ..FallParams::default()
            },
            fog_opacity: 0.8,
            fog_density: 2.0,
            fog_curve: 0.5,
            clouds: 0.9,
            intensity: 1.0,
        }
    }

    #[test]
    fn fully_transitioned_mixer_reports_incoming_values_exactly() {
        let mut weather = Weather::new();
        weather.current.fog_opacity = 0.3;
        weather.current.clouds = 0.1;
        weather.change(rain(), 2.0, "rain");
        weather.update(5.0);

        let preset = rain();
        assert_eq!(weather.progress(), 1.0);
        assert_eq!(weather.fog_opacity(), preset.fog_opacity);
        assert_eq!(weather.fog_density(), preset.fog_density);
        assert_eq!(weather.fog_curve(), preset.fog_curve);
        assert_eq!(weather.clouds(), preset.clouds);
        assert_eq!(weather.incoming.intensity, 1.0);
        assert_eq!(weather.current.intensity, 0.0);
    }

    #[test]
    fn progress_is_monotonic_and_ignores_negative_delta() {
        let mut weather = Weather::new();
        weather.change(rain(), 4.0, "rain");
        let mut last = weather.progress();
        for delta in [0.5, -3.0, 0.25, f32::NAN, 1.0] {
            weather.update(delta);
            assert!(weather.progress() >= last);
            last = weather.progress();
        }
        assert!((last - 0.4375).abs() < 1e-6);
    }

    #[test]
    fn blended_scalars_are_never_negative() {
        let mut weather = Weather::new();
        weather.current.fog_density = -4.0;
        weather.change(WeatherPreset::default(), 1.0, "clear");
        weather.current.fog_density = -4.0;
        weather.update(0.1);
        assert!(weather.fog_density() >= 0.0);
        assert!(weather.fog_opacity() >= 0.0);
    }

    #[test]
    fn opaque_precipitation_squares_opacity_and_clips() {
        let mut preset = rain();
        preset.fall.opaque = true;
        preset.intensity = 0.5;
        let (clip, opacity) = preset.precipitation_opacity();
        let t = 0.5 * (0.8 - 0.2) + 0.2;
        assert!(clip);
        assert!((opacity - t * t).abs() < 1e-6);

        preset.fall.opaque = false;
        let (clip, opacity) = preset.precipitation_opacity();
        assert!(!clip);
        assert!((opacity - t).abs() < 1e-6);
    }

    #[test]
    fn preset_parses_with_defaults() {
        let preset = WeatherPreset::from_json(r#"{"clouds": 0.5, "fall": {"texture": "snow"}}"#)
            .expect("valid preset");
        assert_eq!(preset.clouds, 0.5);
        assert_eq!(preset.fall.texture, "snow");
        assert_eq!(preset.fog_density, 1.0);
    }
}
