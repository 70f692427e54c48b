//! Scene viewer configuration
//!
//! Every section has defaults, so a file only needs the values it changes. The
//! `[[models]]` list describes the scene; at least one model is required.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::{Config, ConfigError};
use crate::render::vulkan::texture::{AddressMode, SamplerSettings};

/// Window title and initial size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Test Program".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Logging and pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,
    /// Frame rate cap; zero runs uncapped
    pub target_fps: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            target_fps: 0,
        }
    }
}

/// Device features and image quality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Enable the Khronos validation layer
    pub validation: bool,
    /// Upper bound on MSAA samples; 1 disables multisampling
    pub max_msaa_samples: u32,
    /// Requested anisotropic filtering level; 0 disables it
    pub max_anisotropy: f32,
    /// Upper bound on texture mip levels
    pub max_mip_levels: Option<u32>,
    /// Texture addressing outside `[0, 1]`
    pub address_mode: AddressMode,
    /// Color the frame is cleared to
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            max_msaa_samples: 4,
            max_anisotropy: 16.0,
            max_mip_levels: None,
            address_mode: AddressMode::Repeat,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RenderConfig {
    /// Sampler settings applied to every texture
    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            address_mode: self.address_mode,
            max_anisotropy: self.max_anisotropy,
            max_mip_levels: self.max_mip_levels,
        }
    }

    /// Whether sampler anisotropy must be part of the device contract
    pub fn anisotropy_requested(&self) -> bool {
        self.max_anisotropy > 0.0
    }
}

/// Compiled SPIR-V locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Vertex shader SPIR-V
    pub vertex: PathBuf,
    /// Fragment shader SPIR-V
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("target/shaders/scene.vert.spv"),
            fragment: PathBuf::from("target/shaders/scene.frag.spv"),
        }
    }
}

/// Initial orbit camera pose and input response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Distance from the origin
    pub distance: f32,
    /// Rotation about +Y in degrees
    pub yaw_degrees: f32,
    /// Rotation about +X in degrees
    pub pitch_degrees: f32,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
    /// Closest zoom
    pub min_distance: f32,
    /// Farthest zoom
    pub max_distance: f32,
    /// Radians of rotation per pixel of drag
    pub sensitivity: f32,
    /// Fraction of the current distance moved per scroll step
    pub zoom_factor: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            distance: 4.0,
            yaw_degrees: -45.0,
            pitch_degrees: 15.0,
            fov_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
            min_distance: 0.5,
            max_distance: 100.0,
            sensitivity: 0.004,
            zoom_factor: 0.1,
        }
    }
}

/// One model in the scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// OBJ mesh path
    pub mesh: PathBuf,
    /// Texture image path
    pub texture: PathBuf,
    /// World position
    #[serde(default)]
    pub position: [f32; 3],
    /// Per-axis scale
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            mesh: PathBuf::from("resources/models/cube.obj"),
            texture: PathBuf::from("resources/textures/checker.png"),
            position: [0.0; 3],
            scale: unit_scale(),
        }
    }
}

/// Complete viewer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Window settings
    pub window: WindowConfig,
    /// Logging and pacing
    pub engine: EngineConfig,
    /// Renderer settings
    pub render: RenderConfig,
    /// Shader binaries
    pub shaders: ShaderConfig,
    /// Camera settings
    pub camera: CameraConfig,
    /// Scene contents, drawn in order
    pub models: Vec<ModelConfig>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            engine: EngineConfig::default(),
            render: RenderConfig::default(),
            shaders: ShaderConfig::default(),
            camera: CameraConfig::default(),
            models: vec![ModelConfig::default()],
        }
    }
}

impl Config for ViewerConfig {}

impl ViewerConfig {
    /// Reject values the renderer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| Err(ConfigError::Invalid(reason.to_string()));

        if self.window.width == 0 || self.window.height == 0 {
            return invalid("window width and height must be non-zero");
        }
        if self.models.is_empty() {
            return invalid("at least one [[models]] entry is required");
        }
        if !self.render.max_msaa_samples.is_power_of_two() || self.render.max_msaa_samples > 64 {
            return invalid("render.max_msaa_samples must be a power of two between 1 and 64");
        }
        if self.render.max_anisotropy < 0.0 {
            return invalid("render.max_anisotropy must not be negative");
        }
        if self.render.max_mip_levels == Some(0) {
            return invalid("render.max_mip_levels must be at least 1");
        }

        let camera = &self.camera;
        if camera.near <= 0.0 || camera.near >= camera.far {
            return invalid("camera.near must be positive and less than camera.far");
        }
        if camera.min_distance <= 0.0 || camera.min_distance > camera.max_distance {
            return invalid("camera.min_distance must be positive and not exceed camera.max_distance");
        }
        if !(camera.fov_degrees > 0.0 && camera.fov_degrees < 180.0) {
            return invalid("camera.fov_degrees must be between 0 and 180");
        }

        Ok(())
    }

    /// Load a file and validate it
    pub fn load_validated<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse_toml(source: &str) -> Result<ViewerConfig, ConfigError> {
        ViewerConfig::from_str_for_path(source, Path::new("viewer.toml"))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ViewerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.window.title, "Vulkan Test Program");
        assert_eq!((config.window.width, config.window.height), (800, 600));
        assert_eq!(config.render.max_msaa_samples, 4);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = parse_toml(
            r#"
            [window]
            width = 1280

            [render]
            address_mode = "clamp_to_edge"
            max_mip_levels = 1

            [[models]]
            mesh = "a.obj"
            texture = "a.png"
            position = [1.0, 0.0, 0.0]

            [[models]]
            mesh = "b.obj"
            texture = "b.png"
            scale = [2.0, 2.0, 2.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.render.address_mode, AddressMode::ClampToEdge);
        assert_eq!(config.render.max_mip_levels, Some(1));
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[0].scale, [1.0, 1.0, 1.0]);
        assert_eq!(config.models[1].position, [0.0, 0.0, 0.0]);
        config.validate().unwrap();
    }

    #[test]
    fn test_ron_format_supported() {
        let config = ViewerConfig::from_str_for_path(
            "(window: (title: \"ron\", width: 640, height: 480))",
            Path::new("viewer.ron"),
        )
        .unwrap();
        assert_eq!(config.window.title, "ron");
        assert_eq!(config.models.len(), 1);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        assert!(matches!(
            ViewerConfig::from_str_for_path("", Path::new("viewer.json")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_validation_failures() {
        let check = |mutate: fn(&mut ViewerConfig)| {
            let mut config = ViewerConfig::default();
            mutate(&mut config);
            matches!(config.validate(), Err(ConfigError::Invalid(_)))
        };

        assert!(check(|c| c.window.width = 0));
        assert!(check(|c| c.models.clear()));
        assert!(check(|c| c.render.max_msaa_samples = 3));
        assert!(check(|c| c.render.max_msaa_samples = 0));
        assert!(check(|c| c.render.max_anisotropy = -1.0));
        assert!(check(|c| c.camera.near = c.camera.far));
        assert!(check(|c| c.camera.min_distance = 0.0));
    }

    #[test]
    fn test_sampler_settings_follow_render_section() {
        let render = RenderConfig {
            max_anisotropy: 0.0,
            address_mode: AddressMode::MirroredRepeat,
            max_mip_levels: Some(3),
            ..RenderConfig::default()
        };
        let settings = render.sampler_settings();
        assert!(!render.anisotropy_requested());
        assert_eq!(settings.address_mode, AddressMode::MirroredRepeat);
        assert_eq!(settings.max_mip_levels, Some(3));
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!("vk_renderer_config_{}.toml", std::process::id()));
        let mut config = ViewerConfig::default();
        config.engine.target_fps = 144;
        config.save_to_file(&path).unwrap();

        let loaded = ViewerConfig::load_validated(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.engine.target_fps, 144);
    }
}
