mod software;

use image::DynamicImage;
use thiserror::Error;

use crate::scene::{SceneNode, Vec3};

pub use software::SoftwareViewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Never renders on its own.
    Disabled,
    /// Renders exactly one frame on the next render call.
    Once,
}

/// Capture camera. Looks down the negative Z axis from `position`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub fov_degrees: f32,
}

/// Everything the capture viewport draws for one frame.
#[derive(Debug, Clone)]
pub struct StageView<'a> {
    pub camera: CameraPose,
    /// Child of the render holder, if a static scene is attached.
    pub holder: Option<&'a SceneNode>,
    /// Roots of simulations currently marked visible.
    pub simulation_roots: Vec<&'a SceneNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("no frame has been rendered yet")]
    NotRendered,
    #[error("render requested while the viewport update mode is disabled")]
    UpdateDisabled,
    #[error("render backend failed: {message}")]
    Backend { message: String },
}

/// Off-screen render target the studio photographs through.
pub trait CaptureViewport {
    fn resolution(&self) -> (u32, u32);

    fn set_update_mode(&mut self, mode: UpdateMode);

    fn update_mode(&self) -> UpdateMode;

    /// Performs one render pass. Only valid while the mode is `Once`.
    fn render(&mut self, stage: &StageView<'_>) -> Result<(), CaptureError>;

    /// Reads back the most recently rendered frame.
    fn read_frame(&mut self) -> Result<DynamicImage, CaptureError>;
}
