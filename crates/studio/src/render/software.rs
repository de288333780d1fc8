use image::{DynamicImage, Rgba, RgbaImage};
use tracing::debug;

use crate::scene::WorldShape;

use super::{CameraPose, CaptureError, CaptureViewport, StageView, UpdateMode};

const NEAR_PLANE: f32 = 0.01;
const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

#[derive(Debug, Clone, Copy)]
struct ProjectedDisc {
    cx: f32,
    cy: f32,
    radius_px: f32,
    depth: f32,
    color: [u8; 4],
}

/// CPU capture target that draws every visible shape as a flat disc with a
/// pinhole projection. Lets the studio run headless and in tests.
#[derive(Debug)]
pub struct SoftwareViewport {
    width: u32,
    height: u32,
    clear_color: [u8; 4],
    mode: UpdateMode,
    frame: Option<RgbaImage>,
    render_count: u64,
}

impl SoftwareViewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            clear_color: TRANSPARENT,
            mode: UpdateMode::Disabled,
            frame: None,
            render_count: 0,
        }
    }

    pub fn with_clear_color(mut self, color: [u8; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    fn project(&self, camera: &CameraPose, shape: &WorldShape) -> Option<ProjectedDisc> {
        let relative = shape.center - camera.position;
        let depth = -relative.z;
        if depth <= NEAR_PLANE {
            return None;
        }
        let fov = camera.fov_degrees.clamp(1.0, 179.0).to_radians();
        let focal = (self.height as f32 * 0.5) / (fov * 0.5).tan();
        Some(ProjectedDisc {
            cx: self.width as f32 * 0.5 + relative.x * focal / depth,
            cy: self.height as f32 * 0.5 - relative.y * focal / depth,
            radius_px: shape.radius * focal / depth,
            depth,
            color: shape.color,
        })
    }
}

impl CaptureViewport for SoftwareViewport {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_update_mode(&mut self, mode: UpdateMode) {
        self.mode = mode;
    }

    fn update_mode(&self) -> UpdateMode {
        self.mode
    }

    fn render(&mut self, stage: &StageView<'_>) -> Result<(), CaptureError> {
        if self.mode != UpdateMode::Once {
            return Err(CaptureError::UpdateDisabled);
        }

        let shapes = stage
            .holder
            .into_iter()
            .chain(stage.simulation_roots.iter().copied())
            .flat_map(|node| node.visible_shapes())
            .collect::<Vec<_>>();
        let mut discs = shapes
            .iter()
            .filter_map(|shape| self.project(&stage.camera, shape))
            .collect::<Vec<_>>();
        // Painter's order, farthest first.
        discs.sort_by(|a, b| b.depth.total_cmp(&a.depth));

        let mut frame = RgbaImage::from_pixel(self.width, self.height, Rgba(self.clear_color));
        for disc in &discs {
            draw_disc(&mut frame, disc);
        }

        self.frame = Some(frame);
        self.mode = UpdateMode::Disabled;
        self.render_count += 1;
        debug!(
            shape_count = shapes.len(),
            drawn = discs.len(),
            render_count = self.render_count,
            "software_viewport_rendered"
        );
        Ok(())
    }

    fn read_frame(&mut self) -> Result<DynamicImage, CaptureError> {
        self.frame
            .clone()
            .map(DynamicImage::ImageRgba8)
            .ok_or(CaptureError::NotRendered)
    }
}

fn draw_disc(frame: &mut RgbaImage, disc: &ProjectedDisc) {
    if disc.radius_px <= 0.0 || !disc.radius_px.is_finite() {
        return;
    }
    let (width, height) = frame.dimensions();
    let min_x = (disc.cx - disc.radius_px).floor().max(0.0) as i64;
    let max_x = (disc.cx + disc.radius_px).ceil().min(width as f32 - 1.0) as i64;
    let min_y = (disc.cy - disc.radius_px).floor().max(0.0) as i64;
    let max_y = (disc.cy + disc.radius_px).ceil().min(height as f32 - 1.0) as i64;
    let radius_sq = disc.radius_px * disc.radius_px;

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = x as f32 + 0.5 - disc.cx;
            let dy = y as f32 + 0.5 - disc.cy;
            if dx * dx + dy * dy <= radius_sq {
                frame.put_pixel(x as u32, y as u32, Rgba(disc.color));
            }
        }
    }
}
