//! Camera utilities

use glam::{Mat4, Vec3, Vec4};

/// Camera data for rendering (must match the WGSL `Camera` struct)
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Camera {
    /// Combined view-projection matrix
    pub view_proj: Mat4,
    /// Inverse of `view_proj`, used to rebuild world positions from depth
    pub inv_view_proj: Mat4,
    /// Camera position in world space
    pub position: Vec3,
    /// Elapsed time in seconds
    pub time: f32,
    /// Viewport width, height, 1/width, 1/height
    pub viewport: Vec4,
}

impl Camera {
    pub fn new(view_proj: Mat4, position: Vec3, time: f32) -> Self {
        Self {
            view_proj,
            inv_view_proj: view_proj.inverse(),
            position,
            time,
            viewport: Vec4::ZERO,
        }
    }

    /// Create a perspective camera
    pub fn perspective(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
        time: f32,
    ) -> Self {
        let view = Mat4::look_at_rh(position, target, up);
        let proj = Mat4::perspective_rh(fov_y, aspect, near, far);
        Self::new(proj * view, position, time)
    }

    /// Copy of this camera with the viewport block filled for `width` x `height`
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        self.viewport = Vec4::new(w, h, 1.0 / w, 1.0 / h);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_round_trips_a_point() {
        let camera = Camera::perspective(
            Vec3::new(0.0, 2.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            60f32.to_radians(),
            16.0 / 9.0,
            0.1,
            100.0,
            0.0,
        );
        let world = Vec3::new(0.5, 0.25, -1.0);
        let clip = camera.view_proj * world.extend(1.0);
        let back = camera.inv_view_proj * clip;
        let back = back.truncate() / back.w;
        assert!((back - world).length() < 1e-4, "got {back:?}");
    }

    #[test]
    fn viewport_block_holds_reciprocals() {
        let camera = Camera::new(Mat4::IDENTITY, Vec3::ZERO, 0.0).with_viewport(200, 100);
        assert_eq!(camera.viewport, Vec4::new(200.0, 100.0, 0.005, 0.01));
    }
}
