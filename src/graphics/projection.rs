use glam::{Mat4, Vec3, Vec4};

/// Perspective camera mapping world points to pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    view_proj: Mat4,
    width: f32,
    height: f32,
}

impl Camera {
    /// Camera at `eye` looking at the origin, vertical field of view in degrees.
    pub fn new(eye: Vec3, fov_degrees: f32, width: u32, height: u32) -> Self {
        Self::looking_at(eye, Vec3::ZERO, fov_degrees, width, height)
    }

    pub fn looking_at(eye: Vec3, target: Vec3, fov_degrees: f32, width: u32, height: u32) -> Self {
        let width = width.max(1) as f32;
        let height = height.max(1) as f32;
        let proj = Mat4::perspective_rh(fov_degrees.to_radians(), width / height, 0.1, 1000.0);
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        Self {
            view_proj: proj * view,
            width,
            height,
        }
    }

    /// Screen position plus the perspective scale at that depth, or `None` behind the camera.
    pub fn project(&self, point: Vec3) -> Option<(f32, f32, f32)> {
        let clip = self.view_proj * Vec4::new(point.x, point.y, point.z, 1.0);
        if clip.w <= 1e-4 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let x = (ndc.x * 0.5 + 0.5) * self.width;
        let y = (1.0 - (ndc.y * 0.5 + 0.5)) * self.height;
        Some((x, y, self.height / clip.w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_projects_to_centre() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 8.0), 60.0, 800, 600);
        let (x, y, _) = camera.project(Vec3::ZERO).unwrap();
        assert!((x - 400.0).abs() < 1e-3);
        assert!((y - 300.0).abs() < 1e-3);
    }

    #[test]
    fn test_nearer_points_scale_larger_and_behind_is_culled() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 8.0), 60.0, 800, 600);
        let (_, _, far) = camera.project(Vec3::new(0.0, 0.0, -10.0)).unwrap();
        let (_, _, near) = camera.project(Vec3::new(0.0, 0.0, 4.0)).unwrap();
        assert!(near > far);
        assert!(camera.project(Vec3::new(0.0, 0.0, 20.0)).is_none());

        let (_, up, _) = camera.project(Vec3::new(0.0, 1.0, 0.0)).unwrap();
        assert!(up < 300.0);
    }
}
