//! Interactive camera: pose, arcball orbit, dolly and pan.
//!
//! Input handlers only mutate the pose and mark the camera changed; the
//! per-frame [`CameraController::tick`] turns the accumulated rotation into a
//! new pose, publishes the camera uniforms and reports whether progressive
//! accumulation has to restart.

use bytemuck::{Pod, Zeroable};

use crate::backend::{bindings, Backend, BufferData};
use crate::util::{frame_from_basis, is_degenerate_pose, look_at_basis, Error, Mat4, Quat, Result, Vec2, Vec3, Vec4};

/// World units a full-viewport pan drag moves the camera.
const PAN_DISTANCE_SCALE: f32 = 200.0;

/// Largest fraction of the eye-lookat distance one dolly event may cover.
const MAX_DOLLY_FRACTION: f32 = 0.9;

/// Camera uniforms consumed by ray generation.
///
/// `u`, `v`, `w` are scaled: `w` spans eye to lookat, `v` the half-height of
/// the image plane at that distance, `u` the half-width.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub eye: [f32; 3],
    pub u: [f32; 3],
    pub v: [f32; 3],
    pub w: [f32; 3],
}

/// Orthonormal camera basis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBasis {
    pub u: Vec3,
    pub v: Vec3,
    pub w: Vec3,
}

/// Whether accumulation is still valid for the current pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Stable,
    Changed,
}

/// Mouse drag between two pixel positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drag {
    pub from: Vec2,
    pub to: Vec2,
}

impl Drag {
    pub fn new(from: Vec2, to: Vec2) -> Self {
        Self { from, to }
    }
}

/// Maps normalized screen positions onto a virtual trackball.
#[derive(Debug, Clone, Copy)]
pub struct Arcball {
    center: Vec2,
    radius: f32,
}

impl Default for Arcball {
    fn default() -> Self {
        Self {
            center: Vec2::splat(0.5),
            radius: 0.45,
        }
    }
}

impl Arcball {
    /// Rotation taking `from` to `to` on the ball; both in `[0, 1]²`,
    /// y pointing down.
    pub fn rotate(&self, from: Vec2, to: Vec2) -> Mat4 {
        let a = self.to_sphere(from);
        let b = self.to_sphere(to);
        let c = a.cross(b);
        let q = Quat::from_xyzw(c.x, c.y, c.z, a.dot(b));
        if q.length_squared() < 1e-12 {
            return Mat4::IDENTITY;
        }
        Mat4::from_quat(q.normalize())
    }

    fn to_sphere(&self, v: Vec2) -> Vec3 {
        let x = (v.x - self.center.x) / self.radius;
        let y = (1.0 - v.y - self.center.y) / self.radius;
        let len2 = x * x + y * y;
        if len2 > 1.0 {
            let len = len2.sqrt();
            Vec3::new(x / len, y / len, 0.0)
        } else {
            Vec3::new(x, y, (1.0 - len2).sqrt())
        }
    }
}

/// Camera state machine. Starts [`CameraState::Changed`] so the first frame
/// resets accumulation.
#[derive(Debug, Clone)]
pub struct CameraController {
    eye: Vec3,
    lookat: Vec3,
    up: Vec3,
    rotation: Mat4,
    /// Eye and lookat accepted by the last tick
    settled: (Vec3, Vec3),
    basis: CameraBasis,
    frame: Mat4,
    state: CameraState,
    /// Vertical field of view in degrees
    fov: f32,
    viewport: (u32, u32),
    arcball: Arcball,
}

impl CameraController {
    /// Fails with [`Error::InvalidScene`] when the pose has no look-at basis.
    pub fn new(eye: Vec3, lookat: Vec3, up: Vec3, fov: f32, width: u32, height: u32) -> Result<Self> {
        check_pose(eye, lookat, up)?;
        let mut cam = Self {
            eye,
            lookat,
            up,
            rotation: Mat4::IDENTITY,
            settled: (eye, lookat),
            basis: CameraBasis {
                u: Vec3::X,
                v: Vec3::Y,
                w: Vec3::NEG_Z,
            },
            frame: Mat4::IDENTITY,
            state: CameraState::Changed,
            fov,
            viewport: (width.max(1), height.max(1)),
            arcball: Arcball::default(),
        };
        cam.update_frame();
        Ok(cam)
    }

    pub fn eye(&self) -> Vec3 {
        self.eye
    }

    pub fn lookat(&self) -> Vec3 {
        self.lookat
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn basis(&self) -> CameraBasis {
        self.basis
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn is_changed(&self) -> bool {
        self.state == CameraState::Changed
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.viewport.0 as f32 / self.viewport.1 as f32
    }

    /// Set the pose directly. A degenerate pose is rejected and leaves the
    /// camera untouched.
    pub fn set_pose(&mut self, eye: Vec3, lookat: Vec3, up: Vec3) -> Result<()> {
        check_pose(eye, lookat, up)?;
        self.eye = eye;
        self.lookat = lookat;
        self.up = up;
        self.state = CameraState::Changed;
        Ok(())
    }

    /// Arcball rotation from a drag. Composes with rotation not yet applied.
    pub fn apply_orbit(&mut self, drag: Drag) {
        let size = self.viewport_size();
        let a = drag.from / size;
        let b = drag.to / size;
        self.rotation = self.arcball.rotate(b, a) * self.rotation;
        self.state = CameraState::Changed;
    }

    /// Move the eye towards lookat by the dominant drag axis.
    pub fn apply_dolly(&mut self, drag: Drag) {
        let d = (drag.to - drag.from) / self.viewport_size();
        let dmax = if d.x.abs() > d.y.abs() { d.x } else { d.y };
        let scale = dmax.min(MAX_DOLLY_FRACTION);
        self.eye += (self.lookat - self.eye) * scale;
        self.state = CameraState::Changed;
    }

    /// Translate eye and lookat along the camera's right/up axes.
    pub fn apply_pan(&mut self, drag: Drag) {
        let d = (drag.to - drag.from) / self.viewport_size();
        let offset = self.frame * Vec4::new(-d.x, d.y, 0.0, 0.0);
        let offset = offset.truncate() * PAN_DISTANCE_SCALE;
        self.eye += offset;
        self.lookat += offset;
        self.state = CameraState::Changed;
    }

    /// New viewport size. Returns false (and changes nothing) when unchanged.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        let size = (width.max(1), height.max(1));
        if size == self.viewport {
            return false;
        }
        self.viewport = size;
        self.state = CameraState::Changed;
        true
    }

    /// Per-frame update. Applies pending rotation, publishes uniforms and
    /// returns true when accumulation must reset.
    ///
    /// A pose without a look-at basis (an orbit ending straight above the
    /// lookat point, say) is dropped and the last settled pose kept.
    pub fn tick(&mut self, backend: &mut dyn Backend) -> Result<bool> {
        if is_degenerate_pose(self.eye, self.lookat, self.up) {
            log::warn!("camera pose {} -> {} is degenerate, keeping the previous one", self.eye, self.lookat);
            (self.eye, self.lookat) = self.settled;
        }
        self.update_frame();
        let frame_inv = self.frame.inverse();
        // The rotation is applied twice on purpose; it sets the orbit speed.
        let trans = self.frame * self.rotation * self.rotation * frame_inv;
        let eye = trans.transform_point3(self.eye);
        let lookat = trans.transform_point3(self.lookat);
        if is_degenerate_pose(eye, lookat, self.up) {
            log::debug!("orbit ignored: view would align with the up vector");
        } else {
            self.eye = eye;
            self.lookat = lookat;
        }
        self.settled = (self.eye, self.lookat);

        let (u, v, w) = look_at_basis(self.eye, self.lookat, self.up);
        self.basis = CameraBasis { u, v, w };
        self.rotation = Mat4::IDENTITY;

        let reset = self.state == CameraState::Changed;
        self.state = CameraState::Stable;

        backend.bind_buffer(bindings::CAMERA, BufferData::Camera(self.uniform()))?;
        Ok(reset)
    }

    /// Scaled uniforms for the current pose and basis.
    pub fn uniform(&self) -> CameraUniform {
        let wlen = (self.lookat - self.eye).length();
        let vlen = wlen * (0.5 * self.fov).to_radians().tan();
        let ulen = vlen * self.aspect_ratio();
        CameraUniform {
            eye: self.eye.to_array(),
            u: (self.basis.u * ulen).to_array(),
            v: (self.basis.v * vlen).to_array(),
            w: (self.basis.w * wlen).to_array(),
        }
    }

    fn update_frame(&mut self) {
        let (u, v, w) = look_at_basis(self.eye, self.lookat, self.up);
        self.basis = CameraBasis { u, v, w };
        self.frame = frame_from_basis(u, v, -w, self.lookat);
    }

    fn viewport_size(&self) -> Vec2 {
        Vec2::new(self.viewport.0 as f32, self.viewport.1 as f32)
    }
}

fn check_pose(eye: Vec3, lookat: Vec3, up: Vec3) -> Result<()> {
    if is_degenerate_pose(eye, lookat, up) {
        return Err(Error::InvalidScene(format!(
            "camera at {eye} looking at {lookat} has no basis with up {up}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    fn camera() -> CameraController {
        CameraController::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, 35.0, 100, 100).unwrap()
    }

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_basis_orthonormal() {
        let mut cam = camera();
        let mut mock = MockBackend::new();
        cam.tick(&mut mock).unwrap();
        let CameraBasis { u, v, w } = cam.basis();
        assert!(u.dot(v).abs() < 1e-6);
        assert!(v.dot(w).abs() < 1e-6);
        assert!(u.dot(w).abs() < 1e-6);
        for axis in [u, v, w] {
            assert!((axis.length() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_first_tick_resets_then_stable() {
        let mut cam = camera();
        let mut mock = MockBackend::new();
        assert!(cam.is_changed());
        assert!(cam.tick(&mut mock).unwrap());
        assert_eq!(cam.state(), CameraState::Stable);
        assert!(!cam.tick(&mut mock).unwrap());
        assert!(!cam.tick(&mut mock).unwrap());
    }

    #[test]
    fn test_publishes_every_tick() {
        let mut cam = camera();
        let mut mock = MockBackend::new();
        for _ in 0..3 {
            cam.tick(&mut mock).unwrap();
        }
        assert_eq!(mock.bind_count(bindings::CAMERA), 3);
        match mock.binding(bindings::CAMERA) {
            Some(BufferData::Camera(u)) => assert_eq!(u.eye, [0.0, 0.0, 5.0]),
            other => panic!("unexpected camera binding {other:?}"),
        }
    }

    #[test]
    fn test_set_pose_marks_changed() {
        let mut cam = camera();
        let mut mock = MockBackend::new();
        cam.tick(&mut mock).unwrap();
        cam.set_pose(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, Vec3::Y).unwrap();
        assert!(cam.is_changed());
        assert!(cam.tick(&mut mock).unwrap());
        assert_eq!(cam.eye(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_degenerate_pose_rejected() {
        let top_down = CameraController::new(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, Vec3::Y, 35.0, 100, 100);
        assert!(matches!(top_down, Err(Error::InvalidScene(_))));
        let no_view = CameraController::new(Vec3::ONE, Vec3::ONE, Vec3::Y, 35.0, 100, 100);
        assert!(matches!(no_view, Err(Error::InvalidScene(_))));

        let mut cam = camera();
        let mut mock = MockBackend::new();
        cam.tick(&mut mock).unwrap();
        let err = cam.set_pose(Vec3::new(0.0, -3.0, 0.0), Vec3::ZERO, Vec3::Y).unwrap_err();
        assert!(matches!(err, Error::InvalidScene(_)));
        assert_eq!(cam.eye(), Vec3::new(0.0, 0.0, 5.0));
        assert!(!cam.is_changed());
    }

    #[test]
    fn test_orbit_over_the_pole_keeps_pose() {
        let mut cam = camera();
        let mut mock = MockBackend::new();
        cam.tick(&mut mock).unwrap();

        // Applied twice this quarter turn lands the eye straight above lookat
        cam.rotation = Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_4);
        cam.state = CameraState::Changed;
        assert!(cam.tick(&mut mock).unwrap());

        assert!(approx(cam.eye(), Vec3::new(0.0, 0.0, 5.0)));
        assert!(approx(cam.lookat(), Vec3::ZERO));
        let CameraBasis { u, v, w } = cam.basis();
        for axis in [u, v, w] {
            assert!((axis.length() - 1.0).abs() < 1e-5);
        }
        let published = cam.uniform();
        assert!(published.eye.iter().chain(&published.w).all(|c| c.is_finite()));

        // The camera keeps working afterwards
        cam.apply_orbit(Drag::new(Vec2::new(50.0, 50.0), Vec2::new(60.0, 45.0)));
        cam.tick(&mut mock).unwrap();
        assert!((cam.eye().length() - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_dolly_moves_towards_lookat() {
        let mut cam = camera();
        cam.apply_dolly(Drag::new(Vec2::new(0.0, 0.0), Vec2::new(50.0, 10.0)));
        assert!(approx(cam.eye(), Vec3::new(0.0, 0.0, 2.5)));
        assert!(cam.is_changed());
    }

    #[test]
    fn test_dolly_clamped() {
        let mut cam = camera();
        cam.apply_dolly(Drag::new(Vec2::new(0.0, 0.0), Vec2::new(0.0, 300.0)));
        assert!(approx(cam.eye(), Vec3::new(0.0, 0.0, 0.5)));
    }

    #[test]
    fn test_pan_moves_eye_and_lookat_together() {
        let mut cam = camera();
        cam.apply_pan(Drag::new(Vec2::new(50.0, 50.0), Vec2::new(60.0, 50.0)));
        assert!(approx(cam.eye(), Vec3::new(-20.0, 0.0, 5.0)));
        assert!(approx(cam.lookat(), Vec3::new(-20.0, 0.0, 0.0)));
        assert!(cam.is_changed());
    }

    #[test]
    fn test_orbit_keeps_distance_and_lookat() {
        let mut cam = camera();
        let mut mock = MockBackend::new();
        cam.tick(&mut mock).unwrap();
        cam.apply_orbit(Drag::new(Vec2::new(50.0, 50.0), Vec2::new(60.0, 45.0)));
        assert!(cam.tick(&mut mock).unwrap());
        assert!(approx(cam.lookat(), Vec3::ZERO));
        assert!((cam.eye().length() - 5.0).abs() < 1e-3);
        assert!(!approx(cam.eye(), Vec3::new(0.0, 0.0, 5.0)));
    }

    #[test]
    fn test_orbit_without_motion_is_identity() {
        let mut cam = camera();
        let mut mock = MockBackend::new();
        cam.apply_orbit(Drag::new(Vec2::new(30.0, 30.0), Vec2::new(30.0, 30.0)));
        cam.tick(&mut mock).unwrap();
        assert!(approx(cam.eye(), Vec3::new(0.0, 0.0, 5.0)));
    }

    #[test]
    fn test_resize_marks_changed_only_on_new_size() {
        let mut cam = camera();
        let mut mock = MockBackend::new();
        cam.tick(&mut mock).unwrap();
        assert!(!cam.resize(100, 100));
        assert!(!cam.is_changed());
        assert!(cam.resize(200, 100));
        assert!(cam.is_changed());
        assert!((cam.aspect_ratio() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_uniform_scaling() {
        let cam = camera();
        let u = cam.uniform();
        let w = Vec3::from(u.w);
        assert!(approx(w, Vec3::new(0.0, 0.0, -5.0)));
        let expected_v = 5.0 * (17.5f32).to_radians().tan();
        assert!((Vec3::from(u.v).length() - expected_v).abs() < 1e-4);
        assert!((Vec3::from(u.u).length() - expected_v).abs() < 1e-4);
    }
}
