//! Solar-system scene model — bodies, orbital motion, and screen projection.
//!
//! Holds the `Vec3` math type used across the interaction subsystem, the
//! selectable-body registry, and the camera-basis perspective projection
//! that keeps the 2D overlay synchronized to 3D positions.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

// ── Vector math ─────────────────────────────────────────────

/// 3D vector in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(self, s: f32) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or ZERO for degenerate input.
    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len < 1e-6 {
            Vec3::ZERO
        } else {
            self.scale(1.0 / len)
        }
    }
}

// ── Viewport ────────────────────────────────────────────────

/// Overlay viewport dimensions and projection parameters.
#[derive(Debug, Clone)]
pub struct Viewport {
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
    /// Vertical field of view in degrees.
    pub fov_y_deg: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
            fov_y_deg: 60.0,
        }
    }
}

impl Viewport {
    /// Parse a "WxH" resolution string. Returns (width, height) or None.
    pub fn parse_resolution(s: &str) -> Option<(f32, f32)> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 2 {
            return None;
        }
        let w = parts[0].parse::<f32>().ok()?;
        let h = parts[1].parse::<f32>().ok()?;
        if w > 0.0 && h > 0.0 {
            Some((w, h))
        } else {
            None
        }
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

// ── Camera basis & projection ───────────────────────────────

/// Orthonormal view basis (right, up, forward) for a camera at `eye`
/// looking at the world origin.
pub fn view_basis(eye: Vec3) -> (Vec3, Vec3, Vec3) {
    let mut forward = Vec3::ZERO.sub(eye).normalized();
    if forward.length() < 0.5 {
        forward = Vec3::new(0.0, 0.0, -1.0);
    }

    // Avoid a degenerate basis when looking straight down the Y axis.
    let world_up = if forward.y.abs() > 0.999 {
        Vec3::new(0.0, 0.0, 1.0)
    } else {
        Vec3::new(0.0, 1.0, 0.0)
    };

    let right = forward.cross(world_up).normalized();
    let up = right.cross(forward);
    (right, up, forward)
}

/// Projected screen position of a world point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    /// Pixel x within the viewport.
    pub x: f32,
    /// Pixel y within the viewport (top-left origin).
    pub y: f32,
    /// True when the point is behind the camera plane.
    pub behind: bool,
}

/// Project a world point through a camera at `eye` (looking at origin)
/// onto viewport pixels.
pub fn project_to_screen(world: Vec3, eye: Vec3, viewport: &Viewport) -> ScreenPoint {
    let (right, up, forward) = view_basis(eye);
    let rel = world.sub(eye);
    let cz = rel.dot(forward);

    if cz <= 1e-4 {
        return ScreenPoint {
            x: 0.0,
            y: 0.0,
            behind: true,
        };
    }

    let f = 1.0 / (viewport.fov_y_deg.to_radians() * 0.5).tan();
    let ndc_x = (rel.dot(right) * f / viewport.aspect()) / cz;
    let ndc_y = (rel.dot(up) * f) / cz;

    ScreenPoint {
        x: (ndc_x * 0.5 + 0.5) * viewport.width,
        y: (0.5 - ndc_y * 0.5) * viewport.height,
        behind: false,
    }
}

// ── Bodies ──────────────────────────────────────────────────

/// Monotonically increasing target ID generator.
static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique selectable-target ID.
pub fn next_target_id() -> u64 {
    NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed)
}

/// Hit-volume radius multiplier over the visible body radius.
const HITBOX_SCALE: f32 = 2.5;

/// Minimum hit-volume radius in world units (small bodies stay pickable).
const MIN_HITBOX: f32 = 2.0;

/// Formatted display facts for the info panel.
#[derive(Debug, Clone)]
pub struct BodyInfo {
    /// Mean distance from the sun, e.g. "149.6 million km".
    pub distance: &'static str,
    /// Equatorial diameter, e.g. "12,756 km".
    pub diameter: &'static str,
    /// Orbital period, e.g. "365 days".
    pub period: &'static str,
}

/// One orbiting selectable body.
#[derive(Debug, Clone)]
pub struct Body {
    pub id: u64,
    pub name: &'static str,
    /// Orbit radius in world units.
    pub orbit_radius: f32,
    /// Visible sphere radius in world units.
    pub body_radius: f32,
    /// Oversized invisible hit-volume radius, fixed at construction.
    pub hitbox_radius: f32,
    /// Orbital period in days.
    pub period_days: f64,
    /// Current orbital angle in radians.
    pub angle: f64,
    /// World position, recomputed every tick.
    pub position: Vec3,
    /// Cached screen projection, recomputed every tick.
    pub screen: Option<ScreenPoint>,
    /// Display facts.
    pub info: BodyInfo,
}

impl Body {
    fn new(
        name: &'static str,
        orbit_radius: f32,
        body_radius: f32,
        period_days: f64,
        initial_angle: f64,
        info: BodyInfo,
    ) -> Self {
        let hitbox_radius = (body_radius * HITBOX_SCALE).max(MIN_HITBOX);
        let mut body = Self {
            id: next_target_id(),
            name,
            orbit_radius,
            body_radius,
            hitbox_radius,
            period_days,
            angle: initial_angle,
            position: Vec3::ZERO,
            screen: None,
            info,
        };
        body.recompute_position();
        body
    }

    fn recompute_position(&mut self) {
        self.position = Vec3::new(
            self.orbit_radius * self.angle.cos() as f32,
            0.0,
            self.orbit_radius * self.angle.sin() as f32,
        );
    }
}

// ── Solar system ────────────────────────────────────────────

/// The orbiting-body registry and orbital clock.
pub struct SolarSystem {
    pub bodies: Vec<Body>,
    /// Simulated days advanced per real second.
    pub time_scale: f64,
    /// Total simulated days elapsed.
    pub elapsed_days: f64,
}

impl SolarSystem {
    pub fn new() -> Self {
        let table: [(&'static str, f32, f32, f64, BodyInfo); 8] = [
            (
                "Mercury",
                10.0,
                0.8,
                88.0,
                BodyInfo {
                    distance: "57.9 million km",
                    diameter: "4,879 km",
                    period: "88 days",
                },
            ),
            (
                "Venus",
                14.0,
                1.2,
                225.0,
                BodyInfo {
                    distance: "108.2 million km",
                    diameter: "12,104 km",
                    period: "225 days",
                },
            ),
            (
                "Earth",
                18.0,
                1.3,
                365.0,
                BodyInfo {
                    distance: "149.6 million km",
                    diameter: "12,756 km",
                    period: "365 days",
                },
            ),
            (
                "Mars",
                22.0,
                1.0,
                687.0,
                BodyInfo {
                    distance: "227.9 million km",
                    diameter: "6,792 km",
                    period: "687 days",
                },
            ),
            (
                "Jupiter",
                30.0,
                3.5,
                4_333.0,
                BodyInfo {
                    distance: "778.5 million km",
                    diameter: "142,984 km",
                    period: "4,333 days",
                },
            ),
            (
                "Saturn",
                38.0,
                3.0,
                10_759.0,
                BodyInfo {
                    distance: "1,432 million km",
                    diameter: "120,536 km",
                    period: "10,759 days",
                },
            ),
            (
                "Uranus",
                46.0,
                2.2,
                30_687.0,
                BodyInfo {
                    distance: "2,867 million km",
                    diameter: "51,118 km",
                    period: "30,687 days",
                },
            ),
            (
                "Neptune",
                54.0,
                2.1,
                60_190.0,
                BodyInfo {
                    distance: "4,515 million km",
                    diameter: "49,528 km",
                    period: "60,190 days",
                },
            ),
        ];

        let bodies: Vec<Body> = table
            .into_iter()
            .enumerate()
            .map(|(i, (name, orbit, radius, period, info))| {
                // Stagger initial angles so bodies never start stacked.
                Body::new(name, orbit, radius, period, i as f64 * 0.7, info)
            })
            .collect();

        info!("Scene initialized with {} bodies", bodies.len());

        Self {
            bodies,
            time_scale: 30.0,
            elapsed_days: 0.0,
        }
    }

    /// Advance orbital angles by `dt_ms` of real time.
    pub fn tick(&mut self, dt_ms: f64) {
        let days = dt_ms / 1000.0 * self.time_scale;
        self.elapsed_days += days;
        for body in &mut self.bodies {
            body.angle = (body.angle + std::f64::consts::TAU * days / body.period_days)
                % std::f64::consts::TAU;
            body.recompute_position();
        }
    }

    /// Refresh every body's cached screen projection for the current camera.
    pub fn project_all(&mut self, eye: Vec3, viewport: &Viewport) {
        for body in &mut self.bodies {
            body.screen = Some(project_to_screen(body.position, eye, viewport));
        }
    }

    pub fn targets(&self) -> &[Body] {
        &self.bodies
    }

    pub fn target(&self, id: u64) -> Option<&Body> {
        self.bodies.iter().find(|b| b.id == id)
    }

    /// Generate s-expression listing all targets for IPC.
    pub fn list_sexp(&self) -> String {
        let mut s = String::from("(");
        for (i, body) in self.bodies.iter().enumerate() {
            if i > 0 {
                s.push(' ');
            }
            let screen = match &body.screen {
                Some(p) if !p.behind => format!(":x {:.0} :y {:.0}", p.x, p.y),
                _ => ":x nil :y nil".to_string(),
            };
            s.push_str(&format!(
                "(:id {} :name \"{}\" :orbit {:.1} :radius {:.1} :hitbox {:.1} {})",
                body.id, body.name, body.orbit_radius, body.body_radius, body.hitbox_radius, screen,
            ));
        }
        s.push(')');
        s
    }

    /// Generate s-expression with display facts for one target.
    pub fn target_info_sexp(&self, id: u64) -> Option<String> {
        self.target(id).map(|body| {
            format!(
                "(:id {} :name \"{}\" :distance \"{}\" :diameter \"{}\" :period \"{}\")",
                body.id, body.name, body.info.distance, body.info.diameter, body.info.period,
            )
        })
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:bodies {} :time-scale {:.1} :elapsed-days {:.1})",
            self.bodies.len(),
            self.time_scale,
            self.elapsed_days,
        )
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_basics() {
        let v = Vec3::new(3.0, 4.0, 0.0);
        assert!((v.length() - 5.0).abs() < 1e-6);
        let n = v.normalized();
        assert!((n.length() - 1.0).abs() < 1e-6);
        assert_eq!(Vec3::ZERO.normalized(), Vec3::ZERO);
    }

    #[test]
    fn test_vec3_cross() {
        let x = Vec3::new(1.0, 0.0, 0.0);
        let y = Vec3::new(0.0, 1.0, 0.0);
        let z = x.cross(y);
        assert!((z.z - 1.0).abs() < 1e-6);
        assert!(z.x.abs() < 1e-6 && z.y.abs() < 1e-6);
    }

    #[test]
    fn test_scene_has_eight_bodies() {
        let scene = SolarSystem::new();
        assert_eq!(scene.bodies.len(), 8);
        assert_eq!(scene.bodies[0].name, "Mercury");
        assert_eq!(scene.bodies[7].name, "Neptune");
    }

    #[test]
    fn test_hitbox_oversized() {
        let scene = SolarSystem::new();
        for body in scene.targets() {
            assert!(
                body.hitbox_radius > body.body_radius,
                "{} hitbox should exceed visible radius",
                body.name,
            );
            assert!(body.hitbox_radius >= MIN_HITBOX);
        }
    }

    #[test]
    fn test_orbit_advances() {
        let mut scene = SolarSystem::new();
        let before = scene.bodies[0].angle;
        let pos_before = scene.bodies[0].position;
        scene.tick(1000.0); // one second at default 30 days/s
        assert!(scene.bodies[0].angle != before, "Mercury should move");
        assert!(scene.bodies[0].position.sub(pos_before).length() > 0.0);
        assert!((scene.elapsed_days - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_orbit_radius_preserved() {
        let mut scene = SolarSystem::new();
        scene.tick(5000.0);
        for body in scene.targets() {
            assert!(
                (body.position.length() - body.orbit_radius).abs() < 1e-3,
                "{} should stay on its orbit",
                body.name,
            );
        }
    }

    #[test]
    fn test_project_center() {
        let viewport = Viewport::default();
        // Camera on +Z looking at origin: origin lands at viewport center.
        let p = project_to_screen(Vec3::ZERO, Vec3::new(0.0, 0.0, 40.0), &viewport);
        assert!(!p.behind);
        assert!((p.x - viewport.width / 2.0).abs() < 0.5, "x = {}", p.x);
        assert!((p.y - viewport.height / 2.0).abs() < 0.5, "y = {}", p.y);
    }

    #[test]
    fn test_project_behind_camera() {
        let viewport = Viewport::default();
        // Point further along +Z than the camera is behind it.
        let p = project_to_screen(
            Vec3::new(0.0, 0.0, 80.0),
            Vec3::new(0.0, 0.0, 40.0),
            &viewport,
        );
        assert!(p.behind);
    }

    #[test]
    fn test_project_offset_direction() {
        let viewport = Viewport::default();
        let eye = Vec3::new(0.0, 0.0, 40.0);
        // A point above the origin appears in the upper half of the screen.
        let p = project_to_screen(Vec3::new(0.0, 5.0, 0.0), eye, &viewport);
        assert!(!p.behind);
        assert!(p.y < viewport.height / 2.0, "y = {}", p.y);
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!(Viewport::parse_resolution("1280x720"), Some((1280.0, 720.0)));
        assert_eq!(Viewport::parse_resolution("0x720"), None);
        assert_eq!(Viewport::parse_resolution("garbage"), None);
        assert_eq!(Viewport::parse_resolution("1x2x3"), None);
    }

    #[test]
    fn test_target_info_sexp() {
        let scene = SolarSystem::new();
        let earth = scene.targets().iter().find(|b| b.name == "Earth").unwrap();
        let sexp = scene.target_info_sexp(earth.id).unwrap();
        assert!(sexp.contains(":name \"Earth\""));
        assert!(sexp.contains(":distance \"149.6 million km\""));
        assert!(sexp.contains(":diameter \"12,756 km\""));
        assert!(sexp.contains(":period \"365 days\""));

        assert!(scene.target_info_sexp(u64::MAX).is_none());
    }

    #[test]
    fn test_list_sexp_after_projection() {
        let mut scene = SolarSystem::new();
        scene.project_all(Vec3::new(0.0, 20.0, 60.0), &Viewport::default());
        let sexp = scene.list_sexp();
        assert!(sexp.starts_with('('));
        assert!(sexp.contains(":name \"Mercury\""));
        assert!(sexp.contains(":hitbox"));
    }

    #[test]
    fn test_unique_ids() {
        let scene = SolarSystem::new();
        let mut ids: Vec<u64> = scene.targets().iter().map(|b| b.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8, "target IDs must be unique");
    }
}
