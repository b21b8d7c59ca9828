//! Ray-based target picking for the pointing gesture.
//!
//! One pass over the targets in insertion order tests each body's
//! oversized hit-volume (visible volume as fallback); the first
//! intersection in ray order wins.  A nearest-to-ray heuristic, gated by
//! `MAX_SELECTION_SLACK`, makes pointing forgiving of aim error.

use tracing::debug;

use crate::scene::{view_basis, Body, Vec3, Viewport};

/// Tolerance added to a target's hit-volume radius when accepting the
/// nearest-to-ray fallback (world units).
pub const MAX_SELECTION_SLACK: f32 = 20.0;

// ── Ray ─────────────────────────────────────────────────────

/// A ray with unit direction.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalized(),
        }
    }
}

/// Build a world ray from the camera through a normalized [0,1]² screen
/// position (camera looks at the origin).
pub fn camera_ray(eye: Vec3, nx: f32, ny: f32, viewport: &Viewport) -> Ray {
    let (right, up, forward) = view_basis(eye);
    let tan_half = (viewport.fov_y_deg.to_radians() * 0.5).tan();
    let ndc_x = nx * 2.0 - 1.0;
    let ndc_y = 1.0 - ny * 2.0;
    let direction = forward
        .add(right.scale(ndc_x * tan_half * viewport.aspect()))
        .add(up.scale(ndc_y * tan_half));
    Ray::new(eye, direction)
}

/// Nearest positive intersection parameter of a ray with a sphere.
fn ray_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin.sub(center);
    let b = oc.dot(ray.direction);
    let c = oc.dot(oc) - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let t = -b - sqrt_disc;
    if t >= 0.0 {
        return Some(t);
    }
    let t = -b + sqrt_disc;
    if t >= 0.0 {
        Some(t)
    } else {
        None
    }
}

/// Perpendicular distance from a ray to a point (points behind the ray
/// origin measure to the origin itself).
fn ray_point_distance(ray: &Ray, point: Vec3) -> f32 {
    let v = point.sub(ray.origin);
    let t = v.dot(ray.direction).max(0.0);
    let closest = ray.origin.add(ray.direction.scale(t));
    point.sub(closest).length()
}

// ── Picking ─────────────────────────────────────────────────

/// Resolve a pointing ray to a target ID.
///
/// Exact hits (hit-volume first, visible volume as fallback, smallest t
/// wins) take priority; otherwise the nearest target within
/// `hitbox + MAX_SELECTION_SLACK` of the ray is accepted.
pub fn pick_target(ray: &Ray, bodies: &[Body]) -> Option<u64> {
    let mut best: Option<(f32, u64)> = None;
    for body in bodies {
        let hit = ray_sphere(ray, body.position, body.hitbox_radius)
            .or_else(|| ray_sphere(ray, body.position, body.body_radius));
        if let Some(t) = hit {
            if best.map_or(true, |(bt, _)| t < bt) {
                best = Some((t, body.id));
            }
        }
    }
    if let Some((t, id)) = best {
        debug!("pick: exact hit target {} at t={:.1}", id, t);
        return Some(id);
    }

    let mut nearest: Option<(f32, u64, f32)> = None;
    for body in bodies {
        let d = ray_point_distance(ray, body.position);
        if nearest.map_or(true, |(nd, _, _)| d < nd) {
            nearest = Some((d, body.id, body.hitbox_radius));
        }
    }
    match nearest {
        Some((d, id, hitbox)) if d < hitbox + MAX_SELECTION_SLACK => {
            debug!("pick: nearest-ray fallback target {} at d={:.1}", id, d);
            Some(id)
        }
        _ => None,
    }
}

// ── Selection state ─────────────────────────────────────────

/// Tracks the currently pointed-at target and reports changes exactly
/// once (no repeat events while pointing continues at the same target).
#[derive(Debug, Default)]
pub struct SelectionState {
    pub selected: Option<u64>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pick result.  Returns the newly selected ID only when it
    /// differs from the current selection; a miss leaves the selection
    /// untouched.
    pub fn observe(&mut self, picked: Option<u64>) -> Option<u64> {
        match picked {
            Some(id) if self.selected != Some(id) => {
                self.selected = Some(id);
                Some(id)
            }
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.selected = None;
    }
}

// ── Test helpers ────────────────────────────────────────────

#[cfg(test)]
fn test_body(id: u64, name: &'static str, position: Vec3, hitbox: f32) -> Body {
    use crate::scene::BodyInfo;
    Body {
        id,
        name,
        orbit_radius: position.length(),
        body_radius: hitbox / 2.5,
        hitbox_radius: hitbox,
        period_days: 365.0,
        angle: 0.0,
        position,
        screen: None,
        info: BodyInfo {
            distance: "",
            diameter: "",
            period: "",
        },
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_sphere_hit_and_miss() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let t = ray_sphere(&ray, Vec3::ZERO, 1.0);
        assert!(t.is_some());
        assert!((t.unwrap() - 9.0).abs() < 1e-4, "t = {:?}", t);

        assert!(ray_sphere(&ray, Vec3::new(50.0, 0.0, 0.0), 1.0).is_none());
        // Sphere behind the ray origin.
        assert!(ray_sphere(&ray, Vec3::new(0.0, 0.0, 30.0), 1.0).is_none());
    }

    #[test]
    fn test_ray_point_distance() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        let d = ray_point_distance(&ray, Vec3::new(3.0, 0.0, -10.0));
        assert!((d - 3.0).abs() < 1e-4, "d = {}", d);
    }

    #[test]
    fn test_exact_hit_beats_nearest_heuristic() {
        // Ray passes exactly through A's hit-volume; B sits farther along
        // but close to the ray.  A must always win.
        let ray = Ray::new(Vec3::new(0.0, 0.0, 50.0), Vec3::new(0.0, 0.0, -1.0));
        let a = test_body(1, "A", Vec3::new(0.0, 0.0, 20.0), 2.0);
        let b = test_body(2, "B", Vec3::new(3.0, 0.0, -20.0), 2.0);
        assert_eq!(pick_target(&ray, &[a, b]), Some(1));
    }

    #[test]
    fn test_first_intersection_in_ray_order_wins() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 50.0), Vec3::new(0.0, 0.0, -1.0));
        // Both on the ray; the nearer one wins regardless of list order.
        let near = test_body(1, "near", Vec3::new(0.0, 0.0, 30.0), 2.0);
        let far = test_body(2, "far", Vec3::new(0.0, 0.0, 0.0), 2.0);
        assert_eq!(pick_target(&ray, &[far.clone(), near.clone()]), Some(1));
        assert_eq!(pick_target(&ray, &[near, far]), Some(1));
    }

    #[test]
    fn test_nearest_fallback_within_slack() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 50.0), Vec3::new(0.0, 0.0, -1.0));
        // 10 units off the ray: no exact hit, but within 2 + 20 slack.
        let a = test_body(1, "A", Vec3::new(10.0, 0.0, 0.0), 2.0);
        assert_eq!(pick_target(&ray, &[a]), Some(1));
    }

    #[test]
    fn test_nearest_fallback_beyond_slack() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 50.0), Vec3::new(0.0, 0.0, -1.0));
        // 30 units off the ray: beyond 2 + 20 slack -> no selection.
        let a = test_body(1, "A", Vec3::new(30.0, 0.0, 0.0), 2.0);
        assert_eq!(pick_target(&ray, &[a]), None);
    }

    #[test]
    fn test_empty_candidates_no_selection() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 50.0), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(pick_target(&ray, &[]), None);
    }

    #[test]
    fn test_camera_ray_center_aims_at_origin() {
        let eye = Vec3::new(0.0, 20.0, 40.0);
        let ray = camera_ray(eye, 0.5, 0.5, &Viewport::default());
        // The center of the screen looks straight at the origin.
        let expected = Vec3::ZERO.sub(eye).normalized();
        assert!(ray.direction.sub(expected).length() < 1e-4);
    }

    #[test]
    fn test_selection_fires_once_per_change() {
        let mut sel = SelectionState::new();
        assert_eq!(sel.observe(Some(3)), Some(3));
        assert_eq!(sel.observe(Some(3)), None, "repeat pick must not re-fire");
        assert_eq!(sel.observe(None), None, "miss leaves selection untouched");
        assert_eq!(sel.selected, Some(3));
        assert_eq!(sel.observe(Some(5)), Some(5));
    }
}
