//! Voxel raycasting with integer DDA.

use crate::coords::{WorldPos, COL_H};
use glam::DVec3;
use slopworld_core::Face;

/// Zero direction components get this in place of 1/dir so their axis never
/// wins the step race.
const T_SENTINEL: f64 = 1e30;

/// Result of a raycast against the voxel world.
#[derive(Debug, Clone, Copy)]
pub struct RaycastHit {
    /// The solid block that was hit.
    pub block: WorldPos,
    /// Which face of the block the ray entered through.
    pub face: Face,
    /// Distance from the origin to the entry point.
    pub distance: f64,
    /// World-space entry point, computed once on hit.
    pub point: DVec3,
}

/// Cast a ray through the voxel grid.
///
/// `is_solid` answers whether the block at a position stops the ray. The
/// traversal visits every cell the ray passes through, never more than
/// `3 · max_distance` of them, and bails once `max_distance` is exceeded or
/// the ray leaves the world height range for good.
pub fn raycast<F>(
    origin: DVec3,
    direction: DVec3,
    max_distance: f64,
    mut is_solid: F,
) -> Option<RaycastHit>
where
    F: FnMut(WorldPos) -> bool,
{
    if max_distance <= 0.0 || direction.length_squared() == 0.0 {
        return None;
    }

    let mut voxel = WorldPos::new(
        origin.x.floor() as i64,
        origin.y.floor() as i64,
        origin.z.floor() as i64,
    );

    let step = [
        if direction.x > 0.0 { 1i64 } else { -1 },
        if direction.y > 0.0 { 1i64 } else { -1 },
        if direction.z > 0.0 { 1i64 } else { -1 },
    ];

    let t_delta = [
        if direction.x != 0.0 {
            (1.0 / direction.x).abs()
        } else {
            T_SENTINEL
        },
        if direction.y != 0.0 {
            (1.0 / direction.y).abs()
        } else {
            T_SENTINEL
        },
        if direction.z != 0.0 {
            (1.0 / direction.z).abs()
        } else {
            T_SENTINEL
        },
    ];

    // Distance along the ray to the first boundary crossing per axis.
    let mut t_max = [
        axis_t_max(origin.x, direction.x, voxel.x),
        axis_t_max(origin.y, direction.y, voxel.y),
        axis_t_max(origin.z, direction.z, voxel.z),
    ];

    // Entering faces per stepped axis: stepping +X enters through West, etc.
    const ENTRY_FACES: [[Face; 2]; 3] = [
        [Face::East, Face::West],
        [Face::Up, Face::Down],
        [Face::South, Face::North],
    ];

    // The origin cell has no entry face; treat a solid start as an immediate
    // hit against the dominant axis.
    if is_solid(voxel) {
        let axis = dominant_axis(direction);
        let face = ENTRY_FACES[axis][if direction[axis] > 0.0 { 1 } else { 0 }];
        return Some(RaycastHit {
            block: voxel,
            face,
            distance: 0.0,
            point: origin,
        });
    }

    let max_steps = (max_distance * 3.0).ceil() as usize + 3;
    for _ in 0..max_steps {
        // Advance along whichever axis crosses its boundary first.
        let axis = if t_max[0] < t_max[1] && t_max[0] < t_max[2] {
            0
        } else if t_max[1] < t_max[2] {
            1
        } else {
            2
        };

        let distance = t_max[axis];
        if distance > max_distance {
            return None;
        }

        match axis {
            0 => voxel.x += step[0],
            1 => voxel.y += step[1],
            _ => voxel.z += step[2],
        }
        t_max[axis] += t_delta[axis];

        // Out of the world height range and moving away: nothing left to hit.
        if (voxel.y < 0 && direction.y <= 0.0) || (voxel.y >= COL_H as i64 && direction.y >= 0.0) {
            return None;
        }

        if is_solid(voxel) {
            let face = ENTRY_FACES[axis][if step[axis] > 0 { 1 } else { 0 }];
            return Some(RaycastHit {
                block: voxel,
                face,
                distance,
                point: origin + direction * distance,
            });
        }
    }

    None
}

fn axis_t_max(origin: f64, direction: f64, voxel: i64) -> f64 {
    if direction > 0.0 {
        ((voxel + 1) as f64 - origin) / direction
    } else if direction < 0.0 {
        (voxel as f64 - origin) / direction
    } else {
        T_SENTINEL
    }
}

fn dominant_axis(direction: DVec3) -> usize {
    let abs = direction.abs();
    if abs.x >= abs.y && abs.x >= abs.z {
        0
    } else if abs.y >= abs.z {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_aligned_hit_reports_west_face() {
        // The literal interaction case: stone at (5, 40, 0), ray along +X.
        let origin = DVec3::new(0.5, 40.5, 0.5);
        let direction = DVec3::new(1.0, 0.0, 0.0);
        let hit = raycast(origin, direction, 10.0, |pos| {
            pos == WorldPos::new(5, 40, 0)
        })
        .expect("should hit");
        assert_eq!(hit.block, WorldPos::new(5, 40, 0));
        assert_eq!(hit.face, Face::West);
        assert!((hit.distance - 4.5).abs() < 1e-9);
        assert!((hit.point.x - 5.0).abs() < 1e-9);
    }

    #[test]
    fn miss_returns_none() {
        let hit = raycast(
            DVec3::new(0.5, 40.5, 0.5),
            DVec3::new(1.0, 0.0, 0.0),
            10.0,
            |_| false,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn beyond_max_distance_is_a_miss() {
        let hit = raycast(
            DVec3::new(0.5, 40.5, 0.5),
            DVec3::new(1.0, 0.0, 0.0),
            3.0,
            |pos| pos.x == 5,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn negative_direction_reports_east_face() {
        let origin = DVec3::new(10.5, 40.5, 0.5);
        let hit = raycast(origin, DVec3::new(-1.0, 0.0, 0.0), 10.0, |pos| {
            pos == WorldPos::new(5, 40, 0)
        })
        .expect("should hit");
        assert_eq!(hit.face, Face::East);
        assert!((hit.distance - 4.5).abs() < 1e-9);
    }

    #[test]
    fn downward_ray_reports_up_face() {
        let origin = DVec3::new(0.5, 50.5, 0.5);
        let hit = raycast(origin, DVec3::new(0.0, -1.0, 0.0), 60.0, |pos| {
            pos.y == 10
        })
        .expect("should hit");
        assert_eq!(hit.face, Face::Up);
        assert_eq!(hit.block.y, 10);
    }

    #[test]
    fn diagonal_ray_visits_enough_cells() {
        // Diagonal through empty space terminates within the step bound.
        let hit = raycast(
            DVec3::new(0.5, 500.5, 0.5),
            DVec3::new(1.0, 0.3, 1.0).normalize(),
            64.0,
            |_| false,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn solid_origin_hits_immediately() {
        let hit = raycast(
            DVec3::new(0.5, 40.5, 0.5),
            DVec3::new(0.0, 0.0, 1.0),
            10.0,
            |_| true,
        )
        .expect("should hit");
        assert_eq!(hit.distance, 0.0);
        assert_eq!(hit.block, WorldPos::new(0, 40, 0));
    }

    #[test]
    fn ray_leaving_world_top_bails() {
        let hit = raycast(
            DVec3::new(0.5, (COL_H - 1) as f64 + 0.5, 0.5),
            DVec3::new(0.0, 1.0, 0.0),
            1000.0,
            |pos| pos.y < 0, // never true
        );
        assert!(hit.is_none());
    }

    #[test]
    fn zero_direction_is_rejected() {
        assert!(raycast(DVec3::ZERO, DVec3::ZERO, 10.0, |_| true).is_none());
        assert!(raycast(DVec3::ZERO, DVec3::X, 0.0, |_| true).is_none());
    }
}
