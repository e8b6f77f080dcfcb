//! Movement collision, placement search, and zone damage
//!
//! Movement resolves per axis (X first, then Y) against the spatial index:
//! an axis whose proposed coordinate would overlap a nearby building or tree
//! keeps its old value, producing wall-sliding instead of a full stop.

use rand::Rng;
use tracing::warn;

use crate::util::math::round_coord;

use super::grid::SpatialGrid;
use super::state::{Obstacle, World};
use super::PLAYER_RADIUS;

/// Query radius wide enough to cover the largest obstacle footprint
const OBSTACLE_QUERY_RADIUS: f64 = 100.0;

/// Would a circle of the given radius overlap any nearby obstacle?
/// Building bounds are inclusive and radius-expanded; trees block when the
/// center distance falls below tree size + radius.
pub fn circle_blocked(grid: &SpatialGrid<Obstacle>, x: f64, y: f64, radius: f64) -> bool {
    for obstacle in grid.query(x, y, OBSTACLE_QUERY_RADIUS) {
        match obstacle {
            Obstacle::Building(b) => {
                if x + radius >= b.x
                    && x - radius <= b.x + b.width
                    && y + radius >= b.y
                    && y - radius <= b.y + b.height
                {
                    return true;
                }
            }
            Obstacle::Tree(t) => {
                if (x - t.x).hypot(y - t.y) < t.size + radius {
                    return true;
                }
            }
        }
    }
    false
}

/// Point-in-obstacle test used for projectiles: building rectangles contain
/// their boundary; trees block strictly inside their radius.
pub fn point_blocked(grid: &SpatialGrid<Obstacle>, x: f64, y: f64) -> bool {
    for obstacle in grid.query(x, y, OBSTACLE_QUERY_RADIUS) {
        match obstacle {
            Obstacle::Building(b) => {
                if x >= b.x && x <= b.x + b.width && y >= b.y && y <= b.y + b.height {
                    return true;
                }
            }
            Obstacle::Tree(t) => {
                if (x - t.x).hypot(y - t.y) < t.size {
                    return true;
                }
            }
        }
    }
    false
}

/// Apply a proposed move per axis with wall-sliding. Returns the position
/// actually reached (rounded), leaving a blocked axis's coordinate unchanged.
pub fn slide_move(
    grid: &SpatialGrid<Obstacle>,
    x: f64,
    y: f64,
    new_x: f64,
    new_y: f64,
) -> (f64, f64) {
    let mut out_x = x;
    if !circle_blocked(grid, new_x, y, PLAYER_RADIUS) {
        out_x = round_coord(new_x);
    }

    let mut out_y = y;
    if !circle_blocked(grid, out_x, new_y, PLAYER_RADIUS) {
        out_y = round_coord(new_y);
    }

    (out_x, out_y)
}

/// Fractional zone damage per tick as a function of the current radius.
/// Steps up piecewise as the zone tightens.
pub fn zone_damage_per_tick(zone_radius: f64) -> f64 {
    if zone_radius >= 3000.0 {
        0.1
    } else if zone_radius >= 2000.0 {
        0.1 + (3000.0 - zone_radius) / 1000.0 * 0.1
    } else if zone_radius >= 1000.0 {
        0.2 + (2000.0 - zone_radius) / 1000.0 * 0.1
    } else if zone_radius >= 500.0 {
        0.3 + (1000.0 - zone_radius) / 500.0 * 0.2
    } else {
        0.5
    }
}

impl World {
    /// Rejection-sample a position clear of obstacles (and inside the zone
    /// when constrained). The first attempt uses the requested point
    /// verbatim. Bounded attempts; on exhaustion falls back to the requested
    /// point and reports failure so the caller can log it.
    pub fn find_valid_position(
        &mut self,
        start_x: f64,
        start_y: f64,
        radius: f64,
        max_attempts: usize,
        zone_constrained: bool,
    ) -> (f64, f64, bool) {
        for attempt in 0..max_attempts {
            let (x, y) = if zone_constrained && attempt > 0 {
                let angle = self.rng.gen::<f64>() * std::f64::consts::TAU;
                let dist = self.rng.gen::<f64>() * (self.zone_radius - 50.0);
                (
                    self.zone_center + angle.cos() * dist,
                    self.zone_center + angle.sin() * dist,
                )
            } else {
                (start_x, start_y)
            };

            if zone_constrained {
                let from_center = (x - self.zone_center).hypot(y - self.zone_center);
                if from_center > self.zone_radius - 20.0 {
                    continue;
                }
            }

            if !circle_blocked(&self.obstacles, x, y, radius) {
                return (x, y, true);
            }
        }

        (start_x, start_y, false)
    }

    /// Randomized pickup placement. Inside the zone the distance is biased
    /// away from the center (sqrt sampling with a 20% inner margin);
    /// otherwise uniform over the world extent. Falls back to the last
    /// sampled candidate after 300 attempts.
    pub fn find_valid_pickup_position(&mut self, radius: f64, within_zone: bool) -> (f64, f64) {
        const MAX_ATTEMPTS: usize = 300;

        for _ in 0..MAX_ATTEMPTS {
            let (x, y) = self.sample_pickup_position(radius, within_zone);
            if self.is_valid_pickup_position(x, y, radius, within_zone) {
                return (x, y);
            }
        }

        warn!(
            within_zone,
            "pickup placement failed after {} attempts, using fallback", MAX_ATTEMPTS
        );
        self.sample_pickup_position(radius, within_zone)
    }

    fn sample_pickup_position(&mut self, radius: f64, within_zone: bool) -> (f64, f64) {
        if within_zone {
            let angle = self.rng.gen::<f64>() * std::f64::consts::TAU;
            let max_dist = self.zone_radius - radius - 20.0;
            let min_dist = max_dist * 0.2;
            let dist = min_dist + self.rng.gen::<f64>().sqrt() * (max_dist - min_dist);
            (
                self.zone_center + angle.cos() * dist,
                self.zone_center + angle.sin() * dist,
            )
        } else {
            (
                self.rng.gen::<f64>() * 10_000.0 - 5_000.0,
                self.rng.gen::<f64>() * 10_000.0 - 5_000.0,
            )
        }
    }

    fn is_valid_pickup_position(&self, x: f64, y: f64, radius: f64, within_zone: bool) -> bool {
        if within_zone {
            let from_center = (x - self.zone_center).hypot(y - self.zone_center);
            if from_center > self.zone_radius - radius {
                return false;
            }
        }
        !circle_blocked(&self.obstacles, x, y, radius)
    }
}
