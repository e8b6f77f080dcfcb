//! Lazy procedural terrain generation
//!
//! The world is an unbounded grid of 500-unit chunks generated on demand as
//! players approach. Each chunk derives its own rng seed from its
//! coordinates, so a chunk's geometry is identical no matter when or in what
//! order chunks get generated. A per-tick budget caps generation work so a
//! fast-moving player cannot stall the simulation step.

use std::collections::{HashMap, HashSet, VecDeque};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::state::{Building, Obstacle, Tree, TreeKind, World, WorldChunk};
use super::CHUNK_SIZE;

/// Chunk bookkeeping: which chunks exist, their geometry for replication,
/// and the queue of chunks waiting for the per-tick generation budget.
#[derive(Default)]
pub struct ChunkIndex {
    generated: HashSet<(i32, i32)>,
    chunks: HashMap<(i32, i32), WorldChunk>,
    pending: VecDeque<(i32, i32)>,
}

impl ChunkIndex {
    pub fn is_generated(&self, coord: (i32, i32)) -> bool {
        self.generated.contains(&coord)
    }

    pub fn get(&self, coord: (i32, i32)) -> Option<&WorldChunk> {
        self.chunks.get(&coord)
    }

    pub fn generated_count(&self) -> usize {
        self.generated.len()
    }
}

/// Chunk coordinate containing a world position.
pub fn chunk_coord(x: f64, y: f64) -> (i32, i32) {
    (
        (x / CHUNK_SIZE).floor() as i32,
        (y / CHUNK_SIZE).floor() as i32,
    )
}

/// Positional seed so chunk geometry is a pure function of its coordinates.
fn chunk_seed(cx: i32, cy: i32) -> u64 {
    (cx as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((cy as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F))
}

impl World {
    /// Generate one chunk's static geometry if it doesn't exist yet.
    pub fn generate_chunk(&mut self, cx: i32, cy: i32) {
        if !self.chunks.generated.insert((cx, cy)) {
            return;
        }

        let start_x = cx as f64 * CHUNK_SIZE;
        let start_y = cy as f64 * CHUNK_SIZE;
        let mut rng = ChaCha8Rng::seed_from_u64(chunk_seed(cx, cy));

        let mut chunk = WorldChunk {
            chunk_x: cx,
            chunk_y: cy,
            buildings: Vec::new(),
            trees: Vec::new(),
        };

        // Truncated remainder on purpose: negative chunk coordinates land in
        // the settlement band and skip forests, matching the terrain layout
        // clients already know.
        let density = (cx * 31 + cy * 17) % 100;
        let has_settlement = density < 40;
        let has_forest = density > 20 && density < 80;

        if has_settlement {
            self.place_settlement(&mut rng, start_x, start_y, &mut chunk);
        } else if rng.gen::<f64>() < 0.3 {
            let building = Building {
                x: start_x + rng.gen::<f64>() * CHUNK_SIZE * 0.7 + CHUNK_SIZE * 0.15,
                y: start_y + rng.gen::<f64>() * CHUNK_SIZE * 0.7 + CHUNK_SIZE * 0.15,
                width: 40.0 + rng.gen::<f64>() * 40.0,
                height: 40.0 + rng.gen::<f64>() * 40.0,
            };
            self.add_building(building, &mut chunk);
        }

        if has_forest {
            self.place_forest(&mut rng, start_x, start_y, &mut chunk);
        } else {
            self.place_scattered_trees(&mut rng, start_x, start_y, &mut chunk);
        }

        debug!(
            cx,
            cy,
            buildings = chunk.buildings.len(),
            trees = chunk.trees.len(),
            "chunk generated"
        );
        self.chunks.chunks.insert((cx, cy), chunk);
    }

    /// A small grid-aligned cluster of 2 to 5 buildings around a random
    /// anchor in the middle of the chunk, clamped to the chunk bounds.
    fn place_settlement(
        &mut self,
        rng: &mut ChaCha8Rng,
        start_x: f64,
        start_y: f64,
        chunk: &mut WorldChunk,
    ) {
        let settlement_x = start_x + CHUNK_SIZE * 0.3 + rng.gen::<f64>() * CHUNK_SIZE * 0.4;
        let settlement_y = start_y + CHUNK_SIZE * 0.3 + rng.gen::<f64>() * CHUNK_SIZE * 0.4;

        const GRID_SIZE: f64 = 45.0;
        let building_count = 2 + rng.gen_range(0..4);

        for i in 0..building_count {
            let grid_x = (i % 3) as f64 * GRID_SIZE;
            let grid_y = (i / 3) as f64 * GRID_SIZE;
            let offset_x = (rng.gen::<f64>() - 0.5) * 10.0;
            let offset_y = (rng.gen::<f64>() - 0.5) * 10.0;

            let mut x = settlement_x + grid_x + offset_x - GRID_SIZE;
            let mut y = settlement_y + grid_y + offset_y - GRID_SIZE;
            if x < start_x {
                x = start_x + 10.0;
            }
            if y < start_y {
                y = start_y + 10.0;
            }
            if x + 80.0 > start_x + CHUNK_SIZE {
                x = start_x + CHUNK_SIZE - 80.0;
            }
            if y + 80.0 > start_y + CHUNK_SIZE {
                y = start_y + CHUNK_SIZE - 80.0;
            }

            let building = Building {
                x,
                y,
                width: 45.0 + rng.gen::<f64>() * 35.0,
                height: 45.0 + rng.gen::<f64>() * 35.0,
            };
            self.add_building(building, chunk);
        }
    }

    /// A dense circular stand of 12 to 19 trees around a forest center.
    fn place_forest(
        &mut self,
        rng: &mut ChaCha8Rng,
        start_x: f64,
        start_y: f64,
        chunk: &mut WorldChunk,
    ) {
        let forest_x = start_x + CHUNK_SIZE * 0.2 + rng.gen::<f64>() * CHUNK_SIZE * 0.6;
        let forest_y = start_y + CHUNK_SIZE * 0.2 + rng.gen::<f64>() * CHUNK_SIZE * 0.6;
        let forest_radius = 90.0 + rng.gen::<f64>() * 60.0;
        let tree_count = 12 + rng.gen_range(0..8);

        for _ in 0..tree_count {
            let kind = random_tree_kind(rng);
            let size = 16.0 + rng.gen::<f64>() * 9.0;

            let mut placed = None;
            for _ in 0..50 {
                let angle = rng.gen::<f64>() * std::f64::consts::TAU;
                let dist = rng.gen::<f64>() * forest_radius;

                let mut x = forest_x + angle.cos() * dist;
                let mut y = forest_y + angle.sin() * dist;
                if x < start_x {
                    x = start_x + 10.0;
                }
                if y < start_y {
                    y = start_y + 10.0;
                }
                if x > start_x + CHUNK_SIZE {
                    x = start_x + CHUNK_SIZE - 10.0;
                }
                if y > start_y + CHUNK_SIZE {
                    y = start_y + CHUNK_SIZE - 10.0;
                }

                if self.is_valid_tree_position(x, y, size) {
                    placed = Some((x, y));
                    break;
                }
            }

            if let Some((x, y)) = placed {
                self.add_tree(Tree { x, y, size, kind }, chunk);
            }
        }
    }

    /// 3 to 7 lone trees spread uniformly over the chunk.
    fn place_scattered_trees(
        &mut self,
        rng: &mut ChaCha8Rng,
        start_x: f64,
        start_y: f64,
        chunk: &mut WorldChunk,
    ) {
        let tree_count = 3 + rng.gen_range(0..5);

        for _ in 0..tree_count {
            let kind = random_tree_kind(rng);
            let size = 15.0 + rng.gen::<f64>() * 10.0;

            let mut placed = None;
            for _ in 0..50 {
                let x = start_x + rng.gen::<f64>() * CHUNK_SIZE;
                let y = start_y + rng.gen::<f64>() * CHUNK_SIZE;
                if self.is_valid_tree_position(x, y, size) {
                    placed = Some((x, y));
                    break;
                }
            }

            if let Some((x, y)) = placed {
                self.add_tree(Tree { x, y, size, kind }, chunk);
            }
        }
    }

    fn add_building(&mut self, building: Building, chunk: &mut WorldChunk) {
        self.obstacles
            .insert(building.x, building.y, Obstacle::Building(building.clone()));
        chunk.buildings.push(building.clone());
        self.buildings.push(building);
    }

    fn add_tree(&mut self, tree: Tree, chunk: &mut WorldChunk) {
        self.obstacles
            .insert(tree.x, tree.y, Obstacle::Tree(tree.clone()));
        chunk.trees.push(tree.clone());
        self.trees.push(tree);
    }

    /// Trees cannot overlap a building's footprint or crowd another tree
    /// closer than the sum of their sizes plus a small gap.
    fn is_valid_tree_position(&self, x: f64, y: f64, size: f64) -> bool {
        for obstacle in self.obstacles.query(x, y, 200.0) {
            match obstacle {
                Obstacle::Building(b) => {
                    if x + size > b.x
                        && x - size < b.x + b.width
                        && y + size > b.y
                        && y - size < b.y + b.height
                    {
                        return false;
                    }
                }
                Obstacle::Tree(t) => {
                    let min_dist = t.size + size + 2.0;
                    if (x - t.x).hypot(y - t.y) < min_dist {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Queue the 5x5 chunk neighborhood of a position for generation.
    pub fn ensure_chunks_around(&mut self, x: f64, y: f64) {
        let (cx, cy) = chunk_coord(x, y);
        for dx in -2..=2 {
            for dy in -2..=2 {
                let coord = (cx + dx, cy + dy);
                if !self.chunks.generated.contains(&coord)
                    && !self.chunks.pending.contains(&coord)
                {
                    self.chunks.pending.push_back(coord);
                }
            }
        }
    }

    /// Generate up to `budget` queued chunks.
    pub fn process_pending_chunks(&mut self, budget: usize) {
        for _ in 0..budget {
            match self.chunks.pending.pop_front() {
                Some((cx, cy)) => self.generate_chunk(cx, cy),
                None => break,
            }
        }
    }
}

fn random_tree_kind(rng: &mut ChaCha8Rng) -> TreeKind {
    if rng.gen::<f64>() < 0.6 {
        TreeKind::Normal
    } else {
        TreeKind::Bush
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_coords_floor_toward_negative_infinity() {
        assert_eq!(chunk_coord(0.0, 0.0), (0, 0));
        assert_eq!(chunk_coord(499.9, 499.9), (0, 0));
        assert_eq!(chunk_coord(500.0, -0.1), (1, -1));
        assert_eq!(chunk_coord(-500.0, -500.1), (-1, -2));
    }

    #[test]
    fn chunk_geometry_is_deterministic_across_worlds() {
        let mut a = World::new(1);
        let mut b = World::new(2);
        a.generate_chunk(7, -3);
        b.generate_chunk(7, -3);

        let ca = a.chunks.get((7, -3)).unwrap();
        let cb = b.chunks.get((7, -3)).unwrap();
        assert_eq!(ca.buildings.len(), cb.buildings.len());
        assert_eq!(ca.trees.len(), cb.trees.len());
        for (ta, tb) in ca.trees.iter().zip(cb.trees.iter()) {
            assert_eq!((ta.x, ta.y, ta.size), (tb.x, tb.y, tb.size));
        }
    }

    #[test]
    fn generating_a_chunk_twice_is_a_no_op() {
        let mut world = World::new(1);
        world.generate_chunk(9, 9);
        assert!(world.chunks.is_generated((9, 9)));
        let buildings = world.buildings.len();
        let trees = world.trees.len();
        world.generate_chunk(9, 9);
        assert_eq!(world.buildings.len(), buildings);
        assert_eq!(world.trees.len(), trees);
    }

    #[test]
    fn geometry_stays_inside_the_chunk() {
        let mut world = World::new(1);
        // chunk (1, 0) has density 31: settlement and forest
        world.generate_chunk(1, 0);
        let chunk = world.chunks.get((1, 0)).unwrap();
        for b in &chunk.buildings {
            assert!(b.x >= 500.0 && b.x + b.width <= 1000.0 + 80.0);
        }
        for t in &chunk.trees {
            assert!(t.x >= 500.0 - 10.0 && t.x <= 1000.0);
            assert!(t.y >= -10.0 && t.y <= 500.0);
        }
    }

    #[test]
    fn ensure_chunks_queues_the_5x5_neighborhood_once() {
        let mut world = World::new(1);
        let before = world.chunks.generated_count();
        world.ensure_chunks_around(5_000.0, 5_000.0);
        assert_eq!(world.chunks.pending.len(), 25);
        // duplicate request adds nothing
        world.ensure_chunks_around(5_000.0, 5_000.0);
        assert_eq!(world.chunks.pending.len(), 25);

        world.process_pending_chunks(3);
        assert_eq!(world.chunks.pending.len(), 22);
        assert_eq!(world.chunks.generated_count(), before + 3);

        world.process_pending_chunks(100);
        assert!(world.chunks.pending.is_empty());
        assert_eq!(world.chunks.generated_count(), before + 25);
    }
}
