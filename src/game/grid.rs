//! Uniform spatial grid for obstacle collision queries
//!
//! Maps a 2-D position to the entries near it so collision tests touch
//! O(nearby) entries instead of every obstacle in the world. Entries are
//! immutable once inserted; queries return a conservative superset and the
//! caller re-checks true containment/distance.

use dashmap::DashMap;

pub struct SpatialGrid<T: Clone> {
    cell_size: f64,
    cells: DashMap<(i32, i32), Vec<T>>,
}

impl<T: Clone> SpatialGrid<T> {
    /// Cell size is fixed for the lifetime of the grid.
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: DashMap::new(),
        }
    }

    fn cell_of(&self, x: f64, y: f64) -> (i32, i32) {
        (
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
        )
    }

    /// Add a permanent entry at the given anchor position.
    pub fn insert(&self, x: f64, y: f64, value: T) {
        self.cells.entry(self.cell_of(x, y)).or_default().push(value);
    }

    /// All entries whose cell is within `ceil(radius / cell_size)` cells of
    /// the query cell. Superset of the true neighborhood.
    pub fn query(&self, x: f64, y: f64, radius: f64) -> Vec<T> {
        let (cell_x, cell_y) = self.cell_of(x, y);
        let cell_radius = (radius / self.cell_size).ceil() as i32;

        let mut results = Vec::new();
        for dx in -cell_radius..=cell_radius {
            for dy in -cell_radius..=cell_radius {
                if let Some(entries) = self.cells.get(&(cell_x + dx, cell_y + dy)) {
                    results.extend(entries.iter().cloned());
                }
            }
        }
        results
    }

    /// Drop every entry (full world reset).
    pub fn clear(&self) {
        self.cells.clear();
    }

    pub fn len(&self) -> usize {
        self.cells.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_returns_entries_in_neighboring_cells() {
        let grid = SpatialGrid::new(100.0);
        grid.insert(10.0, 10.0, "near");
        grid.insert(150.0, 10.0, "next_cell");
        grid.insert(950.0, 10.0, "far");

        let hits = grid.query(0.0, 0.0, 100.0);
        assert!(hits.contains(&"near"));
        assert!(hits.contains(&"next_cell"));
        assert!(!hits.contains(&"far"));
    }

    #[test]
    fn query_is_a_superset_of_the_true_neighborhood() {
        // Entry is 140 units away but in an adjacent cell, so a 100-unit
        // query still returns it; the caller is expected to re-check.
        let grid = SpatialGrid::new(100.0);
        grid.insert(199.0, 0.0, 1u32);
        let hits = grid.query(60.0, 0.0, 100.0);
        assert_eq!(hits, vec![1]);
    }

    #[test]
    fn negative_coordinates_map_to_their_own_cells() {
        let grid = SpatialGrid::new(100.0);
        grid.insert(-50.0, -50.0, "neg");
        assert_eq!(grid.query(-20.0, -20.0, 10.0).len(), 1);
        assert!(grid.query(250.0, 250.0, 10.0).is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let grid = SpatialGrid::new(100.0);
        grid.insert(0.0, 0.0, 1u32);
        assert_eq!(grid.len(), 1);
        grid.clear();
        assert!(grid.is_empty());
    }
}
