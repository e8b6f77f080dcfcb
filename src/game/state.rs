//! World state: entities, obstacles, and the owned aggregate
//!
//! Entity structs double as wire types; the replication layer serializes
//! them directly into state diffs, so field names follow the client protocol
//! (camelCase).

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::bots::BotState;
use super::grid::SpatialGrid;
use super::weapons::WeaponKind;
use super::worldgen::ChunkIndex;
use super::{
    BOT_SPEED, HUMAN_SPEED, MAX_HEALTH, SPATIAL_GRID_CELL_SIZE, STARTING_AMMO,
    ZONE_INITIAL_RADIUS,
};

/// Match lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lobby,
    Playing,
    Finished,
}

/// A combatant, human or bot. Mutated only by the simulation step and the
/// explicitly synchronized message handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub health: i32,
    pub alive: bool,
    pub velocity: f64,
    pub ammo: i32,
    pub weapon: WeaponKind,
    pub score: i32,
    pub kills: u32,
    /// Last trigger pull in unix millis; server-internal, never replicated
    #[serde(skip)]
    pub last_shot: u64,
}

/// Bot identities carry a fixed prefix; the client renders them differently
/// and the zone centroid ignores them.
pub const BOT_ID_PREFIX: &str = "enemy_";

impl Player {
    pub fn new_human(id: String, x: f64, y: f64) -> Self {
        Self {
            id,
            x,
            y,
            angle: 0.0,
            health: MAX_HEALTH,
            alive: true,
            velocity: HUMAN_SPEED,
            ammo: STARTING_AMMO,
            weapon: WeaponKind::Pistol,
            score: 0,
            kills: 0,
            last_shot: 0,
        }
    }

    pub fn new_bot(id: String) -> Self {
        Self {
            velocity: BOT_SPEED,
            ..Self::new_human(id, 0.0, 0.0)
        }
    }

    pub fn is_bot(&self) -> bool {
        self.id.starts_with(BOT_ID_PREFIX)
    }
}

/// An in-flight projectile. Deactivated on impact or leaving the world
/// extent, purged unconditionally at the end of the tick it deactivates in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projectile {
    pub id: String,
    /// Owner; never damaged by its own projectiles
    pub player_id: String,
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub speed: f64,
    pub active: bool,
    pub weapon: WeaponKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmmoPickup {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub amount: i32,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponPickup {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub weapon: WeaponKind,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthPickup {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub amount: i32,
    pub active: bool,
}

/// Axis-aligned building footprint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Building {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeKind {
    Normal,
    Bush,
}

/// Circular tree obstacle with a decorative kind tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tree {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    #[serde(rename = "type")]
    pub kind: TreeKind,
}

/// Static geometry entry in the spatial index. Callers pattern-match on the
/// shape during containment tests.
#[derive(Debug, Clone)]
pub enum Obstacle {
    Building(Building),
    Tree(Tree),
}

/// One generated square of static geometry, delivered lazily to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldChunk {
    pub chunk_x: i32,
    pub chunk_y: i32,
    pub buildings: Vec<Building>,
    pub trees: Vec<Tree>,
}

/// The single source of truth for dynamic and static world state. Guarded by
/// one read/write lock in `GameServer`; every mutation path funnels through
/// the simulation step or a synchronized message handler.
pub struct World {
    pub players: HashMap<String, Player>,
    pub projectiles: HashMap<String, Projectile>,
    pub ammo_pickups: HashMap<String, AmmoPickup>,
    pub weapon_pickups: HashMap<String, WeaponPickup>,
    pub health_pickups: HashMap<String, HealthPickup>,

    /// Permanent geometry lists; immutable once generated
    pub buildings: Vec<Building>,
    pub trees: Vec<Tree>,
    pub obstacles: SpatialGrid<Obstacle>,
    pub chunks: ChunkIndex,

    /// Zone center, one scalar applied to both axes (original wire format)
    pub zone_center: f64,
    pub zone_radius: f64,
    pub game_time: u64,
    pub phase: Phase,
    pub winner: Option<String>,

    pub bot_states: HashMap<String, BotState>,
    pub rng: ChaCha8Rng,

    next_projectile_id: u64,
    next_pickup_id: u64,
}

impl World {
    /// Empty world with generated spawn-area chunks but no pickups or bots;
    /// see `World::with_population` for a playable one.
    pub fn new(seed: u64) -> Self {
        let mut world = Self {
            players: HashMap::new(),
            projectiles: HashMap::new(),
            ammo_pickups: HashMap::new(),
            weapon_pickups: HashMap::new(),
            health_pickups: HashMap::new(),
            buildings: Vec::new(),
            trees: Vec::new(),
            obstacles: SpatialGrid::new(SPATIAL_GRID_CELL_SIZE),
            chunks: ChunkIndex::default(),
            zone_center: 0.0,
            zone_radius: ZONE_INITIAL_RADIUS,
            game_time: 0,
            phase: Phase::Lobby,
            winner: None,
            bot_states: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_projectile_id: 1,
            next_pickup_id: 1,
        };

        for (cx, cy) in [(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)] {
            world.generate_chunk(cx, cy);
        }

        world
    }

    /// Playable world: spawn-area chunks, initial pickup population, and the
    /// full bot roster.
    pub fn with_population(seed: u64) -> Self {
        let mut world = Self::new(seed);
        world.seed_pickups();
        world.spawn_bots();
        world
    }

    pub fn next_projectile_id(&mut self) -> String {
        let id = self.next_projectile_id;
        self.next_projectile_id += 1;
        format!("bullet_{}", id)
    }

    pub fn next_pickup_id(&mut self, prefix: &str) -> String {
        let id = self.next_pickup_id;
        self.next_pickup_id += 1;
        format!("{}_{}", prefix, id)
    }

    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    pub fn bot_count(&self) -> usize {
        self.players.values().filter(|p| p.is_bot()).count()
    }
}
