//! Game simulation modules

pub mod bots;
pub mod grid;
pub mod input;
pub mod physics;
pub mod server;
pub mod snapshot;
pub mod state;
pub mod weapons;
pub mod worldgen;

pub use server::GameServer;
pub use state::World;

// World geometry
pub const CHUNK_SIZE: f64 = 500.0;
pub const SPATIAL_GRID_CELL_SIZE: f64 = 500.0;
/// Projectiles past this coordinate magnitude are culled
pub const WORLD_EXTENT: f64 = 10_000.0;

// Zone (shrinking play boundary)
pub const ZONE_INITIAL_RADIUS: f64 = 3200.0;
pub const ZONE_SHRINK_STEP: f64 = 5.0;
pub const ZONE_SHRINK_INTERVAL: u64 = 100;
pub const ZONE_FLOOR_RADIUS: f64 = 200.0;

// Replication
pub const COORD_EPSILON: f64 = 0.01;
pub const ANGLE_EPSILON: f64 = 0.0001;
pub const AOI_RADIUS: f64 = 2000.0;
pub const AOI_RADIUS_SQ: f64 = AOI_RADIUS * AOI_RADIUS;
pub const PLAYER_UPDATE_DISTANCE: f64 = 3000.0;
pub const PLAYER_UPDATE_DISTANCE_SQ: f64 = PLAYER_UPDATE_DISTANCE * PLAYER_UPDATE_DISTANCE;

// Movement and combat
pub const PLAYER_RADIUS: f64 = 8.0;
pub const BULLET_HIT_RADIUS: f64 = 15.0;
pub const BULLET_DAMAGE: i32 = 25;
pub const KILL_SCORE: i32 = 100;
pub const MAX_HEALTH: i32 = 1000;
pub const HUMAN_SPEED: f64 = 100.0;
pub const BOT_SPEED: f64 = 16.67;
pub const STARTING_AMMO: i32 = 100;
pub const CLIENT_POS_TOLERANCE: f64 = 15.0;
/// Queued inputs whose head is older than this many ticks are discarded
pub const INPUT_STALE_TICKS: u64 = 10;

// Pickups
pub const PICKUP_RADIUS: f64 = 20.0;
pub const AMMO_PICKUP_AMOUNT: i32 = 75;
pub const HEALTH_PICKUP_AMOUNT: i32 = 75;
pub const AMMO_PICKUP_SCORE: i32 = 10;
pub const WEAPON_PICKUP_SCORE: i32 = 5;
pub const HEALTH_PICKUP_SCORE: i32 = 10;
pub const AMMO_PICKUP_INITIAL: usize = 120;
pub const WEAPON_PICKUP_INITIAL: usize = 75;
pub const HEALTH_PICKUP_INITIAL: usize = 40;
pub const AMMO_PICKUP_TARGET: usize = 60;
pub const WEAPON_PICKUP_TARGET: usize = 45;
pub const HEALTH_PICKUP_TARGET: usize = 25;

// Bots
pub const BOT_COUNT: usize = 5;
pub const BOT_LOW_AMMO: i32 = 10;
pub const BOT_AMMO_SCAN_RANGE: f64 = 600.0;
pub const BOT_ENGAGE_RANGE: f64 = 400.0;
pub const BOT_FIRE_RANGE: f64 = 300.0;
pub const BOT_WANDER_INTERVAL: u64 = 60;

// Chunk generation budget per tick
pub const MAX_CHUNKS_PER_TICK: usize = 3;
