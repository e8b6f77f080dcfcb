//! Authoritative game server: simulation loop, broadcast loop, and the
//! connection-facing API
//!
//! One `GameServer` owns the world behind a read/write lock. The simulation
//! task advances the world at a fixed tick rate; the broadcast task snapshots
//! it at a lower rate and fans per-client diffs out on dedicated tasks, so a
//! slow client never blocks the tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::json;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::SessionStore;
use crate::util::math::{round_angle, round_coord};
use crate::util::time::{unix_millis, uptime_secs, BROADCAST_INTERVAL_MICROS, TICK_DURATION_MICROS};
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::bots::{update_bots, BotState};
use super::input::{InputQueue, QueuedInput};
use super::physics::{point_blocked, zone_damage_per_tick};
use super::snapshot::{build_world_view, create_diff, ClientCursor};
use super::state::{AmmoPickup, HealthPickup, Phase, Player, WeaponPickup, World, BOT_ID_PREFIX};
use super::weapons::{WeaponKind, ALL_WEAPONS};
use super::worldgen::chunk_coord;
use super::{
    AMMO_PICKUP_AMOUNT, AMMO_PICKUP_INITIAL, AMMO_PICKUP_SCORE, AMMO_PICKUP_TARGET, BOT_COUNT,
    BULLET_DAMAGE, BULLET_HIT_RADIUS, HEALTH_PICKUP_AMOUNT, HEALTH_PICKUP_INITIAL,
    HEALTH_PICKUP_SCORE, HEALTH_PICKUP_TARGET, KILL_SCORE, MAX_CHUNKS_PER_TICK, MAX_HEALTH,
    PICKUP_RADIUS, PLAYER_RADIUS, STARTING_AMMO, WEAPON_PICKUP_INITIAL, WEAPON_PICKUP_SCORE,
    WEAPON_PICKUP_TARGET, WORLD_EXTENT, ZONE_FLOOR_RADIUS, ZONE_INITIAL_RADIUS,
    ZONE_SHRINK_INTERVAL, ZONE_SHRINK_STEP,
};

/// Placement clearance for ammo and weapon pickups
const PICKUP_PLACE_RADIUS: f64 = 10.0;
/// Health crates are a little larger
const HEALTH_PLACE_RADIUS: f64 = 12.0;
/// Spawn attempt budget for players and bots
const SPAWN_ATTEMPTS: usize = 100;

/// One connected client. The sender feeds the connection's writer task;
/// `shutdown` fires when a newer connection claims the same player.
pub struct ClientHandle {
    pub conn_id: u64,
    pub player_id: String,
    pub session_id: String,
    pub tx: mpsc::UnboundedSender<ServerMsg>,
    pub cursor: Mutex<ClientCursor>,
    pub shutdown: Notify,
}

pub struct GameServer {
    world: RwLock<World>,
    clients: DashMap<u64, Arc<ClientHandle>>,
    sessions: SessionStore,
    inputs: InputQueue,
    /// Fractional zone damage carried between ticks, per player
    zone_damage_accum: Mutex<HashMap<String, f64>>,
    current_tick: AtomicU64,
    next_conn_id: AtomicU64,
}

impl GameServer {
    pub fn new(seed: u64) -> Self {
        Self {
            world: RwLock::new(World::with_population(seed)),
            clients: DashMap::new(),
            sessions: SessionStore::new(),
            inputs: InputQueue::new(),
            zone_damage_accum: Mutex::new(HashMap::new()),
            current_tick: AtomicU64::new(0),
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::Relaxed)
    }

    /// Fixed-rate simulation loop. Skips missed ticks rather than bunching
    /// them up after a stall.
    pub async fn run_simulation(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_micros(TICK_DURATION_MICROS));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut tick: u64 = 0;
        loop {
            interval.tick().await;
            tick += 1;
            self.update(tick).await;
        }
    }

    /// Snapshot-and-fan-out loop, running slower than the simulation.
    pub async fn run_broadcast(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_micros(BROADCAST_INTERVAL_MICROS));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.broadcast_once().await;
        }
    }

    /// Advance the world by one tick.
    pub async fn update(&self, tick: u64) {
        self.current_tick.store(tick, Ordering::Relaxed);
        let now_ms = unix_millis();

        let mut guard = self.world.write().await;
        let world = &mut *guard;

        if world.phase == Phase::Lobby && !world.players.is_empty() {
            info!("first players present, match starting");
            world.phase = Phase::Playing;
        }

        self.inputs.apply(world, tick, &self.sessions);
        world.process_pending_chunks(MAX_CHUNKS_PER_TICK);
        world.game_time = tick;

        // Projectile flight and impact. An obstacle hit consumes the
        // projectile before any player overlap is considered.
        let mut kill_credits = Vec::new();
        for bullet in world.projectiles.values_mut() {
            if !bullet.active {
                continue;
            }

            bullet.x = round_coord(bullet.x + bullet.angle.cos() * bullet.speed);
            bullet.y = round_coord(bullet.y + bullet.angle.sin() * bullet.speed);

            if bullet.x.abs() > WORLD_EXTENT || bullet.y.abs() > WORLD_EXTENT {
                bullet.active = false;
                continue;
            }
            if point_blocked(&world.obstacles, bullet.x, bullet.y) {
                bullet.active = false;
                continue;
            }

            for player in world.players.values_mut() {
                if player.id == bullet.player_id || !player.alive {
                    continue;
                }
                if (bullet.x - player.x).hypot(bullet.y - player.y) < BULLET_HIT_RADIUS {
                    player.health -= BULLET_DAMAGE;
                    bullet.active = false;
                    if player.health <= 0 {
                        player.health = 0;
                        player.alive = false;
                        info!(victim = %player.id, killer = %bullet.player_id, "player eliminated");
                        kill_credits.push(bullet.player_id.clone());
                    }
                    break;
                }
            }
        }
        for killer_id in kill_credits {
            if let Some(killer) = world.players.get_mut(&killer_id) {
                killer.kills += 1;
                killer.score += KILL_SCORE;
            }
        }
        world.projectiles.retain(|_, b| b.active);

        // Pickup collection by living players.
        for player in world.players.values_mut() {
            if !player.alive {
                continue;
            }

            for ammo in world.ammo_pickups.values_mut() {
                if ammo.active && (player.x - ammo.x).hypot(player.y - ammo.y) < PICKUP_RADIUS {
                    player.ammo += ammo.amount;
                    player.score += AMMO_PICKUP_SCORE;
                    ammo.active = false;
                    debug!(player_id = %player.id, ammo = player.ammo, "ammo collected");
                }
            }
            for weapon in world.weapon_pickups.values_mut() {
                if weapon.active
                    && (player.x - weapon.x).hypot(player.y - weapon.y) < PICKUP_RADIUS
                {
                    player.weapon = weapon.weapon;
                    player.ammo += weapon.weapon.initial_ammo();
                    player.score += WEAPON_PICKUP_SCORE;
                    weapon.active = false;
                    debug!(player_id = %player.id, weapon = weapon.weapon.name(), "weapon collected");
                }
            }
            for health in world.health_pickups.values_mut() {
                if health.active
                    && (player.x - health.x).hypot(player.y - health.y) < PICKUP_RADIUS
                {
                    player.health = (player.health + health.amount).min(MAX_HEALTH);
                    player.score += HEALTH_PICKUP_SCORE;
                    health.active = false;
                    debug!(player_id = %player.id, health = player.health, "health collected");
                }
            }
        }

        world.ammo_pickups.retain(|_, p| p.active);
        world.weapon_pickups.retain(|_, p| p.active);
        world.health_pickups.retain(|_, p| p.active);
        world.top_up_pickups();

        if tick % ZONE_SHRINK_INTERVAL == 0 {
            if world.zone_radius > ZONE_FLOOR_RADIUS {
                world.zone_radius -= ZONE_SHRINK_STEP;
            } else {
                info!("zone floor reached, resetting round");
                world.reset_round();
            }
        }

        update_bots(world, tick, now_ms);

        // Zone damage with a fractional accumulator so sub-point damage is
        // never lost between ticks.
        let per_tick = zone_damage_per_tick(world.zone_radius);
        let zone_center = world.zone_center;
        let zone_radius = world.zone_radius;
        {
            let mut accum = self.zone_damage_accum.lock();
            for player in world.players.values_mut() {
                if !player.alive {
                    continue;
                }
                let dist = (player.x - zone_center).hypot(player.y - zone_center);
                if dist > zone_radius {
                    let total = {
                        let entry = accum.entry(player.id.clone()).or_insert(0.0);
                        *entry += per_tick;
                        *entry
                    };
                    if total >= 1.0 {
                        let whole = total.floor();
                        player.health -= whole as i32;
                        accum.insert(player.id.clone(), total - whole);
                    }
                    if player.health <= 0 {
                        player.health = 0;
                        player.alive = false;
                        accum.remove(&player.id);
                        info!(player_id = %player.id, "player died to the zone");
                    }
                } else {
                    accum.remove(&player.id);
                }
            }
        }

        if world.alive_count() <= 1 && world.phase == Phase::Playing {
            world.phase = Phase::Finished;
            world.winner = world
                .players
                .values()
                .find(|p| p.alive)
                .map(|p| p.id.clone());
            info!(winner = ?world.winner, "match finished");
        }

        let to_save: Vec<Player> = world.players.values().cloned().collect();
        drop(guard);

        for player in &to_save {
            self.sessions.save_player(player);
        }
    }

    async fn broadcast_once(self: &Arc<Self>) {
        if self.clients.is_empty() {
            return;
        }

        let view = {
            let world = self.world.read().await;
            Arc::new(build_world_view(&world))
        };
        let tick = self.current_tick();

        let clients: Vec<Arc<ClientHandle>> =
            self.clients.iter().map(|e| Arc::clone(e.value())).collect();
        for client in clients {
            let this = Arc::clone(self);
            let view = Arc::clone(&view);
            tokio::spawn(async move {
                let (x, y) = match view.players.get(&client.player_id) {
                    Some(p) => (p.x, p.y),
                    None => return,
                };
                this.send_chunks_to_client(&client, x, y).await;

                let diff = {
                    let mut cursor = client.cursor.lock();
                    create_diff(&view, &mut cursor, &client.player_id, tick)
                };
                if client.tx.send(ServerMsg::StateDiff(Box::new(diff))).is_err() {
                    debug!(player_id = %client.player_id, "dropping diff for closed connection");
                }
            });
        }
    }

    /// Register a connection, restoring the session's player when the token
    /// is known and spawning a fresh one otherwise. An older connection for
    /// the same player is evicted.
    pub async fn connect(
        &self,
        session_id: Option<String>,
        tx: mpsc::UnboundedSender<ServerMsg>,
    ) -> Arc<ClientHandle> {
        let restored = session_id
            .as_deref()
            .and_then(|sid| self.sessions.restore(sid).map(|p| (sid.to_string(), p)));

        let (session_id, player) = match restored {
            Some((sid, player)) => (sid, player),
            None => {
                let player = self.spawn_new_player().await;
                let sid = session_id
                    .unwrap_or_else(|| format!("session_{}", Uuid::new_v4().simple()));
                (sid, player)
            }
        };

        let player_id = player.id.clone();
        self.sessions.insert(session_id.clone(), player.clone());

        // A reconnect for the same player replaces the old connection.
        let stale: Vec<u64> = self
            .clients
            .iter()
            .filter(|e| e.value().player_id == player_id)
            .map(|e| *e.key())
            .collect();
        for conn_id in stale {
            if let Some((_, old)) = self.clients.remove(&conn_id) {
                info!(player_id = %player_id, conn_id, "evicting superseded connection");
                old.shutdown.notify_one();
            }
        }

        {
            let mut world = self.world.write().await;
            world.players.insert(player_id.clone(), player);
        }

        let handle = Arc::new(ClientHandle {
            conn_id: self.next_conn_id.fetch_add(1, Ordering::Relaxed),
            player_id: player_id.clone(),
            session_id,
            tx,
            cursor: Mutex::new(ClientCursor::new()),
            shutdown: Notify::new(),
        });
        self.clients.insert(handle.conn_id, Arc::clone(&handle));
        info!(player_id = %player_id, conn_id = handle.conn_id, "player connected");
        handle
    }

    async fn spawn_new_player(&self) -> Player {
        let mut world = self.world.write().await;
        let sx = (world.rng.gen_range(0.0..1.0) - 0.5) * 200.0;
        let sy = (world.rng.gen_range(0.0..1.0) - 0.5) * 200.0;
        let (x, y, ok) = world.find_valid_position(sx, sy, PLAYER_RADIUS, SPAWN_ATTEMPTS, false);
        let id = format!("player_{}", Uuid::new_v4().simple());
        if !ok {
            warn!(player_id = %id, "no clear spawn position found, spawning anyway");
        }
        Player::new_human(id, round_coord(x), round_coord(y))
    }

    /// Deliver the welcome message: nearby terrain followed by a full
    /// initial state scoped to the player's area of interest.
    pub async fn send_init(&self, client: &ClientHandle) {
        let (x, y) = {
            let world = self.world.read().await;
            world
                .players
                .get(&client.player_id)
                .map_or((0.0, 0.0), |p| (p.x, p.y))
        };
        self.send_chunks_to_client(client, x, y).await;

        let view = {
            let world = self.world.read().await;
            Arc::new(build_world_view(&world))
        };
        let state = {
            let mut cursor = client.cursor.lock();
            create_diff(&view, &mut cursor, &client.player_id, self.current_tick())
        };
        let _ = client.tx.send(ServerMsg::Init {
            player_id: client.player_id.clone(),
            session_id: client.session_id.clone(),
            state: Box::new(state),
        });
    }

    pub async fn handle_message(&self, client: &ClientHandle, msg: ClientMsg) {
        match msg {
            ClientMsg::Ping { time } => {
                let _ = client.tx.send(ServerMsg::Pong { time });
            }
            ClientMsg::Respawn => {
                let now_saved = {
                    let mut world = self.world.write().await;
                    let (x, y, ok) =
                        world.find_valid_position(0.0, 0.0, PLAYER_RADIUS, SPAWN_ATTEMPTS, true);
                    if !ok {
                        warn!(player_id = %client.player_id, "no clear respawn position found");
                    }
                    match world.players.get_mut(&client.player_id) {
                        Some(player) => {
                            player.health = MAX_HEALTH;
                            player.alive = true;
                            player.ammo = STARTING_AMMO;
                            player.weapon = WeaponKind::Pistol;
                            player.x = round_coord(x);
                            player.y = round_coord(y);
                            player.angle = 0.0;
                            info!(player_id = %player.id, x = player.x, y = player.y, "player respawned");
                            Some(player.clone())
                        }
                        None => None,
                    }
                };
                if let Some(player) = now_saved {
                    self.sessions.save_player(&player);
                }
            }
            ClientMsg::Input {
                move_x,
                move_y,
                angle,
                shoot,
                client_x,
                client_y,
            } => {
                if shoot {
                    let now_ms = unix_millis();
                    let saved = {
                        let mut world = self.world.write().await;
                        match world.players.get_mut(&client.player_id) {
                            Some(player) => player.angle = round_angle(angle),
                            None => return,
                        }
                        world.fire(&client.player_id, now_ms);
                        world.players.get(&client.player_id).cloned()
                    };
                    if let Some(player) = saved {
                        self.sessions.save_player(&player);
                    }
                    return;
                }

                if angle != 0.0 {
                    let mut world = self.world.write().await;
                    if let Some(player) = world.players.get_mut(&client.player_id) {
                        player.angle = round_angle(angle);
                    }
                }

                if move_x != 0.0 || move_y != 0.0 {
                    self.inputs.push(
                        &client.player_id,
                        QueuedInput {
                            move_x,
                            move_y,
                            angle,
                            tick: self.current_tick() + 1,
                            client_x,
                            client_y,
                        },
                    );
                }
            }
        }
    }

    /// Tear a connection down. The player entity survives only when another
    /// connection for the same player remains.
    pub async fn disconnect(&self, client: &ClientHandle) {
        if self.clients.remove(&client.conn_id).is_none() {
            return;
        }

        let has_other = self
            .clients
            .iter()
            .any(|e| e.value().player_id == client.player_id);
        if !has_other {
            let mut world = self.world.write().await;
            world.players.remove(&client.player_id);
            drop(world);
            self.inputs.remove(&client.player_id);
            self.zone_damage_accum.lock().remove(&client.player_id);
        }
        info!(player_id = %client.player_id, conn_id = client.conn_id, "player disconnected");
    }

    /// Ship any terrain chunks near the position this client hasn't seen.
    async fn send_chunks_to_client(&self, client: &ClientHandle, x: f64, y: f64) {
        let (cx, cy) = chunk_coord(x, y);
        let candidates: Vec<(i32, i32)> = {
            let cursor = client.cursor.lock();
            (-2..=2)
                .flat_map(|dx| (-2..=2).map(move |dy| (cx + dx, cy + dy)))
                .filter(|coord| !cursor.known_chunks.contains(coord))
                .collect()
        };
        if candidates.is_empty() {
            return;
        }

        let mut chunks = Vec::new();
        let mut delivered = Vec::new();
        {
            let world = self.world.read().await;
            for coord in candidates {
                if let Some(chunk) = world.chunks.get(coord) {
                    chunks.push(chunk.clone());
                    delivered.push(coord);
                }
            }
        }
        if chunks.is_empty() {
            return;
        }

        {
            let mut cursor = client.cursor.lock();
            cursor.known_chunks.extend(delivered);
        }
        let _ = client.tx.send(ServerMsg::WorldChunks { chunks });
    }

    /// Liveness report for the health endpoint.
    pub async fn health_snapshot(&self) -> serde_json::Value {
        let world = self.world.read().await;
        let bots = world.bot_count();
        json!({
            "status": "ok",
            "uptimeSecs": uptime_secs(),
            "tick": self.current_tick(),
            "phase": world.phase,
            "players": world.players.len() - bots,
            "bots": bots,
            "connections": self.clients.len(),
            "sessions": self.sessions.len(),
        })
    }
}

impl World {
    /// Initial pickup population, denser than the steady-state targets.
    pub(crate) fn seed_pickups(&mut self) {
        for _ in 0..AMMO_PICKUP_INITIAL {
            self.spawn_ammo_pickup();
        }
        for _ in 0..WEAPON_PICKUP_INITIAL {
            self.spawn_weapon_pickup();
        }
        for _ in 0..HEALTH_PICKUP_INITIAL {
            self.spawn_health_pickup();
        }
    }

    /// Keep each pickup family at or above its steady-state count.
    fn top_up_pickups(&mut self) {
        while self.ammo_pickups.len() < AMMO_PICKUP_TARGET {
            self.spawn_ammo_pickup();
        }
        while self.weapon_pickups.len() < WEAPON_PICKUP_TARGET {
            self.spawn_weapon_pickup();
        }
        while self.health_pickups.len() < HEALTH_PICKUP_TARGET {
            self.spawn_health_pickup();
        }
    }

    fn spawn_ammo_pickup(&mut self) {
        let id = self.next_pickup_id("ammo");
        let (x, y) = self.find_valid_pickup_position(PICKUP_PLACE_RADIUS, true);
        self.ammo_pickups.insert(
            id.clone(),
            AmmoPickup {
                id,
                x,
                y,
                amount: AMMO_PICKUP_AMOUNT,
                active: true,
            },
        );
    }

    fn spawn_weapon_pickup(&mut self) {
        let id = self.next_pickup_id("weapon");
        let (x, y) = self.find_valid_pickup_position(PICKUP_PLACE_RADIUS, true);
        let weapon = ALL_WEAPONS[self.rng.gen_range(0..ALL_WEAPONS.len())];
        self.weapon_pickups.insert(
            id.clone(),
            WeaponPickup {
                id,
                x,
                y,
                weapon,
                active: true,
            },
        );
    }

    fn spawn_health_pickup(&mut self) {
        let id = self.next_pickup_id("health");
        let (x, y) = self.find_valid_pickup_position(HEALTH_PLACE_RADIUS, true);
        self.health_pickups.insert(
            id.clone(),
            HealthPickup {
                id,
                x,
                y,
                amount: HEALTH_PICKUP_AMOUNT,
                active: true,
            },
        );
    }

    /// Fill the bot roster at startup.
    pub(crate) fn spawn_bots(&mut self) {
        for i in 1..=BOT_COUNT {
            let id = format!("{}{}", BOT_ID_PREFIX, i);
            let (x, y, ok) = self.find_valid_position(0.0, 0.0, PLAYER_RADIUS, SPAWN_ATTEMPTS, true);
            if !ok {
                warn!(bot_id = %id, "no clear spawn position for bot");
            }
            let mut bot = Player::new_bot(id.clone());
            bot.x = x;
            bot.y = y;
            self.players.insert(id.clone(), bot);
            let state = BotState::new(&mut self.rng);
            self.bot_states.insert(id, state);
        }
    }

    /// Zone floor reached: widen the zone back out around the living humans,
    /// refresh the bot roster, and rescatter collected pickups.
    fn reset_round(&mut self) {
        self.zone_radius = ZONE_INITIAL_RADIUS;

        let mut avg_x = 0.0;
        let mut avg_y = 0.0;
        let mut count = 0usize;
        for p in self.players.values() {
            if p.alive && !p.is_bot() {
                avg_x += p.x;
                avg_y += p.y;
                count += 1;
            }
        }
        self.zone_center = if count > 0 {
            let n = count as f64;
            (avg_x / n + avg_y / n) / 2.0
        } else {
            0.0
        };

        for i in 1..=BOT_COUNT {
            let id = format!("{}{}", BOT_ID_PREFIX, i);
            let (x, y, ok) = self.find_valid_position(0.0, 0.0, PLAYER_RADIUS, SPAWN_ATTEMPTS, true);
            if !ok {
                warn!(bot_id = %id, "no clear respawn position for bot on round reset");
            }
            let state = BotState::new(&mut self.rng);
            let bot = self
                .players
                .entry(id.clone())
                .or_insert_with(|| Player::new_bot(id.clone()));
            bot.health = MAX_HEALTH;
            bot.alive = true;
            bot.ammo = STARTING_AMMO;
            bot.weapon = WeaponKind::Pistol;
            bot.score = 0;
            bot.kills = 0;
            bot.x = x;
            bot.y = y;
            bot.angle = 0.0;
            self.bot_states.insert(id, state);
        }

        self.rescatter_inactive_pickups();
    }

    fn rescatter_inactive_pickups(&mut self) {
        let ammo_ids: Vec<String> = self
            .ammo_pickups
            .values()
            .filter(|p| !p.active)
            .map(|p| p.id.clone())
            .collect();
        for id in ammo_ids {
            let (x, y) = self.find_valid_pickup_position(PICKUP_PLACE_RADIUS, true);
            if let Some(p) = self.ammo_pickups.get_mut(&id) {
                p.active = true;
                p.x = x;
                p.y = y;
            }
        }

        let weapon_ids: Vec<String> = self
            .weapon_pickups
            .values()
            .filter(|p| !p.active)
            .map(|p| p.id.clone())
            .collect();
        for id in weapon_ids {
            let (x, y) = self.find_valid_pickup_position(PICKUP_PLACE_RADIUS, true);
            if let Some(p) = self.weapon_pickups.get_mut(&id) {
                p.active = true;
                p.x = x;
                p.y = y;
            }
        }

        let health_ids: Vec<String> = self
            .health_pickups
            .values()
            .filter(|p| !p.active)
            .map(|p| p.id.clone())
            .collect();
        for id in health_ids {
            let (x, y) = self.find_valid_pickup_position(HEALTH_PLACE_RADIUS, true);
            if let Some(p) = self.health_pickups.get_mut(&id) {
                p.active = true;
                p.x = x;
                p.y = y;
            }
        }
    }
}
