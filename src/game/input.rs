//! Queued movement input and server-side reconciliation
//!
//! Clients stream movement intents tagged with the tick they were produced
//! for, plus their locally predicted position. Inputs queue per player and
//! drain in tick order at the start of each simulation step. The client's
//! predicted position is trusted when it stays within tolerance of the
//! server's own integration and passes collision checks; otherwise the
//! server result stands.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::store::SessionStore;
use crate::util::math::{round_angle, round_coord};
use crate::util::time::tick_delta;

use super::physics::circle_blocked;
use super::state::World;
use super::{CLIENT_POS_TOLERANCE, INPUT_STALE_TICKS, PLAYER_RADIUS};

/// One movement intent from a client, pinned to a simulation tick.
#[derive(Debug, Clone)]
pub struct QueuedInput {
    pub move_x: f64,
    pub move_y: f64,
    pub angle: f64,
    pub tick: u64,
    pub client_x: f64,
    pub client_y: f64,
}

/// Per-player FIFO queues of pending movement inputs. Pushed from connection
/// tasks, drained by the simulation loop.
#[derive(Default)]
pub struct InputQueue {
    queues: Mutex<HashMap<String, Vec<QueuedInput>>>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, player_id: &str, input: QueuedInput) {
        self.queues
            .lock()
            .entry(player_id.to_string())
            .or_default()
            .push(input);
    }

    pub fn remove(&self, player_id: &str) {
        self.queues.lock().remove(player_id);
    }

    /// Drain and apply every input due by `tick`. Called once per simulation
    /// step before anything else moves.
    pub fn apply(&self, world: &mut World, tick: u64, sessions: &SessionStore) {
        let mut queues = self.queues.lock();

        let mut empty = Vec::new();
        for (player_id, queue) in queues.iter_mut() {
            // Stale queue: the oldest pending input is too far in the past,
            // the client stopped sending or the connection stalled.
            if let Some(head) = queue.first() {
                if head.tick + INPUT_STALE_TICKS < tick {
                    warn!(
                        player_id = %player_id,
                        head_tick = head.tick,
                        tick,
                        dropped = queue.len(),
                        "discarding stale input queue"
                    );
                    queue.clear();
                    empty.push(player_id.clone());
                    continue;
                }
            }

            let processed = apply_player_inputs(world, player_id, queue, tick);
            if processed > 0 {
                if let Some(player) = world.players.get(player_id) {
                    sessions.save_player(player);
                }
            }
            if queue.is_empty() {
                empty.push(player_id.clone());
            }
        }

        for player_id in empty {
            queues.remove(&player_id);
        }
    }
}

/// Apply one player's due inputs in arrival order. Returns how many were
/// consumed (including invalid ones, which are skipped but still drained).
fn apply_player_inputs(
    world: &mut World,
    player_id: &str,
    queue: &mut Vec<QueuedInput>,
    tick: u64,
) -> usize {
    let (mut x, mut y, mut angle, velocity, alive) = match world.players.get(player_id) {
        Some(p) => (p.x, p.y, p.angle, p.velocity, p.alive),
        None => {
            queue.clear();
            return 0;
        }
    };
    if !alive {
        queue.clear();
        return 0;
    }

    let mut processed = 0;
    for input in queue.iter() {
        if input.tick > tick {
            break;
        }
        processed += 1;

        if !input_is_sane(input) {
            debug!(player_id = %player_id, "skipping malformed input");
            continue;
        }

        let (move_x, move_y) = clamp_to_unit(input.move_x, input.move_y);
        let step = velocity * tick_delta();
        let server_x = x + move_x * step;
        let server_y = y + move_y * step;

        // Trust the client's predicted position when it agrees with the
        // server's integration and isn't inside geometry; the client has
        // sub-tick timing the server can't reproduce.
        let drift = (input.client_x - server_x).hypot(input.client_y - server_y);
        let client_clear = drift <= CLIENT_POS_TOLERANCE
            && !circle_blocked(&world.obstacles, input.client_x, y, PLAYER_RADIUS)
            && !circle_blocked(&world.obstacles, input.client_x, input.client_y, PLAYER_RADIUS);

        if client_clear {
            x = round_coord(input.client_x);
            y = round_coord(input.client_y);
        } else {
            let (nx, ny) = super::physics::slide_move(&world.obstacles, x, y, server_x, server_y);
            x = nx;
            y = ny;
        }

        if input.angle != 0.0 {
            angle = round_angle(input.angle);
        }
    }

    queue.drain(..processed);

    if processed > 0 {
        world.ensure_chunks_around(x, y);
        if let Some(player) = world.players.get_mut(player_id) {
            player.x = x;
            player.y = y;
            player.angle = angle;
        }
    }
    processed
}

/// Reject non-finite and wildly out-of-range movement values outright.
/// Client-reported coordinates are not screened here; a non-finite drift
/// fails the trust comparison and the server result stands.
fn input_is_sane(input: &QueuedInput) -> bool {
    let finite = input.move_x.is_finite() && input.move_y.is_finite() && input.angle.is_finite();
    finite && input.move_x.abs() <= 10.0 && input.move_y.abs() <= 10.0
}

/// Clamp a movement vector to unit length, rounded to wire precision.
fn clamp_to_unit(move_x: f64, move_y: f64) -> (f64, f64) {
    let len = move_x.hypot(move_y);
    if len > 1.0 {
        (round_coord(move_x / len), round_coord(move_y / len))
    } else {
        (round_coord(move_x), round_coord(move_y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Player;

    fn input_at(tick: u64, move_x: f64, move_y: f64, client_x: f64, client_y: f64) -> QueuedInput {
        QueuedInput {
            move_x,
            move_y,
            angle: 0.0,
            tick,
            client_x,
            client_y,
        }
    }

    fn world_with_player(id: &str, x: f64, y: f64) -> World {
        let mut world = World::new(11);
        world.obstacles.clear();
        world.buildings.clear();
        world.trees.clear();
        world
            .players
            .insert(id.to_string(), Player::new_human(id.to_string(), x, y));
        world
    }

    #[test]
    fn client_position_is_trusted_within_tolerance() {
        let mut world = world_with_player("p1", 0.0, 0.0);
        let queue = InputQueue::new();
        let sessions = SessionStore::new();

        // server integrates to (5, 0); client claims (8, 1), within 15 units
        queue.push("p1", input_at(1, 1.0, 0.0, 8.0, 1.0));
        queue.apply(&mut world, 1, &sessions);

        let p = &world.players["p1"];
        assert_eq!((p.x, p.y), (8.0, 1.0));
    }

    #[test]
    fn divergent_client_position_falls_back_to_server_movement() {
        let mut world = world_with_player("p1", 0.0, 0.0);
        let queue = InputQueue::new();
        let sessions = SessionStore::new();

        // client claims a teleport 100 units off the server's integration
        queue.push("p1", input_at(1, 1.0, 0.0, 105.0, 0.0));
        queue.apply(&mut world, 1, &sessions);

        // velocity 100 at 20 tps = 5 units per tick
        let p = &world.players["p1"];
        assert_eq!((p.x, p.y), (5.0, 0.0));
    }

    #[test]
    fn oversized_move_vectors_are_normalized() {
        let mut world = world_with_player("p1", 0.0, 0.0);
        let queue = InputQueue::new();
        let sessions = SessionStore::new();

        // (3, 4) clamps to (0.6, 0.8); client position far off so the
        // server path is exercised
        queue.push("p1", input_at(1, 3.0, 4.0, 500.0, 500.0));
        queue.apply(&mut world, 1, &sessions);

        let p = &world.players["p1"];
        assert_eq!((p.x, p.y), (3.0, 4.0));
    }

    #[test]
    fn future_inputs_stay_queued() {
        let mut world = world_with_player("p1", 0.0, 0.0);
        let queue = InputQueue::new();
        let sessions = SessionStore::new();

        queue.push("p1", input_at(5, 1.0, 0.0, 5.0, 0.0));
        queue.apply(&mut world, 1, &sessions);
        assert_eq!(world.players["p1"].x, 0.0);

        queue.apply(&mut world, 5, &sessions);
        assert_eq!(world.players["p1"].x, 5.0);
    }

    #[test]
    fn stale_queues_are_discarded_wholesale() {
        let mut world = world_with_player("p1", 0.0, 0.0);
        let queue = InputQueue::new();
        let sessions = SessionStore::new();

        queue.push("p1", input_at(1, 1.0, 0.0, 5.0, 0.0));
        queue.push("p1", input_at(2, 1.0, 0.0, 10.0, 0.0));
        // tick 12: head at tick 1 is more than 10 ticks old
        queue.apply(&mut world, 12, &sessions);
        assert_eq!(world.players["p1"].x, 0.0);
    }

    #[test]
    fn malformed_inputs_are_consumed_but_not_applied() {
        let mut world = world_with_player("p1", 0.0, 0.0);
        let queue = InputQueue::new();
        let sessions = SessionStore::new();

        queue.push("p1", input_at(1, f64::NAN, 0.0, 5.0, 0.0));
        queue.push("p1", input_at(1, 50.0, 0.0, 5.0, 0.0));
        queue.apply(&mut world, 1, &sessions);

        let p = &world.players["p1"];
        assert_eq!((p.x, p.y), (0.0, 0.0));
        // both were drained, nothing pending
        queue.apply(&mut world, 2, &sessions);
        assert_eq!((world.players["p1"].x, world.players["p1"].y), (0.0, 0.0));
    }

    #[test]
    fn bad_client_coordinates_fall_back_to_server_movement() {
        let mut world = world_with_player("p1", 0.0, 0.0);
        let queue = InputQueue::new();
        let sessions = SessionStore::new();

        // NaN drift can never pass the trust check, but the movement vector
        // is valid and still applies server-side
        queue.push("p1", input_at(1, 1.0, 0.0, f64::NAN, 0.0));
        queue.apply(&mut world, 1, &sessions);

        let p = &world.players["p1"];
        assert_eq!((p.x, p.y), (5.0, 0.0));
    }

    #[test]
    fn nonzero_angle_updates_facing() {
        let mut world = world_with_player("p1", 0.0, 0.0);
        let queue = InputQueue::new();
        let sessions = SessionStore::new();

        let mut input = input_at(1, 0.0, 0.0, 0.0, 0.0);
        input.angle = 1.23456789;
        queue.push("p1", input);
        queue.apply(&mut world, 1, &sessions);

        assert_eq!(world.players["p1"].angle, 1.2346);
    }

    #[test]
    fn dead_players_ignore_input() {
        let mut world = world_with_player("p1", 0.0, 0.0);
        world.players.get_mut("p1").unwrap().alive = false;
        let queue = InputQueue::new();
        let sessions = SessionStore::new();

        queue.push("p1", input_at(1, 1.0, 0.0, 5.0, 0.0));
        queue.apply(&mut world, 1, &sessions);
        assert_eq!(world.players["p1"].x, 0.0);
    }
}
