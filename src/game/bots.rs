//! Scripted bot combatants
//!
//! Bots share the player entity and the same movement/combat rules as
//! humans. Each tick a bot picks one goal: restock when low on ammo, close
//! on the nearest human in range, or wander. Wander headings reroll on a
//! fixed cadence and immediately when movement is fully blocked.

use rand::Rng;
use tracing::debug;

use crate::util::math::round_angle;
use crate::util::time::tick_delta;

use super::physics::slide_move;
use super::state::World;
use super::{
    BOT_AMMO_SCAN_RANGE, BOT_ENGAGE_RANGE, BOT_FIRE_RANGE, BOT_LOW_AMMO, BOT_WANDER_INTERVAL,
};

/// Per-bot steering memory, keyed by bot id in the world.
#[derive(Debug, Clone)]
pub struct BotState {
    pub move_angle: f64,
    pub last_dir_change: u64,
}

impl BotState {
    pub fn new(rng: &mut impl Rng) -> Self {
        Self {
            move_angle: rng.gen::<f64>() * std::f64::consts::TAU,
            last_dir_change: 0,
        }
    }
}

enum Goal {
    /// Head toward a point of interest. `engage` marks a hostile target the
    /// bot should fire at; restock runs hold fire.
    Seek {
        x: f64,
        y: f64,
        dist: f64,
        engage: bool,
    },
    Wander,
}

/// Advance every living bot by one tick: choose a goal, steer, move with
/// wall-sliding, and fire at humans inside weapon range.
pub fn update_bots(world: &mut World, tick: u64, now_ms: u64) {
    let bot_ids: Vec<String> = world
        .players
        .values()
        .filter(|p| p.is_bot() && p.alive)
        .map(|p| p.id.clone())
        .collect();

    for bot_id in bot_ids {
        update_bot(world, &bot_id, tick, now_ms);
    }
}

fn update_bot(world: &mut World, bot_id: &str, tick: u64, now_ms: u64) {
    let (x, y, ammo, velocity) = match world.players.get(bot_id) {
        Some(b) => (b.x, b.y, b.ammo, b.velocity),
        None => return,
    };

    let goal = choose_goal(world, bot_id, x, y, ammo);

    let mut fire = false;
    let heading = match goal {
        Goal::Seek {
            x: tx,
            y: ty,
            dist,
            engage,
        } => {
            if engage && dist < BOT_FIRE_RANGE {
                fire = true;
            }
            (ty - y).atan2(tx - x)
        }
        Goal::Wander => {
            if !world.bot_states.contains_key(bot_id) {
                let fresh = BotState::new(&mut world.rng);
                world.bot_states.insert(bot_id.to_string(), fresh);
            }
            let needs_reroll = world
                .bot_states
                .get(bot_id)
                .is_some_and(|s| tick.saturating_sub(s.last_dir_change) > BOT_WANDER_INTERVAL);
            if needs_reroll {
                let angle = world.rng.gen::<f64>() * std::f64::consts::TAU;
                if let Some(state) = world.bot_states.get_mut(bot_id) {
                    state.move_angle = angle;
                    state.last_dir_change = tick;
                }
            }
            world.bot_states.get(bot_id).map_or(0.0, |s| s.move_angle)
        }
    };

    let step = velocity * tick_delta();
    let new_x = x + heading.cos() * step;
    let new_y = y + heading.sin() * step;
    let (moved_x, moved_y) = slide_move(&world.obstacles, x, y, new_x, new_y);

    // Fully blocked: pick a fresh direction next tick instead of grinding
    // into the wall.
    if moved_x == x && moved_y == y && (new_x != x || new_y != y) {
        let fresh_angle = world.rng.gen::<f64>() * std::f64::consts::TAU;
        if let Some(state) = world.bot_states.get_mut(bot_id) {
            state.move_angle = fresh_angle;
            state.last_dir_change = tick;
            debug!(bot_id = %bot_id, "bot blocked, rerolling heading");
        }
    }

    if let Some(bot) = world.players.get_mut(bot_id) {
        bot.x = moved_x;
        bot.y = moved_y;
        bot.angle = round_angle(heading);
    }

    if fire {
        world.fire(bot_id, now_ms);
    }
}

/// Goal priority: ammo pickup when low, then the nearest living human in
/// engage range, otherwise wander.
fn choose_goal(world: &World, bot_id: &str, x: f64, y: f64, ammo: i32) -> Goal {
    if ammo <= BOT_LOW_AMMO {
        let nearest_ammo = world
            .ammo_pickups
            .values()
            .filter(|p| p.active)
            .map(|p| (p.x, p.y, (p.x - x).hypot(p.y - y)))
            .filter(|&(_, _, d)| d < BOT_AMMO_SCAN_RANGE)
            .min_by(|a, b| a.2.total_cmp(&b.2));
        if let Some((px, py, dist)) = nearest_ammo {
            return Goal::Seek {
                x: px,
                y: py,
                dist,
                engage: false,
            };
        }
    }

    let nearest_human = world
        .players
        .values()
        .filter(|p| p.alive && !p.is_bot() && p.id != bot_id)
        .map(|p| (p.x, p.y, (p.x - x).hypot(p.y - y)))
        .filter(|&(_, _, d)| d < BOT_ENGAGE_RANGE)
        .min_by(|a, b| a.2.total_cmp(&b.2));
    if let Some((px, py, dist)) = nearest_human {
        return Goal::Seek {
            x: px,
            y: py,
            dist,
            engage: true,
        };
    }

    Goal::Wander
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{AmmoPickup, Player};
    use crate::game::BOT_SPEED;

    fn bare_world() -> World {
        let mut world = World::new(21);
        world.obstacles.clear();
        world.buildings.clear();
        world.trees.clear();
        world
    }

    fn add_bot(world: &mut World, id: &str, x: f64, y: f64) {
        let mut bot = Player::new_bot(id.to_string());
        bot.x = x;
        bot.y = y;
        world.players.insert(id.to_string(), bot);
        let state = BotState {
            move_angle: 0.0,
            last_dir_change: 0,
        };
        world.bot_states.insert(id.to_string(), state);
    }

    #[test]
    fn bots_close_on_humans_in_engage_range() {
        let mut world = bare_world();
        add_bot(&mut world, "enemy_1", 0.0, 0.0);
        world
            .players
            .insert("h1".into(), Player::new_human("h1".into(), 350.0, 0.0));

        update_bots(&mut world, 1, 10_000);

        let bot = &world.players["enemy_1"];
        assert!(bot.x > 0.0, "bot should move toward the human");
        assert_eq!(bot.angle, 0.0);
        // 350 > fire range, no shot yet
        assert!(world.projectiles.is_empty());
    }

    #[test]
    fn bots_fire_inside_weapon_range() {
        let mut world = bare_world();
        add_bot(&mut world, "enemy_1", 0.0, 0.0);
        world
            .players
            .insert("h1".into(), Player::new_human("h1".into(), 200.0, 0.0));

        update_bots(&mut world, 1, 10_000);
        assert_eq!(world.projectiles.len(), 1);
        assert_eq!(world.players["enemy_1"].ammo, 99);
    }

    #[test]
    fn low_ammo_bots_seek_ammo_instead_of_fighting() {
        let mut world = bare_world();
        add_bot(&mut world, "enemy_1", 0.0, 0.0);
        world.players.get_mut("enemy_1").unwrap().ammo = 5;
        world
            .players
            .insert("h1".into(), Player::new_human("h1".into(), 100.0, 0.0));
        world.ammo_pickups.insert(
            "ammo_1".into(),
            AmmoPickup {
                id: "ammo_1".into(),
                x: -300.0,
                y: 0.0,
                amount: 75,
                active: true,
            },
        );

        update_bots(&mut world, 1, 10_000);

        let bot = &world.players["enemy_1"];
        assert!(bot.x < 0.0, "bot should head for the ammo pickup");
        assert!(world.projectiles.is_empty(), "restocking bots hold fire");
    }

    #[test]
    fn low_ammo_bots_still_fight_when_no_ammo_is_near() {
        let mut world = bare_world();
        add_bot(&mut world, "enemy_1", 0.0, 0.0);
        world.players.get_mut("enemy_1").unwrap().ammo = 5;
        world
            .players
            .insert("h1".into(), Player::new_human("h1".into(), 200.0, 0.0));

        update_bots(&mut world, 1, 10_000);

        assert_eq!(world.projectiles.len(), 1, "engaged bots fire down to their last round");
        assert_eq!(world.players["enemy_1"].ammo, 4);
    }

    #[test]
    fn wander_heading_rerolls_on_the_cadence() {
        let mut world = bare_world();
        add_bot(&mut world, "enemy_1", 0.0, 0.0);

        update_bots(&mut world, 30, 10_000);
        let first = world.bot_states["enemy_1"].move_angle;
        assert_eq!(world.bot_states["enemy_1"].last_dir_change, 0);

        // exactly 60 ticks since the last change is not yet due
        update_bots(&mut world, 60, 13_000);
        assert_eq!(world.bot_states["enemy_1"].last_dir_change, 0);

        update_bots(&mut world, 61, 13_100);
        assert_eq!(world.bot_states["enemy_1"].last_dir_change, 61);
        let second = world.bot_states["enemy_1"].move_angle;
        assert_ne!(first, second);
    }

    #[test]
    fn bots_move_at_bot_speed_while_wandering() {
        let mut world = bare_world();
        add_bot(&mut world, "enemy_1", 0.0, 0.0);
        // heading 0 at tick < cadence keeps the seeded angle
        update_bots(&mut world, 1, 10_000);

        let bot = &world.players["enemy_1"];
        let moved = bot.x.hypot(bot.y);
        let expected = BOT_SPEED * tick_delta();
        assert!((moved - expected).abs() < 0.02, "moved {}", moved);
    }

    #[test]
    fn dead_bots_do_nothing() {
        let mut world = bare_world();
        add_bot(&mut world, "enemy_1", 0.0, 0.0);
        world.players.get_mut("enemy_1").unwrap().alive = false;

        update_bots(&mut world, 1, 10_000);
        let bot = &world.players["enemy_1"];
        assert_eq!((bot.x, bot.y), (0.0, 0.0));
    }
}
