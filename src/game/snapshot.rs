//! World views and per-client incremental replication
//!
//! Each broadcast builds one immutable `WorldView` under the world read lock,
//! then diffs it against every client's previous view outside the lock. A
//! client's first diff is a full area-of-interest snapshot; later diffs carry
//! only entities that changed, entered view, or disappeared.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::util::math::floats_equal;
use crate::ws::protocol::StateDiff;

use super::state::{
    AmmoPickup, HealthPickup, Phase, Player, Projectile, WeaponPickup, World,
};
use super::{ANGLE_EPSILON, AOI_RADIUS_SQ, COORD_EPSILON, PLAYER_UPDATE_DISTANCE_SQ};

/// Immutable copy of the replicated world state at one instant. Shared
/// across all per-client diff tasks for a broadcast; inactive projectiles
/// and pickups are excluded at construction.
pub struct WorldView {
    pub players: HashMap<String, Player>,
    pub bullets: HashMap<String, Projectile>,
    pub ammo_pickups: HashMap<String, AmmoPickup>,
    pub weapon_pickups: HashMap<String, WeaponPickup>,
    pub health_pickups: HashMap<String, HealthPickup>,
    pub zone_center: f64,
    pub zone_radius: f64,
    pub game_time: u64,
    pub phase: Phase,
    pub winner: Option<String>,
}

pub fn build_world_view(world: &World) -> WorldView {
    WorldView {
        players: world.players.clone(),
        bullets: world
            .projectiles
            .iter()
            .filter(|(_, b)| b.active)
            .map(|(id, b)| (id.clone(), b.clone()))
            .collect(),
        ammo_pickups: world
            .ammo_pickups
            .iter()
            .filter(|(_, p)| p.active)
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect(),
        weapon_pickups: world
            .weapon_pickups
            .iter()
            .filter(|(_, p)| p.active)
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect(),
        health_pickups: world
            .health_pickups
            .iter()
            .filter(|(_, p)| p.active)
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect(),
        zone_center: world.zone_center,
        zone_radius: world.zone_radius,
        game_time: world.game_time,
        phase: world.phase,
        winner: world.winner.clone(),
    }
}

/// Per-client replication state: the last view this client was diffed
/// against and the terrain chunks it has already received.
#[derive(Default)]
pub struct ClientCursor {
    pub last: Option<Arc<WorldView>>,
    pub known_chunks: HashSet<(i32, i32)>,
}

impl ClientCursor {
    pub fn new() -> Self {
        Self::default()
    }
}

fn within(x: f64, y: f64, cx: f64, cy: f64, radius_sq: f64) -> bool {
    let dx = x - cx;
    let dy = y - cy;
    dx * dx + dy * dy <= radius_sq
}

/// Diff `current` against the client's previous view and advance the cursor.
/// Entity inclusion is scoped to the client's area of interest around its
/// own player; the client's own player is always included when changed.
pub fn create_diff(
    current: &Arc<WorldView>,
    cursor: &mut ClientCursor,
    self_id: &str,
    tick: u64,
) -> StateDiff {
    let (cx, cy) = current
        .players
        .get(self_id)
        .map_or((0.0, 0.0), |p| (p.x, p.y));

    let mut diff = StateDiff::new(tick);

    match cursor.last.as_deref() {
        None => full_snapshot(current, self_id, cx, cy, &mut diff),
        Some(last) => incremental(current, last, self_id, cx, cy, &mut diff),
    }

    cursor.last = Some(Arc::clone(current));
    diff
}

fn full_snapshot(view: &WorldView, self_id: &str, cx: f64, cy: f64, diff: &mut StateDiff) {
    for (id, player) in &view.players {
        if id == self_id || within(player.x, player.y, cx, cy, PLAYER_UPDATE_DISTANCE_SQ) {
            diff.players.insert(id.clone(), player.clone());
        }
    }
    for (id, bullet) in &view.bullets {
        if within(bullet.x, bullet.y, cx, cy, AOI_RADIUS_SQ) {
            diff.bullets.insert(id.clone(), bullet.clone());
        }
    }
    for (id, pickup) in &view.ammo_pickups {
        if within(pickup.x, pickup.y, cx, cy, AOI_RADIUS_SQ) {
            diff.ammo_pickups.insert(id.clone(), pickup.clone());
        }
    }
    for (id, pickup) in &view.weapon_pickups {
        if within(pickup.x, pickup.y, cx, cy, AOI_RADIUS_SQ) {
            diff.weapon_pickups.insert(id.clone(), pickup.clone());
        }
    }
    for (id, pickup) in &view.health_pickups {
        if within(pickup.x, pickup.y, cx, cy, AOI_RADIUS_SQ) {
            diff.health_pickups.insert(id.clone(), pickup.clone());
        }
    }

    diff.zone_center = Some(view.zone_center);
    diff.zone_radius = Some(view.zone_radius);
    diff.game_time = Some(view.game_time);
    diff.phase = Some(view.phase);
    diff.winner = view.winner.clone();
}

fn incremental(
    view: &WorldView,
    last: &WorldView,
    self_id: &str,
    cx: f64,
    cy: f64,
    diff: &mut StateDiff,
) {
    for (id, player) in &view.players {
        let in_scope =
            id == self_id || within(player.x, player.y, cx, cy, PLAYER_UPDATE_DISTANCE_SQ);
        if in_scope && player_changed(player, last.players.get(id)) {
            diff.players.insert(id.clone(), player.clone());
        }
    }
    for id in last.players.keys() {
        if !view.players.contains_key(id) {
            diff.removed_players.push(id.clone());
        }
    }

    for (id, bullet) in &view.bullets {
        if within(bullet.x, bullet.y, cx, cy, AOI_RADIUS_SQ)
            && bullet_changed(bullet, last.bullets.get(id))
        {
            diff.bullets.insert(id.clone(), bullet.clone());
        }
    }
    collect_removals(
        &last.bullets,
        &view.bullets,
        cx,
        cy,
        |b| (b.x, b.y),
        &mut diff.removed_bullets,
    );

    for (id, pickup) in &view.ammo_pickups {
        if within(pickup.x, pickup.y, cx, cy, AOI_RADIUS_SQ)
            && last.ammo_pickups.get(id).map_or(true, |l| l.active != pickup.active)
        {
            diff.ammo_pickups.insert(id.clone(), pickup.clone());
        }
    }
    collect_removals(
        &last.ammo_pickups,
        &view.ammo_pickups,
        cx,
        cy,
        |p| (p.x, p.y),
        &mut diff.removed_ammo_pickups,
    );

    for (id, pickup) in &view.weapon_pickups {
        if within(pickup.x, pickup.y, cx, cy, AOI_RADIUS_SQ)
            && last
                .weapon_pickups
                .get(id)
                .map_or(true, |l| l.active != pickup.active)
        {
            diff.weapon_pickups.insert(id.clone(), pickup.clone());
        }
    }
    collect_removals(
        &last.weapon_pickups,
        &view.weapon_pickups,
        cx,
        cy,
        |p| (p.x, p.y),
        &mut diff.removed_weapon_pickups,
    );

    for (id, pickup) in &view.health_pickups {
        if within(pickup.x, pickup.y, cx, cy, AOI_RADIUS_SQ)
            && last
                .health_pickups
                .get(id)
                .map_or(true, |l| l.active != pickup.active)
        {
            diff.health_pickups.insert(id.clone(), pickup.clone());
        }
    }
    collect_removals(
        &last.health_pickups,
        &view.health_pickups,
        cx,
        cy,
        |p| (p.x, p.y),
        &mut diff.removed_health_pickups,
    );

    if !floats_equal(view.zone_center, last.zone_center, COORD_EPSILON) {
        diff.zone_center = Some(view.zone_center);
    }
    if !floats_equal(view.zone_radius, last.zone_radius, COORD_EPSILON) {
        diff.zone_radius = Some(view.zone_radius);
    }
    if view.game_time != last.game_time {
        diff.game_time = Some(view.game_time);
    }
    if view.phase != last.phase {
        diff.phase = Some(view.phase);
    }
    if view.winner != last.winner {
        diff.winner = view.winner.clone();
    }
}

fn player_changed(current: &Player, last: Option<&Player>) -> bool {
    match last {
        None => true,
        Some(last) => {
            !floats_equal(current.x, last.x, COORD_EPSILON)
                || !floats_equal(current.y, last.y, COORD_EPSILON)
                || !floats_equal(current.angle, last.angle, ANGLE_EPSILON)
                || current.health != last.health
                || current.ammo != last.ammo
                || current.weapon != last.weapon
                || current.alive != last.alive
                || current.score != last.score
                || current.kills != last.kills
        }
    }
}

fn bullet_changed(current: &Projectile, last: Option<&Projectile>) -> bool {
    match last {
        None => true,
        Some(last) => {
            !floats_equal(current.x, last.x, COORD_EPSILON)
                || !floats_equal(current.y, last.y, COORD_EPSILON)
                || !floats_equal(current.angle, last.angle, ANGLE_EPSILON)
                || current.active != last.active
        }
    }
}

/// Entities present in the last view but gone from the current one are
/// reported as removed when the client could have seen them, judged by the
/// entity's last known position.
fn collect_removals<T>(
    last: &HashMap<String, T>,
    current: &HashMap<String, T>,
    cx: f64,
    cy: f64,
    position: impl Fn(&T) -> (f64, f64),
    removed: &mut Vec<String>,
) {
    for (id, entity) in last {
        if current.contains_key(id) {
            continue;
        }
        let (x, y) = position(entity);
        if within(x, y, cx, cy, AOI_RADIUS_SQ) {
            removed.push(id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Player;

    fn empty_view() -> WorldView {
        WorldView {
            players: HashMap::new(),
            bullets: HashMap::new(),
            ammo_pickups: HashMap::new(),
            weapon_pickups: HashMap::new(),
            health_pickups: HashMap::new(),
            zone_center: 0.0,
            zone_radius: 3200.0,
            game_time: 0,
            phase: Phase::Playing,
            winner: None,
        }
    }

    fn view_with_players(players: &[(&str, f64, f64)]) -> Arc<WorldView> {
        let mut view = empty_view();
        for (id, x, y) in players {
            view.players
                .insert(id.to_string(), Player::new_human(id.to_string(), *x, *y));
        }
        Arc::new(view)
    }

    #[test]
    fn first_diff_is_a_full_snapshot_with_scalars() {
        let view = view_with_players(&[("p1", 0.0, 0.0), ("p2", 100.0, 0.0)]);
        let mut cursor = ClientCursor::new();

        let diff = create_diff(&view, &mut cursor, "p1", 1);
        assert_eq!(diff.players.len(), 2);
        assert_eq!(diff.zone_radius, Some(3200.0));
        assert_eq!(diff.phase, Some(Phase::Playing));
        assert!(cursor.last.is_some());
    }

    #[test]
    fn unchanged_worlds_diff_to_empty() {
        let view = view_with_players(&[("p1", 0.0, 0.0)]);
        let mut cursor = ClientCursor::new();

        create_diff(&view, &mut cursor, "p1", 1);
        let second = create_diff(&view, &mut cursor, "p1", 2);
        assert!(second.is_empty(), "identical view must produce no deltas");
        assert_eq!(second.tick, 2);
    }

    #[test]
    fn distant_players_are_filtered_from_view() {
        let view = view_with_players(&[("p1", 0.0, 0.0), ("far", 5_000.0, 0.0)]);
        let mut cursor = ClientCursor::new();

        let diff = create_diff(&view, &mut cursor, "p1", 1);
        assert!(diff.players.contains_key("p1"));
        assert!(!diff.players.contains_key("far"));
    }

    #[test]
    fn own_player_is_replicated_even_when_the_cursor_belongs_elsewhere() {
        // the observing client itself is far away from the origin
        let view = view_with_players(&[("p1", 9_000.0, 9_000.0)]);
        let mut cursor = ClientCursor::new();

        let diff = create_diff(&view, &mut cursor, "p1", 1);
        assert!(diff.players.contains_key("p1"));
    }

    #[test]
    fn sub_epsilon_movement_is_not_replicated() {
        let first = view_with_players(&[("p1", 10.0, 10.0)]);
        let mut cursor = ClientCursor::new();
        create_diff(&first, &mut cursor, "p1", 1);

        let mut second = empty_view();
        let mut moved = Player::new_human("p1".into(), 10.005, 10.0);
        moved.angle = 0.00005;
        second.players.insert("p1".into(), moved);
        second.phase = Phase::Playing;
        let second = Arc::new(second);

        let diff = create_diff(&second, &mut cursor, "p1", 2);
        assert!(diff.players.is_empty());
    }

    #[test]
    fn disappearing_entities_are_removed_exactly_once() {
        let mut view = empty_view();
        view.players
            .insert("p1".into(), Player::new_human("p1".into(), 0.0, 0.0));
        view.bullets.insert(
            "bullet_1".into(),
            Projectile {
                id: "bullet_1".into(),
                player_id: "p1".into(),
                x: 50.0,
                y: 0.0,
                angle: 0.0,
                speed: 18.0,
                active: true,
                weapon: Default::default(),
            },
        );
        let first = Arc::new(view);

        let mut cursor = ClientCursor::new();
        create_diff(&first, &mut cursor, "p1", 1);

        // bullet gone from the next view
        let second = view_with_players(&[("p1", 0.0, 0.0)]);
        let diff = create_diff(&second, &mut cursor, "p1", 2);
        assert_eq!(diff.removed_bullets, vec!["bullet_1".to_string()]);

        let third = view_with_players(&[("p1", 0.0, 0.0)]);
        let diff = create_diff(&third, &mut cursor, "p1", 3);
        assert!(diff.removed_bullets.is_empty());
    }

    #[test]
    fn removals_outside_the_area_of_interest_are_suppressed() {
        let mut view = empty_view();
        view.players
            .insert("p1".into(), Player::new_human("p1".into(), 0.0, 0.0));
        view.bullets.insert(
            "bullet_far".into(),
            Projectile {
                id: "bullet_far".into(),
                player_id: "x".into(),
                x: 6_000.0,
                y: 0.0,
                angle: 0.0,
                speed: 18.0,
                active: true,
                weapon: Default::default(),
            },
        );
        let first = Arc::new(view);

        let mut cursor = ClientCursor::new();
        create_diff(&first, &mut cursor, "p1", 1);

        let second = view_with_players(&[("p1", 0.0, 0.0)]);
        let diff = create_diff(&second, &mut cursor, "p1", 2);
        assert!(diff.removed_bullets.is_empty());
    }

    #[test]
    fn scalar_changes_replicate_once() {
        let first = view_with_players(&[("p1", 0.0, 0.0)]);
        let mut cursor = ClientCursor::new();
        create_diff(&first, &mut cursor, "p1", 1);

        let mut shrunk = empty_view();
        shrunk
            .players
            .insert("p1".into(), Player::new_human("p1".into(), 0.0, 0.0));
        shrunk.zone_radius = 3195.0;
        shrunk.game_time = 100;
        let shrunk = Arc::new(shrunk);

        let diff = create_diff(&shrunk, &mut cursor, "p1", 2);
        assert_eq!(diff.zone_radius, Some(3195.0));
        assert_eq!(diff.game_time, Some(100));
        assert_eq!(diff.zone_center, None);
        assert_eq!(diff.phase, None);

        let diff = create_diff(&shrunk, &mut cursor, "p1", 3);
        assert_eq!(diff.zone_radius, None);
        assert_eq!(diff.game_time, None);
    }
}
