//! In-memory session persistence
//!
//! A session maps an opaque token to the last saved copy of a player, so a
//! client that reconnects with its token resumes where it left off instead
//! of respawning. Sessions live for the process lifetime only.

use dashmap::DashMap;
use tracing::info;

use crate::game::state::Player;

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Player>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saved player for a session token, with connection-scoped fields
    /// reset. None when the token is unknown.
    pub fn restore(&self, session_id: &str) -> Option<Player> {
        let entry = self.sessions.get(session_id)?;
        let mut player = entry.clone();
        player.last_shot = 0;
        info!(
            session_id,
            player_id = %player.id,
            x = player.x,
            y = player.y,
            ammo = player.ammo,
            "restoring session"
        );
        Some(player)
    }

    pub fn insert(&self, session_id: String, player: Player) {
        self.sessions.insert(session_id, player);
    }

    /// Update the saved copy for whichever session holds this player.
    pub fn save_player(&self, player: &Player) {
        for mut entry in self.sessions.iter_mut() {
            if entry.id == player.id {
                let saved = entry.value_mut();
                saved.x = player.x;
                saved.y = player.y;
                saved.angle = player.angle;
                saved.health = player.health;
                saved.alive = player.alive;
                saved.ammo = player.ammo;
                saved.weapon = player.weapon;
                saved.score = player.score;
                saved.kills = player.kills;
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_returns_the_saved_player_with_last_shot_reset() {
        let store = SessionStore::new();
        let mut player = Player::new_human("p1".into(), 10.0, 20.0);
        player.last_shot = 123;
        player.score = 500;
        store.insert("session_a".into(), player);

        let restored = store.restore("session_a").unwrap();
        assert_eq!(restored.id, "p1");
        assert_eq!(restored.score, 500);
        assert_eq!(restored.last_shot, 0);
        assert!(store.restore("session_b").is_none());
    }

    #[test]
    fn save_player_updates_the_matching_session() {
        let store = SessionStore::new();
        store.insert(
            "session_a".into(),
            Player::new_human("p1".into(), 0.0, 0.0),
        );

        let mut live = Player::new_human("p1".into(), 42.0, -7.0);
        live.kills = 3;
        store.save_player(&live);

        let restored = store.restore("session_a").unwrap();
        assert_eq!((restored.x, restored.y), (42.0, -7.0));
        assert_eq!(restored.kills, 3);
    }
}
