//! WebSocket message types
//!
//! Everything on the wire is JSON with a `type` tag and camelCase fields.
//! State diffs omit empty collections and unchanged scalars entirely, so a
//! quiet tick serializes to little more than the tick number.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::game::state::{
    AmmoPickup, HealthPickup, Phase, Player, Projectile, WeaponPickup, WorldChunk,
};

/// Messages from the client. Unknown `type` values fail to parse and are
/// logged and dropped by the connection handler.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    #[serde(rename_all = "camelCase")]
    Input {
        #[serde(default)]
        move_x: f64,
        #[serde(default)]
        move_y: f64,
        #[serde(default)]
        angle: f64,
        #[serde(default)]
        shoot: bool,
        #[serde(default)]
        client_x: f64,
        #[serde(default)]
        client_y: f64,
    },
    Ping {
        time: u64,
    },
    Respawn,
}

/// Messages to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    #[serde(rename_all = "camelCase")]
    Init {
        player_id: String,
        session_id: String,
        state: Box<StateDiff>,
    },
    StateDiff(Box<StateDiff>),
    WorldChunks {
        chunks: Vec<WorldChunk>,
    },
    Pong {
        time: u64,
    },
}

/// Incremental world update scoped to one client's area of interest.
/// Entity maps carry the full current entity value for anything that changed
/// since the client's last diff; removal lists name entities that left the
/// world or the client's view.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDiff {
    pub tick: u64,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub players: HashMap<String, Player>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub bullets: HashMap<String, Projectile>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub ammo_pickups: HashMap<String, AmmoPickup>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub weapon_pickups: HashMap<String, WeaponPickup>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub health_pickups: HashMap<String, HealthPickup>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_players: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_bullets: Vec<String>,
    // Pickup removal lists keep the client's short field names.
    #[serde(rename = "removedAmmo", skip_serializing_if = "Vec::is_empty")]
    pub removed_ammo_pickups: Vec<String>,
    #[serde(rename = "removedWeapons", skip_serializing_if = "Vec::is_empty")]
    pub removed_weapon_pickups: Vec<String>,
    #[serde(rename = "removedHealth", skip_serializing_if = "Vec::is_empty")]
    pub removed_health_pickups: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_center: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
}

impl StateDiff {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    /// True when the diff carries nothing beyond the tick number.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
            && self.bullets.is_empty()
            && self.ammo_pickups.is_empty()
            && self.weapon_pickups.is_empty()
            && self.health_pickups.is_empty()
            && self.removed_players.is_empty()
            && self.removed_bullets.is_empty()
            && self.removed_ammo_pickups.is_empty()
            && self.removed_weapon_pickups.is_empty()
            && self.removed_health_pickups.is_empty()
            && self.zone_center.is_none()
            && self.zone_radius.is_none()
            && self.game_time.is_none()
            && self.phase.is_none()
            && self.winner.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Player;

    #[test]
    fn input_messages_parse_with_missing_fields_defaulted() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"input","moveX":1.0,"shoot":true}"#).unwrap();
        match msg {
            ClientMsg::Input {
                move_x,
                move_y,
                shoot,
                client_x,
                ..
            } => {
                assert_eq!(move_x, 1.0);
                assert_eq!(move_y, 0.0);
                assert!(shoot);
                assert_eq!(client_x, 0.0);
            }
            _ => panic!("expected input"),
        }
    }

    #[test]
    fn ping_and_respawn_parse() {
        assert!(matches!(
            serde_json::from_str(r#"{"type":"ping","time":123}"#).unwrap(),
            ClientMsg::Ping { time: 123 }
        ));
        assert!(matches!(
            serde_json::from_str(r#"{"type":"respawn"}"#).unwrap(),
            ClientMsg::Respawn
        ));
    }

    #[test]
    fn unknown_message_types_fail_to_parse() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"cheat"}"#).is_err());
    }

    #[test]
    fn empty_diffs_serialize_to_just_the_tick() {
        let json = serde_json::to_string(&ServerMsg::StateDiff(Box::new(StateDiff::new(42))))
            .unwrap();
        assert_eq!(json, r#"{"type":"stateDiff","tick":42}"#);
    }

    #[test]
    fn diff_fields_use_camel_case_on_the_wire() {
        let mut diff = StateDiff::new(1);
        diff.zone_radius = Some(3195.0);
        diff.removed_bullets.push("bullet_9".into());
        diff.removed_ammo_pickups.push("ammo_3".into());
        diff.removed_weapon_pickups.push("weapon_4".into());
        diff.removed_health_pickups.push("health_5".into());
        let mut p = Player::new_human("p1".into(), 1.5, 2.5);
        p.last_shot = 999;
        diff.players.insert("p1".into(), p);

        let json = serde_json::to_string(&ServerMsg::StateDiff(Box::new(diff))).unwrap();
        assert!(json.contains(r#""zoneRadius":3195.0"#));
        assert!(json.contains(r#""removedBullets":["bullet_9"]"#));
        // pickup removals use the client's short names
        assert!(json.contains(r#""removedAmmo":["ammo_3"]"#));
        assert!(json.contains(r#""removedWeapons":["weapon_4"]"#));
        assert!(json.contains(r#""removedHealth":["health_5"]"#));
        assert!(!json.contains("removedAmmoPickups"));
        assert!(json.contains(r#""ammo":100"#));
        // server-internal field never leaves the process
        assert!(!json.contains("last_shot") && !json.contains("lastShot"));
        // empty maps are omitted
        assert!(!json.contains("weaponPickups"));
    }

    #[test]
    fn init_wraps_a_full_state_without_double_tagging() {
        let msg = ServerMsg::Init {
            player_id: "p1".into(),
            session_id: "session_1".into(),
            state: Box::new(StateDiff::new(0)),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.starts_with(r#"{"type":"init""#));
        assert!(json.contains(r#""state":{"tick":0}"#));
    }
}
