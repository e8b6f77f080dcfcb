//! Weapon profiles and the combat resolver
//!
//! A closed set of weapon variants dispatched by identifier; unknown
//! identifiers resolve to the pistol. Firing turns one trigger pull into one
//! or more projectiles per the weapon's pellet profile.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::util::math::{round_angle, round_coord};

use super::state::{Player, Projectile, World};

/// Every projectile travels at the same speed (world units per tick)
pub const PROJECTILE_SPEED: f64 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeaponKind {
    Pistol,
    Rifle,
    Machinegun,
    Shotgun,
}

impl Default for WeaponKind {
    fn default() -> Self {
        Self::Pistol
    }
}

pub const ALL_WEAPONS: [WeaponKind; 4] = [
    WeaponKind::Pistol,
    WeaponKind::Rifle,
    WeaponKind::Machinegun,
    WeaponKind::Shotgun,
];

impl WeaponKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pistol => "pistol",
            Self::Rifle => "rifle",
            Self::Machinegun => "machinegun",
            Self::Shotgun => "shotgun",
        }
    }

    /// Lookup by identifier; unknown names fall back to the pistol.
    pub fn from_name(name: &str) -> Self {
        match name {
            "rifle" => Self::Rifle,
            "machinegun" => Self::Machinegun,
            "shotgun" => Self::Shotgun,
            _ => Self::Pistol,
        }
    }

    /// Milliseconds between trigger pulls
    pub fn cooldown_ms(&self) -> u64 {
        match self {
            Self::Pistol => 500,
            Self::Rifle => 450,
            Self::Machinegun => 100,
            Self::Shotgun => 800,
        }
    }

    /// Ammo granted when this weapon is picked up
    pub fn initial_ammo(&self) -> i32 {
        match self {
            Self::Pistol => 30,
            Self::Rifle => 20,
            Self::Machinegun => 50,
            Self::Shotgun => 15,
        }
    }

    /// Pellet headings for one trigger pull, centered on the facing angle.
    /// The shotgun spreads its pellets evenly across 0.3 rad; the rifle
    /// fires a pair offset 0.15 rad to each side.
    pub fn pellet_angles(&self, angle: f64) -> Vec<f64> {
        match self {
            Self::Pistol | Self::Machinegun => vec![angle],
            Self::Rifle => vec![angle - 0.15, angle + 0.15],
            Self::Shotgun => {
                const PELLETS: usize = 5;
                const SPREAD: f64 = 0.3;
                (0..PELLETS)
                    .map(|i| angle - SPREAD / 2.0 + SPREAD * i as f64 / (PELLETS - 1) as f64)
                    .collect()
            }
        }
    }
}

impl World {
    /// Resolve a shoot intent for the named player. A no-op (empty result,
    /// no state change) when the player is missing, dead, out of ammo, or
    /// still inside the weapon's cooldown window.
    pub fn fire(&mut self, player_id: &str, now_ms: u64) -> Vec<String> {
        let player = match self.players.get_mut(player_id) {
            Some(p) if p.alive => p,
            _ => return Vec::new(),
        };

        if player.ammo <= 0 {
            return Vec::new();
        }

        let weapon = player.weapon;
        if now_ms.saturating_sub(player.last_shot) < weapon.cooldown_ms() {
            return Vec::new();
        }

        player.last_shot = now_ms;
        player.ammo -= 1;

        let shooter = player.clone();
        let pellets = spawn_pellets(&shooter, |_| self.next_projectile_id());

        debug!(
            player_id = %shooter.id,
            weapon = weapon.name(),
            pellets = pellets.len(),
            ammo = shooter.ammo,
            "projectiles created"
        );

        let ids: Vec<String> = pellets.iter().map(|b| b.id.clone()).collect();
        for pellet in pellets {
            self.projectiles.insert(pellet.id.clone(), pellet);
        }
        ids
    }
}

/// Build the projectiles for one trigger pull. All pellets spawn at the
/// shooter's rounded position with the shooter's facing angle plus the
/// weapon's spread offsets.
fn spawn_pellets(shooter: &Player, mut next_id: impl FnMut(usize) -> String) -> Vec<Projectile> {
    shooter
        .weapon
        .pellet_angles(shooter.angle)
        .into_iter()
        .enumerate()
        .map(|(i, angle)| Projectile {
            id: next_id(i),
            player_id: shooter.id.clone(),
            x: round_coord(shooter.x),
            y: round_coord(shooter.y),
            angle: round_angle(angle),
            speed: PROJECTILE_SPEED,
            active: true,
            weapon: shooter.weapon,
        })
        .collect()
}
