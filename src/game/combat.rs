//! Combat system - firing, projectiles, damage, drops and pickups

use rand::Rng;

use crate::util::time::tick_delta;

use super::entity::{ItemKind, Player, Projectile};
use super::physics::PhysicsSystem;
use super::rules::{
    BULLET_SPEED, ENEMY_CONTACT_DAMAGE, ENEMY_DAMAGE_COOLDOWN_MS, FIRE_COOLDOWN_MS,
    FLASK_DROP_RATE, HEART_DROP_RATE, KEY_FIRE, MAX_LIVES,
};

/// What a contact damage tick did to a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Still inside the per-player damage cooldown
    Ignored,
    /// Took damage and survived
    Hurt,
    /// Lost a life and must be respawned
    LifeLost,
    /// Lost the last life
    Eliminated,
}

/// Combat system for managing weapons and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Check whether a player fires this tick, updating the fire latch.
    ///
    /// Fires only on the rising edge of the fire key and only once the
    /// cooldown since the previous shot has passed.
    pub fn try_fire(player: &mut Player, now: u64) -> bool {
        if !player.is_pressed(KEY_FIRE) {
            player.fire_held = false;
            return false;
        }
        if player.fire_held {
            return false;
        }
        let cooled = player
            .last_fired
            .map_or(true, |t| now.saturating_sub(t) > FIRE_COOLDOWN_MS);
        if !cooled {
            return false;
        }

        player.fire_held = true;
        player.last_fired = Some(now);
        true
    }

    /// Velocity of a bullet fired along `direction` (radians)
    pub fn bullet_velocity(direction: f32) -> (f32, f32) {
        let speed = BULLET_SPEED * tick_delta();
        (direction.cos() * speed, direction.sin() * speed)
    }

    /// Advance a projectile, returns false if it left the arena or its range
    pub fn update_projectile(projectile: &mut Projectile) -> bool {
        projectile.x += projectile.vel_x;
        projectile.y += projectile.vel_y;

        !PhysicsSystem::projectile_out_of_bounds(projectile.x, projectile.y)
            && !PhysicsSystem::projectile_expired(
                projectile.x,
                projectile.y,
                projectile.start_x,
                projectile.start_y,
            )
    }

    /// Apply enemy contact damage, honoring the per-player cooldown
    pub fn apply_contact_damage(player: &mut Player, now: u64) -> DamageOutcome {
        if player.is_dead {
            return DamageOutcome::Ignored;
        }
        if let Some(last) = player.last_damage {
            if now.saturating_sub(last) <= ENEMY_DAMAGE_COOLDOWN_MS {
                return DamageOutcome::Ignored;
            }
        }

        player.last_damage = Some(now);
        player.hp = (player.hp - ENEMY_CONTACT_DAMAGE).max(0);
        if player.hp > 0 {
            return DamageOutcome::Hurt;
        }

        player.lives = player.lives.saturating_sub(1);
        if player.lives > 0 {
            player.hp = player.max_hp;
            DamageOutcome::LifeLost
        } else {
            player.hp = 0;
            player.is_dead = true;
            DamageOutcome::Eliminated
        }
    }

    /// Roll the loot table for a killed enemy.
    ///
    /// The heart roll happens first; the flask is only rolled when it misses.
    pub fn roll_drop<R: Rng>(rng: &mut R) -> Option<ItemKind> {
        if rng.gen_bool(HEART_DROP_RATE) {
            Some(ItemKind::Heart)
        } else if rng.gen_bool(FLASK_DROP_RATE) {
            Some(ItemKind::HpFlask)
        } else {
            None
        }
    }

    /// Consume an item if it does the player any good
    pub fn try_pickup(player: &mut Player, kind: ItemKind) -> bool {
        match kind {
            ItemKind::HpFlask if player.hp < player.max_hp => {
                player.hp = player.max_hp;
                true
            }
            ItemKind::Heart if player.lives < MAX_LIVES => {
                player.lives += 1;
                true
            }
            _ => false,
        }
    }
}
