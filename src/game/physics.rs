//! Collision primitive, arena bounds and movement

use rand::Rng;

use crate::util::time::tick_delta;

use super::entity::{EntityId, Player};
use super::rules::{
    BULLET_RANGE, ENEMY_SPEED, KEYS_DOWN, KEYS_LEFT, KEYS_RIGHT, KEYS_UP, MAP_HEIGHT, MAP_WIDTH,
    PLAYER_SIZE, PLAYER_SPEED, SEPARATION_RADIUS, SEPARATION_WEIGHT, WALL_SIDE_WIDTH,
    WALL_TOP_BOT_HEIGHT,
};

/// Circular hitbox
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

impl Circle {
    /// Hitbox for an entity of the given size centered at `(x, y)`
    pub fn from_size(x: f32, y: f32, size: f32) -> Self {
        Self {
            x,
            y,
            radius: size / 2.0,
        }
    }

    pub fn overlaps(&self, other: &Circle) -> bool {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let combined = self.radius + other.radius;
        dx * dx + dy * dy < combined * combined
    }
}

/// Anything that can collide
pub trait Body {
    fn hitbox(&self) -> Circle;
}

/// Axis-aligned playable rectangle for a box of a given size (top-left anchored)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl Bounds {
    /// Map minus walls, minus the entity size on the trailing edges
    pub fn for_size(size: f32) -> Self {
        Self {
            min_x: WALL_SIDE_WIDTH,
            max_x: MAP_WIDTH - WALL_SIDE_WIDTH - size,
            min_y: WALL_TOP_BOT_HEIGHT,
            max_y: MAP_HEIGHT - WALL_TOP_BOT_HEIGHT - size,
        }
    }

    pub fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (x.clamp(self.min_x, self.max_x), y.clamp(self.min_y, self.max_y))
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Uniformly random point inside the bounds
    pub fn random_point<R: Rng>(&self, rng: &mut R) -> (f32, f32) {
        (
            rng.gen_range(self.min_x..=self.max_x),
            rng.gen_range(self.min_y..=self.max_y),
        )
    }
}

/// Map edge an enemy enters from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Top, Edge::Bottom, Edge::Left, Edge::Right];
}

/// Physics system for moving entities around the arena
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Check collision between two bodies
    pub fn check_collision(a: &impl Body, b: &impl Body) -> bool {
        a.hitbox().overlaps(&b.hitbox())
    }

    /// Apply one tick of held-key movement to a living player.
    ///
    /// Each axis is driven independently, so diagonals move faster than
    /// straight lines. Opposing keys cancel, and aim only changes while
    /// there is net movement.
    pub fn move_player(player: &mut Player) {
        let step = PLAYER_SPEED * tick_delta();
        let dx = axis(player.any_pressed(&KEYS_LEFT), player.any_pressed(&KEYS_RIGHT));
        let dy = axis(player.any_pressed(&KEYS_UP), player.any_pressed(&KEYS_DOWN));

        let (x, y) =
            Bounds::for_size(PLAYER_SIZE).clamp(player.x + dx * step, player.y + dy * step);
        player.x = x;
        player.y = y;

        if dx != 0.0 || dy != 0.0 {
            player.last_direction = dy.atan2(dx);
            player.rotation = player.last_direction;
        }
    }

    /// Whether a projectile center has left the area inside the walls
    pub fn projectile_out_of_bounds(x: f32, y: f32) -> bool {
        x < WALL_SIDE_WIDTH
            || x > MAP_WIDTH - WALL_SIDE_WIDTH
            || y < WALL_TOP_BOT_HEIGHT
            || y > MAP_HEIGHT - WALL_TOP_BOT_HEIGHT
    }

    /// Whether a projectile has flown further than its range
    pub fn projectile_expired(x: f32, y: f32, start_x: f32, start_y: f32) -> bool {
        distance((x, y), (start_x, start_y)) > BULLET_RANGE
    }

    /// Spawn point just inside the wall band on the given edge
    pub fn edge_spawn_point<R: Rng>(edge: Edge, size: f32, rng: &mut R) -> (f32, f32) {
        let bounds = Bounds::for_size(size);
        match edge {
            Edge::Top => (rng.gen_range(bounds.min_x..=bounds.max_x), bounds.min_y),
            Edge::Bottom => (rng.gen_range(bounds.min_x..=bounds.max_x), bounds.max_y),
            Edge::Left => (bounds.min_x, rng.gen_range(bounds.min_y..=bounds.max_y)),
            Edge::Right => (bounds.max_x, rng.gen_range(bounds.min_y..=bounds.max_y)),
        }
    }

    /// Per-tick displacement for an enemy chasing `target`.
    ///
    /// `neighbors` are the centers of every other enemy. Neighbors inside the
    /// separation radius push back, weighted by inverse distance; when any do,
    /// the result is 60% separation and 40% seek. Coincident neighbors are
    /// split along the x axis by id order.
    pub fn steer_enemy(
        id: EntityId,
        center: (f32, f32),
        target: (f32, f32),
        neighbors: &[(EntityId, (f32, f32))],
    ) -> (f32, f32) {
        let speed = ENEMY_SPEED * tick_delta();

        let angle = (target.1 - center.1).atan2(target.0 - center.0);
        let mut move_x = angle.cos() * speed;
        let mut move_y = angle.sin() * speed;

        let mut sep_x = 0.0_f32;
        let mut sep_y = 0.0_f32;
        let mut crowded = false;

        for &(other_id, other) in neighbors {
            if other_id == id {
                continue;
            }
            let dist_x = center.0 - other.0;
            let dist_y = center.1 - other.1;
            let dist = (dist_x * dist_x + dist_y * dist_y).sqrt();
            if dist >= SEPARATION_RADIUS {
                continue;
            }

            crowded = true;
            if dist > f32::EPSILON {
                let weight = 1.0 / dist;
                sep_x += (dist_x / dist) * weight;
                sep_y += (dist_y / dist) * weight;
            } else {
                // Stacked exactly; pick opposite directions so the pair splits
                sep_x += if id < other_id { -1.0 } else { 1.0 };
            }
        }

        if crowded {
            let sep_len = (sep_x * sep_x + sep_y * sep_y).sqrt();
            if sep_len > 0.0 {
                sep_x = sep_x / sep_len * speed;
                sep_y = sep_y / sep_len * speed;
            }
            move_x = move_x * (1.0 - SEPARATION_WEIGHT) + sep_x * SEPARATION_WEIGHT;
            move_y = move_y * (1.0 - SEPARATION_WEIGHT) + sep_y * SEPARATION_WEIGHT;
        }

        (move_x, move_y)
    }
}

/// Euclidean distance between two points
pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}

/// Net direction on one axis: -1, 0 or 1
fn axis(negative: bool, positive: bool) -> f32 {
    f32::from(u8::from(positive)) - f32::from(u8::from(negative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn player_with_keys(keys: &[&str]) -> Player {
        let mut player = Player::new(Uuid::new_v4(), "mover".to_string(), 0, 400.0, 400.0);
        for key in keys {
            player.keys.insert(key.to_string(), true);
        }
        player
    }

    #[test]
    fn test_circle_overlap_is_strict() {
        let a = Circle::from_size(0.0, 0.0, 10.0);
        let touching = Circle::from_size(10.0, 0.0, 10.0);
        let overlapping = Circle::from_size(9.0, 0.0, 10.0);
        assert!(!a.overlaps(&touching));
        assert!(a.overlaps(&overlapping));
    }

    #[test]
    fn test_diagonal_is_not_normalized() {
        let mut straight = player_with_keys(&["KeyD"]);
        let mut diagonal = player_with_keys(&["KeyD", "KeyS"]);
        PhysicsSystem::move_player(&mut straight);
        PhysicsSystem::move_player(&mut diagonal);

        let straight_step = distance((400.0, 400.0), (straight.x, straight.y));
        let diagonal_step = distance((400.0, 400.0), (diagonal.x, diagonal.y));
        assert!(diagonal_step > straight_step * 1.4);
        assert!((diagonal.last_direction - std::f32::consts::FRAC_PI_4).abs() < 1e-5);
    }

    #[test]
    fn test_aim_kept_when_idle_or_cancelled() {
        let mut player = player_with_keys(&["KeyW"]);
        PhysicsSystem::move_player(&mut player);
        let aim = player.last_direction;
        assert!((aim + std::f32::consts::FRAC_PI_2).abs() < 1e-5);

        player.keys.clear();
        PhysicsSystem::move_player(&mut player);
        assert_eq!(player.last_direction, aim);

        // Up and down together go nowhere and leave the aim alone
        player.keys.insert("KeyW".to_string(), true);
        player.keys.insert("KeyS".to_string(), true);
        let before = (player.x, player.y);
        PhysicsSystem::move_player(&mut player);
        assert_eq!((player.x, player.y), before);
        assert_eq!(player.last_direction, aim);

        // A cancelled axis does not bend the other one
        player.keys.insert("KeyD".to_string(), true);
        PhysicsSystem::move_player(&mut player);
        assert_eq!(player.y, before.1);
        assert!(player.x > before.0);
        assert!(player.last_direction.abs() < 1e-5);
    }

    #[test]
    fn test_movement_clamped_to_walls() {
        let mut player = player_with_keys(&["ArrowLeft", "ArrowUp"]);
        player.x = WALL_SIDE_WIDTH + 1.0;
        player.y = WALL_TOP_BOT_HEIGHT + 1.0;
        PhysicsSystem::move_player(&mut player);
        assert_eq!((player.x, player.y), (WALL_SIDE_WIDTH, WALL_TOP_BOT_HEIGHT));

        let bounds = Bounds::for_size(PLAYER_SIZE);
        let mut player = player_with_keys(&["ArrowRight", "ArrowDown"]);
        player.x = bounds.max_x;
        player.y = bounds.max_y;
        PhysicsSystem::move_player(&mut player);
        assert_eq!((player.x, player.y), (bounds.max_x, bounds.max_y));
    }

    #[test]
    fn test_projectile_bounds_and_range() {
        assert!(PhysicsSystem::projectile_out_of_bounds(WALL_SIDE_WIDTH - 1.0, 300.0));
        assert!(!PhysicsSystem::projectile_out_of_bounds(300.0, 300.0));
        assert!(PhysicsSystem::projectile_expired(100.0 + BULLET_RANGE + 1.0, 100.0, 100.0, 100.0));
        assert!(!PhysicsSystem::projectile_expired(100.0 + BULLET_RANGE, 100.0, 100.0, 100.0));
    }

    #[test]
    fn test_edge_spawns_stay_out_of_walls() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let size = 64.0;
        let bounds = Bounds::for_size(size);
        for _ in 0..50 {
            for edge in Edge::ALL {
                let (x, y) = PhysicsSystem::edge_spawn_point(edge, size, &mut rng);
                assert!(bounds.contains(x, y), "{edge:?} spawn ({x}, {y}) outside bounds");
            }
        }
    }

    #[test]
    fn test_steer_without_neighbors_is_pure_seek() {
        let (dx, dy) = PhysicsSystem::steer_enemy(EntityId(1), (100.0, 100.0), (200.0, 100.0), &[]);
        assert!((dx - ENEMY_SPEED * tick_delta()).abs() < 1e-5);
        assert!(dy.abs() < 1e-5);
    }

    #[test]
    fn test_steer_splits_coincident_enemies() {
        let here = (500.0, 500.0);
        let target = (500.0, 100.0);
        let neighbors = [(EntityId(1), here), (EntityId(2), here)];

        let (ax, _) = PhysicsSystem::steer_enemy(EntityId(1), here, target, &neighbors);
        let (bx, _) = PhysicsSystem::steer_enemy(EntityId(2), here, target, &neighbors);
        assert!(ax < 0.0);
        assert!(bx > 0.0);
    }
}
