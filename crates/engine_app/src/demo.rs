//! Demo component data and the systems that update it.
//!
//! Each component type gets one system. Systems run concurrently, so every
//! column sits behind its own lock, and a system that touches two columns
//! always locks them in the same order (velocity before position).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use engine_component::{Atom, Component};
use engine_system::{SchedulerError, SystemScheduler};

/// Downward acceleration applied to every velocity, in units per second².
pub const GRAVITY: f32 = -9.81;

/// Health regained per second.
pub const REGEN_PER_SECOND: f32 = 5.0;

/// Entity position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Component for Position {
    fn type_name() -> &'static str {
        "Position"
    }
}

/// Entity velocity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

impl Component for Velocity {
    fn type_name() -> &'static str {
        "Velocity"
    }
}

/// Entity health.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Component for Health {
    fn type_name() -> &'static str {
        "Health"
    }
}

/// Column storage for the demo entities.
#[derive(Debug)]
pub struct DemoWorld {
    pub positions: Mutex<Vec<Position>>,
    pub velocities: Mutex<Vec<Velocity>>,
    pub health: Mutex<Vec<Health>>,
}

impl DemoWorld {
    /// Spawn `count` entities with spread-out starting state.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            positions: Mutex::new(
                (0..count)
                    .map(|i| Position {
                        x: i as f32,
                        y: 100.0,
                    })
                    .collect(),
            ),
            velocities: Mutex::new(vec![Velocity { x: 1.0, y: 0.0 }; count]),
            health: Mutex::new(vec![
                Health {
                    current: 50.0,
                    max: 100.0,
                };
                count
            ]),
        }
    }

    /// Number of entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        lock(&self.positions).len()
    }
}

fn lock<T>(column: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    column.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Register one system per demo component.
///
/// # Errors
///
/// Returns [`SchedulerError`] if the scheduler no longer accepts registrations.
pub fn register_systems(
    scheduler: &mut SystemScheduler,
    world: &Arc<DemoWorld>,
) -> Result<Vec<Atom>, SchedulerError> {
    let mut ids = Vec::with_capacity(3);

    let w = Arc::clone(world);
    ids.push(scheduler.register_for_component::<Velocity>(move |dt| {
        apply_gravity(&mut lock(&w.velocities), dt);
    })?);

    let w = Arc::clone(world);
    ids.push(scheduler.register_for_component::<Position>(move |dt| {
        let velocities = lock(&w.velocities);
        integrate(&mut lock(&w.positions), &velocities, dt);
    })?);

    let w = Arc::clone(world);
    ids.push(scheduler.register_for_component::<Health>(move |dt| {
        regenerate(&mut lock(&w.health), dt);
    })?);

    Ok(ids)
}

fn apply_gravity(velocities: &mut [Velocity], dt: Duration) {
    let dv = GRAVITY * dt.as_secs_f32();
    for velocity in velocities {
        velocity.y += dv;
    }
}

fn integrate(positions: &mut [Position], velocities: &[Velocity], dt: Duration) {
    let dt = dt.as_secs_f32();
    for (position, velocity) in positions.iter_mut().zip(velocities) {
        position.x += velocity.x * dt;
        position.y += velocity.y * dt;
    }
}

fn regenerate(health: &mut [Health], dt: Duration) {
    let amount = REGEN_PER_SECOND * dt.as_secs_f32();
    for h in health {
        h.current = (h.current + amount).min(h.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrate() {
        let mut positions = vec![Position { x: 0.0, y: 0.0 }];
        let velocities = vec![Velocity { x: 2.0, y: -1.0 }];
        integrate(&mut positions, &velocities, Duration::from_millis(500));
        assert_eq!(positions[0], Position { x: 1.0, y: -0.5 });
    }

    #[test]
    fn test_regenerate_clamps_to_max() {
        let mut health = vec![Health {
            current: 99.0,
            max: 100.0,
        }];
        regenerate(&mut health, Duration::from_secs(1));
        assert_eq!(health[0].current, 100.0);
    }

    #[test]
    fn test_systems_run_through_scheduler() {
        let world = Arc::new(DemoWorld::new(4));
        let mut scheduler = SystemScheduler::new(3).unwrap();
        let ids = register_systems(&mut scheduler, &world).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], Velocity::component_type_id());

        scheduler.spin().unwrap();
        scheduler.execute_iteration(Duration::from_secs(1)).unwrap();
        assert_eq!(world.entity_count(), 4);

        let health = lock(&world.health);
        assert!(health.iter().all(|h| h.current == 55.0));
        let velocities = lock(&world.velocities);
        assert!(velocities.iter().all(|v| (v.y - GRAVITY).abs() < 1e-4));
        // Whether position saw the updated velocity depends on scheduling;
        // either way x advanced by exactly one unit.
        let positions = lock(&world.positions);
        assert_eq!(positions[0].x, 1.0);
    }
}
