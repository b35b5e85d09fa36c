use crate::error::{Error, Result};

use super::integrator::{CentralForce, Integrator};

/// Fixed-capacity set of point particles.
///
/// Positions and velocities live in two parallel arrays so each can be uploaded
/// to its own vertex sub-range without repacking. The live count never exceeds
/// the capacity; [`ParticlePool::reallocate`] is the only way to grow it.
pub struct ParticlePool {
    positions: Vec<[f32; 2]>,
    velocities: Vec<[f32; 2]>,
    capacity: usize,
    integrator: Box<dyn Integrator>,
}

/// Borrowed view of the live particles.
#[derive(Debug, Copy, Clone)]
pub struct Snapshot<'a> {
    pub positions: &'a [[f32; 2]],
    pub velocities: &'a [[f32; 2]],
}

impl Snapshot<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl ParticlePool {
    /// Creates an empty pool with room for `capacity` particles, integrated by
    /// a [`CentralForce`].
    pub fn initialize(capacity: usize) -> Result<Self> {
        Self::with_integrator(capacity, Box::new(CentralForce::default()))
    }

    pub fn with_integrator(capacity: usize, integrator: Box<dyn Integrator>) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Allocation("particle pool capacity is zero".into()));
        }
        let mut pool = Self {
            positions: Vec::new(),
            velocities: Vec::new(),
            capacity: 0,
            integrator,
        };
        pool.reserve(capacity)?;
        Ok(pool)
    }

    fn reserve(&mut self, capacity: usize) -> Result<()> {
        let extra = capacity.saturating_sub(self.positions.len());
        self.positions
            .try_reserve_exact(extra)
            .and_then(|()| self.velocities.try_reserve_exact(extra))
            .map_err(|e| Error::Allocation(format!("{capacity} particles: {e}")))?;
        self.capacity = capacity;
        Ok(())
    }

    /// Grows storage to `capacity` particles. Never shrinks below the live count.
    pub fn reallocate(&mut self, capacity: usize) -> Result<()> {
        let capacity = capacity.max(self.positions.len());
        if capacity <= self.capacity {
            return Ok(());
        }
        log::debug!("particle pool: capacity {} -> {capacity}", self.capacity);
        self.reserve(capacity)
    }

    /// Replaces the contents with an `n`×`n` grid covering `[-0.5, 0.5)²`, at rest.
    pub fn seed(&mut self, grid_size: usize) -> Result<()> {
        let count = grid_size
            .checked_mul(grid_size)
            .ok_or_else(|| Error::Allocation(format!("grid of {grid_size}² particles")))?;
        if count > self.capacity {
            self.reallocate(count)?;
        }

        self.positions.clear();
        self.velocities.clear();
        let n = grid_size as f32;
        for i in 0..count {
            let x = (i % grid_size) as f32 / n - 0.5;
            let y = (i / grid_size) as f32 / n - 0.5;
            self.positions.push([x, y]);
            self.velocities.push([0.0, 0.0]);
        }
        Ok(())
    }

    /// Advances every live particle by `dt` seconds.
    ///
    /// Non-positive or non-finite steps leave the state untouched.
    pub fn step(&mut self, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        self.integrator
            .integrate(dt, &mut self.positions, &mut self.velocities);
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            positions: &self.positions,
            velocities: &self.velocities,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for ParticlePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticlePool")
            .field("len", &self.positions.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_an_allocation_error() {
        assert!(matches!(ParticlePool::initialize(0), Err(Error::Allocation(_))));
    }

    #[test]
    fn seed_lays_out_uniform_grid_at_rest() {
        let mut pool = ParticlePool::initialize(16).unwrap();
        pool.seed(4).unwrap();

        let snap = pool.snapshot();
        assert_eq!(snap.len(), 16);
        assert_eq!(snap.positions[0], [-0.5, -0.5]);
        assert_eq!(snap.positions[1], [-0.25, -0.5]);
        assert_eq!(snap.positions[4], [-0.5, -0.25]);
        assert_eq!(snap.positions[15], [0.25, 0.25]);
        assert!(snap.velocities.iter().all(|v| *v == [0.0, 0.0]));
        assert!(
            snap.positions
                .iter()
                .all(|p| (-0.5..0.5).contains(&p[0]) && (-0.5..0.5).contains(&p[1]))
        );
    }

    #[test]
    fn seed_beyond_capacity_reallocates() {
        let mut pool = ParticlePool::initialize(10).unwrap();
        pool.seed(32).unwrap();
        assert_eq!(pool.len(), 1024);
        assert!(pool.capacity() >= 1024);
    }

    #[test]
    fn seed_zero_empties_the_pool() {
        let mut pool = ParticlePool::initialize(4).unwrap();
        pool.seed(2).unwrap();
        pool.seed(0).unwrap();
        assert!(pool.is_empty());
        pool.step(1.0 / 60.0);
        assert!(pool.snapshot().is_empty());
    }

    #[test]
    fn step_zero_is_identity() {
        let mut pool = ParticlePool::initialize(64).unwrap();
        pool.seed(8).unwrap();
        pool.step(1.0 / 60.0);
        let before: Vec<_> = pool.snapshot().positions.to_vec();
        let vel_before: Vec<_> = pool.snapshot().velocities.to_vec();

        pool.step(0.0);
        pool.step(-1.0);
        pool.step(f32::NAN);

        assert_eq!(pool.snapshot().positions, before.as_slice());
        assert_eq!(pool.snapshot().velocities, vel_before.as_slice());
    }

    #[test]
    fn full_grid_stays_finite_over_ten_steps() {
        let mut pool = ParticlePool::initialize(1000).unwrap();
        pool.seed(32).unwrap();
        for _ in 0..10 {
            pool.step(1.0 / 60.0);
        }
        let snap = pool.snapshot();
        assert_eq!(snap.len(), 1024);
        assert!(
            snap.positions
                .iter()
                .chain(snap.velocities)
                .all(|p| p[0].is_finite() && p[1].is_finite())
        );
    }

    #[test]
    fn reallocate_never_shrinks_below_live_count() {
        let mut pool = ParticlePool::initialize(16).unwrap();
        pool.seed(4).unwrap();
        pool.reallocate(2).unwrap();
        assert_eq!(pool.capacity(), 16);
        assert_eq!(pool.len(), 16);
    }
}
