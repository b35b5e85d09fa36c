/// Advances particle state by one time step, in place.
///
/// `positions` and `velocities` always have the same length.
pub trait Integrator {
    fn integrate(&self, dt: f32, positions: &mut [[f32; 2]], velocities: &mut [[f32; 2]]);
}

/// Integration scheme used by [`CentralForce`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum Scheme {
    /// Semi-implicit Euler: velocity first, then position with the new velocity.
    #[default]
    Euler,
    /// Second-order midpoint (RK2).
    Midpoint,
}

/// Point-mass attraction toward the origin.
///
/// Acceleration is `-k * p / (|p|² + ε²)^(3/2)`. The softening term keeps a
/// particle sitting exactly at the origin finite.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CentralForce {
    /// `G * M` of the central body.
    pub strength: f32,
    pub softening: f32,
    pub scheme: Scheme,
}

impl CentralForce {
    pub const DEFAULT_STRENGTH: f32 = 1e-4;
    pub const DEFAULT_SOFTENING: f32 = 1e-2;

    #[inline]
    fn acceleration(&self, [x, y]: [f32; 2]) -> [f32; 2] {
        let r2 = x * x + y * y + self.softening * self.softening;
        let inv = self.strength / (r2 * r2.sqrt());
        [-x * inv, -y * inv]
    }
}

impl Default for CentralForce {
    fn default() -> Self {
        Self {
            strength: Self::DEFAULT_STRENGTH,
            softening: Self::DEFAULT_SOFTENING,
            scheme: Scheme::Euler,
        }
    }
}

impl Integrator for CentralForce {
    fn integrate(&self, dt: f32, positions: &mut [[f32; 2]], velocities: &mut [[f32; 2]]) {
        for (p, v) in positions.iter_mut().zip(velocities.iter_mut()) {
            match self.scheme {
                Scheme::Euler => {
                    let a = self.acceleration(*p);
                    v[0] += a[0] * dt;
                    v[1] += a[1] * dt;
                    p[0] += v[0] * dt;
                    p[1] += v[1] * dt;
                }
                Scheme::Midpoint => {
                    let h = dt * 0.5;
                    let a0 = self.acceleration(*p);
                    let mid_p = [p[0] + v[0] * h, p[1] + v[1] * h];
                    let mid_v = [v[0] + a0[0] * h, v[1] + a0[1] * h];
                    let a1 = self.acceleration(mid_p);
                    p[0] += mid_v[0] * dt;
                    p[1] += mid_v[1] * dt;
                    v[0] += a1[0] * dt;
                    v[1] += a1[1] * dt;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particles_accelerate_toward_origin() {
        let force = CentralForce::default();
        let mut p = [[0.5, 0.0], [0.0, -0.25]];
        let mut v = [[0.0, 0.0]; 2];
        force.integrate(1.0 / 60.0, &mut p, &mut v);

        assert!(v[0][0] < 0.0 && v[0][1] == 0.0);
        assert!(v[1][1] > 0.0 && v[1][0] == 0.0);
        assert!(p[0][0] < 0.5);
    }

    #[test]
    fn particle_at_origin_stays_finite() {
        for scheme in [Scheme::Euler, Scheme::Midpoint] {
            let force = CentralForce {
                scheme,
                ..CentralForce::default()
            };
            let mut p = [[0.0, 0.0]];
            let mut v = [[0.0, 0.0]];
            force.integrate(1.0 / 60.0, &mut p, &mut v);
            assert_eq!(p[0], [0.0, 0.0]);
            assert_eq!(v[0], [0.0, 0.0]);
        }
    }

    #[test]
    fn schemes_agree_for_small_steps() {
        let euler = CentralForce::default();
        let midpoint = CentralForce {
            scheme: Scheme::Midpoint,
            ..CentralForce::default()
        };
        let (mut pe, mut ve) = ([[0.3, 0.4]], [[0.01, -0.02]]);
        let (mut pm, mut vm) = (pe, ve);
        euler.integrate(1e-3, &mut pe, &mut ve);
        midpoint.integrate(1e-3, &mut pm, &mut vm);

        assert!((pe[0][0] - pm[0][0]).abs() < 1e-6);
        assert!((pe[0][1] - pm[0][1]).abs() < 1e-6);
    }
}
