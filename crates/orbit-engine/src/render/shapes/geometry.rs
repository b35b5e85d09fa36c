use std::f32::consts::TAU;

use crate::device::Topology;

/// Outline of a shape in its local space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ShapeKind {
    /// Axis-aligned rectangle centered on the origin.
    Quad { width: f32, height: f32 },
    /// Unit circle approximated by `resolution` segments (at least 3).
    Circle { resolution: u32 },
}

/// Vertices and topology of `kind`, filled or outlined.
///
/// Fans and loops are expanded: quad fills use a triangle strip, circle fills
/// a triangle list around the center, and outlines a strip closed on its first
/// vertex.
pub(crate) fn build(kind: ShapeKind, fill: bool) -> (Topology, Vec<[f32; 2]>) {
    match kind {
        ShapeKind::Quad { width, height } => {
            let (hw, hh) = (width * 0.5, height * 0.5);
            if fill {
                (
                    Topology::TriangleStrip,
                    vec![[-hw, -hh], [hw, -hh], [-hw, hh], [hw, hh]],
                )
            } else {
                (
                    Topology::LineStrip,
                    vec![[-hw, -hh], [hw, -hh], [hw, hh], [-hw, hh], [-hw, -hh]],
                )
            }
        }
        ShapeKind::Circle { resolution } => {
            let n = resolution.max(3);
            let rim: Vec<[f32; 2]> = (0..=n)
                .map(|i| {
                    let theta = TAU * (i % n) as f32 / n as f32;
                    [theta.cos(), theta.sin()]
                })
                .collect();

            if fill {
                let tris = rim
                    .windows(2)
                    .flat_map(|w| [[0.0, 0.0], w[0], w[1]])
                    .collect();
                (Topology::Triangles, tris)
            } else {
                (Topology::LineStrip, rim)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_outline_is_closed() {
        let (topology, v) = build(
            ShapeKind::Quad {
                width: 2.0,
                height: 1.0,
            },
            false,
        );
        assert_eq!(topology, Topology::LineStrip);
        assert_eq!(v.len(), 5);
        assert_eq!(v.first(), v.last());
        assert_eq!(v[2], [1.0, 0.5]);
    }

    #[test]
    fn circle_fill_expands_fan() {
        let (topology, v) = build(ShapeKind::Circle { resolution: 64 }, true);
        assert_eq!(topology, Topology::Triangles);
        assert_eq!(v.len(), 64 * 3);
        assert!(v.iter().step_by(3).all(|p| *p == [0.0, 0.0]));
        assert!(
            v.iter()
                .all(|[x, y]| (x * x + y * y).sqrt() <= 1.0 + 1e-6)
        );
    }

    #[test]
    fn degenerate_resolution_is_raised_to_triangle() {
        let (_, v) = build(ShapeKind::Circle { resolution: 1 }, false);
        assert_eq!(v.len(), 4);
        assert_eq!(v[0], v[3]);
    }
}
