use serde::{Deserialize, Serialize};

/// Integer 2D grid transform `(i', j') = (a*i + b*j, c*i + d*j)`.
///
/// Used to bring a detected corner lattice into the canonical row-major
/// labelling of the board. The valid choices are the 8 elements of the
/// dihedral group `D4`, listed in [`GRID_TRANSFORMS_D4`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridTransform {
    pub a: i32,
    pub b: i32,
    pub c: i32,
    pub d: i32,
}

impl GridTransform {
    pub const IDENTITY: GridTransform = GridTransform {
        a: 1,
        b: 0,
        c: 0,
        d: 1,
    };

    #[inline]
    pub fn apply(&self, i: i32, j: i32) -> [i32; 2] {
        [self.a * i + self.b * j, self.c * i + self.d * j]
    }

    /// Invert the transform if it is unimodular (det = ±1).
    pub fn inverse(&self) -> Option<GridTransform> {
        let det = self.a * self.d - self.b * self.c;
        if det != 1 && det != -1 {
            return None;
        }
        Some(GridTransform {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
        })
    }

    /// True when the transform exchanges the two grid axes.
    #[inline]
    pub fn swaps_axes(&self) -> bool {
        self.a == 0
    }
}

/// The 8 dihedral transforms `D4` on the integer grid.
pub const GRID_TRANSFORMS_D4: [GridTransform; 8] = [
    // rotations: 0°, 90°, 180°, 270°
    GridTransform::IDENTITY,
    GridTransform {
        a: 0,
        b: 1,
        c: -1,
        d: 0,
    },
    GridTransform {
        a: -1,
        b: 0,
        c: 0,
        d: -1,
    },
    GridTransform {
        a: 0,
        b: -1,
        c: 1,
        d: 0,
    },
    // reflections
    GridTransform {
        a: -1,
        b: 0,
        c: 0,
        d: 1,
    },
    GridTransform {
        a: 1,
        b: 0,
        c: 0,
        d: -1,
    },
    GridTransform {
        a: 0,
        b: 1,
        c: 1,
        d: 0,
    },
    GridTransform {
        a: 0,
        b: -1,
        c: -1,
        d: 0,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_d4_element_inverts() {
        for t in GRID_TRANSFORMS_D4 {
            let inv = t.inverse().expect("unimodular");
            for (i, j) in [(0, 0), (3, -2), (-5, 7)] {
                let [x, y] = t.apply(i, j);
                assert_eq!(inv.apply(x, y), [i, j]);
            }
        }
    }

    #[test]
    fn d4_is_closed_under_inverse() {
        for t in GRID_TRANSFORMS_D4 {
            let inv = t.inverse().unwrap();
            assert!(GRID_TRANSFORMS_D4.contains(&inv));
        }
    }

    #[test]
    fn non_unimodular_has_no_inverse() {
        let t = GridTransform {
            a: 2,
            b: 0,
            c: 0,
            d: 1,
        };
        assert!(t.inverse().is_none());
    }

    #[test]
    fn axis_swap_flag() {
        let swapping = GRID_TRANSFORMS_D4.iter().filter(|t| t.swaps_axes()).count();
        assert_eq!(swapping, 4);
    }
}
