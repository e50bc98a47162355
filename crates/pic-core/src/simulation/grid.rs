//! Particle loading bounds on a cell-centered grid.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Loading bounds snapped to cell edges, with the particle count they hold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadingBounds {
    pub p_xmin: f64,
    pub p_xmax: f64,
    pub n_particles: usize,
}

/// Snap `[p_xmin, p_xmax]` to the edges of the cells of `x` it covers and
/// count `p_nx` particles per covered gridpoint.
///
/// `x` holds evenly spaced gridpoint positions. Bounds are first clamped to
/// the box, keeping `ncells_empty` cells free at the upper end. When no
/// gridpoint falls strictly inside, the clamped bounds are returned with a
/// count of zero.
pub fn adapt_to_grid(x: &[f64], p_xmin: f64, p_xmax: f64, p_nx: usize, ncells_empty: usize) -> Result<LoadingBounds> {
    if x.len() < 2 {
        return Err(Error::InvalidArgument(format!(
            "grid needs at least two points, got {}",
            x.len()
        )));
    }
    let xmin = x.iter().copied().fold(f64::INFINITY, f64::min);
    let xmax = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let dx = x[1] - x[0];

    let p_xmin = p_xmin.max(xmin - 0.5 * dx);
    let p_xmax = p_xmax.min(xmax + (0.5 - ncells_empty as f64) * dx);

    let (count, lo, hi) = x
        .iter()
        .copied()
        .filter(|&xi| xi > p_xmin && xi < p_xmax)
        .fold((0usize, f64::INFINITY, f64::NEG_INFINITY), |(n, lo, hi), xi| {
            (n + 1, lo.min(xi), hi.max(xi))
        });

    let n_particles = count * p_nx;
    if n_particles == 0 {
        return Ok(LoadingBounds {
            p_xmin,
            p_xmax,
            n_particles,
        });
    }
    Ok(LoadingBounds {
        p_xmin: lo - 0.5 * dx,
        p_xmax: hi + 0.5 * dx,
        n_particles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid(n: usize, dx: f64) -> Vec<f64> {
        (0..n).map(|i| (i as f64 + 0.5) * dx).collect()
    }

    #[test]
    fn snaps_to_cell_edges() {
        let x = grid(10, 1.0);
        let bounds = adapt_to_grid(&x, 2.2, 6.7, 2, 0).unwrap();
        // Gridpoints 2.5 .. 6.5 are inside.
        assert_eq!(bounds.n_particles, 5 * 2);
        assert_eq!(bounds.p_xmin, 2.0);
        assert_eq!(bounds.p_xmax, 7.0);
    }

    #[test]
    fn clamps_to_box_and_keeps_empty_cells() {
        let x = grid(10, 1.0);
        let bounds = adapt_to_grid(&x, -100.0, 100.0, 1, 2).unwrap();
        assert_eq!(bounds.p_xmin, 0.0);
        assert_eq!(bounds.p_xmax, 8.0);
        assert_eq!(bounds.n_particles, 8);
    }

    #[test]
    fn empty_range_keeps_clamped_bounds() {
        let x = grid(10, 1.0);
        let bounds = adapt_to_grid(&x, 3.1, 3.4, 4, 0).unwrap();
        assert_eq!(bounds.n_particles, 0);
        assert_eq!((bounds.p_xmin, bounds.p_xmax), (3.1, 3.4));
    }

    #[test]
    fn needs_two_points() {
        assert!(adapt_to_grid(&[0.5], 0.0, 1.0, 1, 0).is_err());
    }

    proptest! {
        #[test]
        fn loaded_bounds_sit_on_cell_edges(
            lo in -5.0f64..20.0,
            width in 0.0f64..20.0,
            p_nx in 1usize..8,
            empty in 0usize..3,
        ) {
            let x = grid(16, 1.0);
            let bounds = adapt_to_grid(&x, lo, lo + width, p_nx, empty).unwrap();
            prop_assert_eq!(bounds.n_particles % p_nx, 0);
            prop_assert!(bounds.p_xmin >= 0.0);
            prop_assert!(bounds.p_xmax <= 16.0 - empty as f64);
            if bounds.n_particles > 0 {
                prop_assert_eq!(bounds.p_xmin.fract(), 0.0);
                prop_assert_eq!(bounds.p_xmax.fract(), 0.0);
                let cells = (bounds.p_xmax - bounds.p_xmin) as usize;
                prop_assert_eq!(cells * p_nx, bounds.n_particles);
            }
        }
    }
}
