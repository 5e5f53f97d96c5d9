//! Uniform search grid for nearest-node and containing-cell queries.
//!
//! Points (and optionally triangles) are binned into an `nx × ny` grid over
//! their bounding box. `nearest` expands square rings of bins around the query
//! bin and stops once no unvisited bin can hold a closer point, so the answer is
//! exact. Ties are broken towards the lower point index.

use serde::{Deserialize, Serialize};

/// Grid resolution used when a field builds its search structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridResolution {
    pub nx: usize,
    pub ny: usize,
}

impl Default for GridResolution {
    fn default() -> Self {
        Self { nx: 10, ny: 10 }
    }
}

const BARY_EPS: f64 = 1e-12;

#[derive(Clone, Debug)]
pub struct SearchGrid {
    nx: usize,
    ny: usize,
    min: [f64; 2],
    cell: [f64; 2],
    points: Vec<Vec<usize>>,
    triangles: Vec<Vec<usize>>,
    max: [f64; 2],
}

impl SearchGrid {
    /// Bin the points `i` of interleaved `coords` for which `keep(i)` holds.
    pub fn over_points(
        coords: &[f64],
        keep: impl Fn(usize) -> bool,
        res: GridResolution,
    ) -> Self {
        let n = coords.len() / 2;
        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for i in (0..n).filter(|&i| keep(i)) {
            for d in 0..2 {
                min[d] = min[d].min(coords[2 * i + d]);
                max[d] = max[d].max(coords[2 * i + d]);
            }
        }
        if min[0] > max[0] {
            min = [0.0; 2];
            max = [0.0; 2];
        }
        let mut dims = [res.nx.max(1), res.ny.max(1)];
        let mut cell = [1.0; 2];
        for d in 0..2 {
            let extent = max[d] - min[d];
            if extent > 0.0 {
                cell[d] = extent / dims[d] as f64;
            } else {
                dims[d] = 1;
            }
        }
        let mut grid = Self {
            nx: dims[0],
            ny: dims[1],
            min,
            cell,
            points: vec![Vec::new(); dims[0] * dims[1]],
            triangles: vec![Vec::new(); dims[0] * dims[1]],
            max,
        };
        for i in (0..n).filter(|&i| keep(i)) {
            let (ix, iy) = grid.bin_of([coords[2 * i], coords[2 * i + 1]]);
            let b = grid.flat(ix, iy);
            grid.points[b].push(i);
        }
        grid
    }

    /// Also bin every triangle for which `keep` holds into all bins its
    /// bounding box touches.
    pub fn with_triangles(
        mut self,
        coords: &[f64],
        triangles: &[[usize; 3]],
        keep: impl Fn(&[usize; 3]) -> bool,
    ) -> Self {
        for (t, tri) in triangles.iter().enumerate().filter(|(_, tri)| keep(tri)) {
            let mut lo = [f64::INFINITY; 2];
            let mut hi = [f64::NEG_INFINITY; 2];
            for &v in tri {
                for d in 0..2 {
                    lo[d] = lo[d].min(coords[2 * v + d]);
                    hi[d] = hi[d].max(coords[2 * v + d]);
                }
            }
            let (x0, y0) = self.bin_of(lo);
            let (x1, y1) = self.bin_of(hi);
            for iy in y0..=y1 {
                for ix in x0..=x1 {
                    let b = self.flat(ix, iy);
                    self.triangles[b].push(t);
                }
            }
        }
        self
    }

    #[inline]
    fn flat(&self, ix: usize, iy: usize) -> usize {
        iy * self.nx + ix
    }

    #[inline]
    fn bin_of(&self, p: [f64; 2]) -> (usize, usize) {
        let axis = |d: usize, n: usize| -> usize {
            let f = ((p[d] - self.min[d]) / self.cell[d]).floor();
            if f.is_nan() || f < 0.0 {
                0
            } else {
                (f as usize).min(n - 1)
            }
        };
        (axis(0, self.nx), axis(1, self.ny))
    }

    /// Closest binned point to `p` and its squared distance.
    pub fn nearest(&self, coords: &[f64], p: [f64; 2]) -> Option<(usize, f64)> {
        let (cx, cy) = self.bin_of(p);
        let step = match (self.nx > 1, self.ny > 1) {
            (true, true) => self.cell[0].min(self.cell[1]),
            (true, false) => self.cell[0],
            (false, true) => self.cell[1],
            (false, false) => f64::INFINITY,
        };
        let max_ring = self.nx.max(self.ny);
        let mut best: Option<(usize, f64)> = None;
        for r in 0..=max_ring {
            self.for_ring(cx, cy, r, |b| {
                for &i in &self.points[b] {
                    let dx = coords[2 * i] - p[0];
                    let dy = coords[2 * i + 1] - p[1];
                    let d2 = dx * dx + dy * dy;
                    best = match best {
                        Some((bi, bd)) if bd < d2 || (bd == d2 && bi < i) => Some((bi, bd)),
                        _ => Some((i, d2)),
                    };
                }
            });
            if let Some((_, bd)) = best {
                let reach = r as f64 * step;
                if reach * reach > bd {
                    break;
                }
            }
        }
        best
    }

    fn for_ring(&self, cx: usize, cy: usize, r: usize, mut f: impl FnMut(usize)) {
        let (cx, cy, r) = (cx as isize, cy as isize, r as isize);
        let (nx, ny) = (self.nx as isize, self.ny as isize);
        for iy in (cy - r)..=(cy + r) {
            if iy < 0 || iy >= ny {
                continue;
            }
            for ix in (cx - r)..=(cx + r) {
                if ix < 0 || ix >= nx {
                    continue;
                }
                if (ix - cx).abs() != r && (iy - cy).abs() != r {
                    continue;
                }
                f(self.flat(ix as usize, iy as usize));
            }
        }
    }

    /// Triangle containing `p` and the barycentric weights of its vertices.
    pub fn locate(
        &self,
        coords: &[f64],
        triangles: &[[usize; 3]],
        p: [f64; 2],
    ) -> Option<(usize, [f64; 3])> {
        let tol = BARY_EPS * (1.0 + self.cell[0].max(self.cell[1]));
        if p[0] < self.min[0] - tol
            || p[1] < self.min[1] - tol
            || p[0] > self.max[0] + tol
            || p[1] > self.max[1] + tol
        {
            return None;
        }
        let (ix, iy) = self.bin_of(p);
        self.triangles[self.flat(ix, iy)]
            .iter()
            .find_map(|&t| barycentric(coords, &triangles[t], p).map(|w| (t, w)))
    }
}

/// Barycentric weights of `p` in `tri`, if `p` lies inside (boundary included).
pub fn barycentric(coords: &[f64], tri: &[usize; 3], p: [f64; 2]) -> Option<[f64; 3]> {
    let [a, b, c] = tri.map(|v| [coords[2 * v], coords[2 * v + 1]]);
    let det = (b[1] - c[1]) * (a[0] - c[0]) + (c[0] - b[0]) * (a[1] - c[1]);
    if det == 0.0 {
        return None;
    }
    let l1 = ((b[1] - c[1]) * (p[0] - c[0]) + (c[0] - b[0]) * (p[1] - c[1])) / det;
    let l2 = ((c[1] - a[1]) * (p[0] - c[0]) + (a[0] - c[0]) * (p[1] - c[1])) / det;
    let l3 = 1.0 - l1 - l2;
    let w = [l1, l2, l3];
    w.iter().all(|&l| l >= -BARY_EPS).then_some(w)
}
