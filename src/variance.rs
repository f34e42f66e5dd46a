//! Variance tables
//!
//! One-dimensional sufficient statistics for metric targets: per candidate
//! split value a weighted count, sum and sum of squares, from which mean and
//! sum of squared errors are derived. Merging and the unknown slot mirror
//! the frequency table; the derived quantities are refreshed after every
//! mutation, never stored stale.

#[derive(Clone, Copy, Debug, Default)]
struct Moments {
    cnt: f64,
    sum: f64,
    sqr: f64,
}

/// Weighted target moments per candidate split value.
#[derive(Clone, Debug)]
pub struct VarianceTable {
    cap: usize,
    cnt: usize,
    cells: Vec<Moments>,
    mean: Vec<f64>,
    sse: Vec<f64>,
    known: f64,
    total: f64,
    dests: Vec<usize>,
}

impl VarianceTable {
    /// Create a table able to hold `cap` columns; storage is allocated once.
    pub fn new(cap: usize) -> Self {
        VarianceTable {
            cap,
            cnt: cap,
            cells: vec![Moments::default(); cap + 1],
            mean: vec![0.0; cap + 1],
            sse: vec![0.0; cap + 1],
            known: 0.0,
            total: 0.0,
            dests: (0..cap).collect(),
        }
    }

    /// Clear the table and set the active column count.
    pub fn reset(&mut self, cnt: usize) {
        debug_assert!(cnt <= self.cap);
        self.cnt = cnt;
        self.cells.fill(Moments::default());
        self.mean.fill(0.0);
        self.sse.fill(0.0);
        self.known = 0.0;
        self.total = 0.0;
        for (i, d) in self.dests.iter_mut().enumerate() {
            *d = i;
        }
    }

    #[inline]
    fn xi(x: Option<usize>) -> usize {
        x.map_or(0, |v| v + 1)
    }

    pub fn columns(&self) -> usize {
        self.cnt
    }

    /// Accumulate one weighted observation of the target value.
    pub fn add(&mut self, x: Option<usize>, value: f64, weight: f64) {
        debug_assert!(x.map_or(true, |v| v < self.cnt));
        let xi = Self::xi(x);
        let cell = &mut self.cells[xi];
        cell.cnt += weight;
        cell.sum += weight * value;
        cell.sqr += weight * value * value;
        self.total += weight;
    }

    /// Move one observation's mass between two known columns, keeping the
    /// derived quantities current.
    pub fn shift(&mut self, src: usize, dst: usize, value: f64, weight: f64) {
        let s = &mut self.cells[src + 1];
        s.cnt -= weight;
        s.sum -= weight * value;
        s.sqr -= weight * value * value;
        let d = &mut self.cells[dst + 1];
        d.cnt += weight;
        d.sum += weight * value;
        d.sqr += weight * value * value;
        self.refresh(src + 1);
        self.refresh(dst + 1);
    }

    fn refresh(&mut self, xi: usize) {
        let cell = self.cells[xi];
        if cell.cnt > 0.0 {
            self.mean[xi] = cell.sum / cell.cnt;
            self.sse[xi] = (cell.sqr - cell.sum * cell.sum / cell.cnt).max(0.0);
        } else {
            self.mean[xi] = 0.0;
            self.sse[xi] = 0.0;
        }
    }

    /// Recompute the derived quantities and the known total.
    pub fn marginalize(&mut self) {
        for xi in 0..=self.cnt {
            self.refresh(xi);
        }
        self.known = 0.0;
        for x in 0..self.cnt {
            if self.dests[x] == x {
                self.known += self.cells[x + 1].cnt;
            }
        }
    }

    /// Fold column `src` into column `dst`, resolved to its canonical
    /// column first. `src` must not already be merged.
    pub fn combine(&mut self, src: usize, dst: usize) {
        debug_assert_ne!(src, dst);
        debug_assert_eq!(self.dests[src], src, "source column already merged");
        let d = self.destination(dst);
        debug_assert_ne!(d, src);
        let s = self.cells[src + 1];
        let cell = &mut self.cells[d + 1];
        cell.cnt += s.cnt;
        cell.sum += s.sum;
        cell.sqr += s.sqr;
        self.dests[src] = d;
        self.refresh(d + 1);
    }

    /// Undo a `combine`, subtracting the same quantities back out.
    pub fn uncombine(&mut self, src: usize) {
        let d = self.dests[src];
        debug_assert_ne!(d, src, "source column is not merged");
        let s = self.cells[src + 1];
        let cell = &mut self.cells[d + 1];
        cell.cnt -= s.cnt;
        cell.sum -= s.sum;
        cell.sqr -= s.sqr;
        self.dests[src] = src;
        self.refresh(d + 1);
    }

    /// Follow the destination chain to the canonical column.
    pub fn destination(&self, x: usize) -> usize {
        let mut c = x;
        while self.dests[c] != c {
            c = self.dests[c];
        }
        c
    }

    #[inline]
    pub fn is_canonical(&self, x: usize) -> bool {
        self.dests[x] == x
    }

    pub fn count(&self, x: Option<usize>) -> f64 {
        self.cells[Self::xi(x)].cnt
    }

    pub fn sum(&self, x: Option<usize>) -> f64 {
        self.cells[Self::xi(x)].sum
    }

    pub fn mean(&self, x: Option<usize>) -> f64 {
        self.mean[Self::xi(x)]
    }

    /// Sum of squared errors around the column mean.
    pub fn sse(&self, x: Option<usize>) -> f64 {
        self.sse[Self::xi(x)]
    }

    /// Total weight in known, canonical columns.
    pub fn known(&self) -> f64 {
        self.known
    }

    /// Total accumulated weight, the unknown slot included.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Number of canonical columns carrying weight.
    pub fn supported_columns(&self) -> usize {
        (0..self.cnt)
            .filter(|&x| self.is_canonical(x) && self.cells[x + 1].cnt > 0.0)
            .count()
    }

    /// Pooled (count, sum, sum of squares) over known canonical columns.
    pub fn aggregate(&self) -> (f64, f64, f64) {
        let mut acc = Moments::default();
        for x in 0..self.cnt {
            if self.dests[x] == x {
                let c = self.cells[x + 1];
                acc.cnt += c.cnt;
                acc.sum += c.sum;
                acc.sqr += c.sqr;
            }
        }
        (acc.cnt, acc.sum, acc.sqr)
    }

    /// Deep-copy another table's current aggregates. Capacities must match.
    pub fn copy_from(&mut self, src: &VarianceTable) {
        debug_assert_eq!(self.cap, src.cap);
        self.cnt = src.cnt;
        self.cells.copy_from_slice(&src.cells);
        self.mean.copy_from_slice(&src.mean);
        self.sse.copy_from_slice(&src.sse);
        self.known = src.known;
        self.total = src.total;
        self.dests.copy_from_slice(&src.dests);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VarianceTable {
        let mut t = VarianceTable::new(3);
        t.reset(3);
        t.add(Some(0), 1.0, 1.0);
        t.add(Some(0), 3.0, 1.0);
        t.add(Some(1), 2.0, 2.0);
        t.add(Some(2), 5.0, 1.0);
        t.add(None, 9.0, 1.0);
        t.marginalize();
        t
    }

    #[test]
    fn derived_moments() {
        let t = sample();
        assert_eq!(t.count(Some(0)), 2.0);
        assert!((t.mean(Some(0)) - 2.0).abs() < 1e-12);
        assert!((t.sse(Some(0)) - 2.0).abs() < 1e-12);
        assert_eq!(t.sse(Some(1)), 0.0);
        assert_eq!(t.known(), 5.0);
        assert_eq!(t.total(), 6.0);
        let (cnt, sum, _) = t.aggregate();
        assert_eq!(cnt, 5.0);
        assert_eq!(sum, 1.0 + 3.0 + 4.0 + 5.0);
    }

    #[test]
    fn combine_uncombine_is_exact_inverse() {
        let mut t = sample();
        let before = t.clone();
        t.combine(2, 0);
        assert_eq!(t.count(Some(0)), 3.0);
        assert!((t.mean(Some(0)) - 3.0).abs() < 1e-12);
        assert_eq!(t.supported_columns(), 2);
        t.uncombine(2);
        for x in 0..t.columns() {
            assert_eq!(t.count(Some(x)), before.count(Some(x)));
            assert_eq!(t.sum(Some(x)), before.sum(Some(x)));
            assert!((t.sse(Some(x)) - before.sse(Some(x))).abs() < 1e-12);
        }
    }

    #[test]
    fn copy_from_duplicates_aggregates() {
        let src = sample();
        let mut dst = VarianceTable::new(3);
        dst.copy_from(&src);
        assert_eq!(dst.known(), src.known());
        assert_eq!(dst.count(Some(1)), 2.0);
        assert!((dst.sse(Some(0)) - src.sse(Some(0))).abs() < 1e-12);
    }

    #[test]
    fn shift_moves_single_observations() {
        let mut t = VarianceTable::new(2);
        t.reset(2);
        t.add(Some(1), 1.0, 1.0);
        t.add(Some(1), 2.0, 1.0);
        t.add(Some(1), 3.0, 1.0);
        t.marginalize();
        t.shift(1, 0, 1.0, 1.0);
        assert_eq!(t.count(Some(0)), 1.0);
        assert_eq!(t.count(Some(1)), 2.0);
        assert!((t.mean(Some(1)) - 2.5).abs() < 1e-12);
        assert!((t.sse(Some(1)) - 0.5).abs() < 1e-12);
        // known is refreshed by marginalize, mass only moved between
        // known columns
        t.marginalize();
        assert_eq!(t.known(), 3.0);
    }
}
