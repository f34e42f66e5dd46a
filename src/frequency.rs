//! Frequency tables
//!
//! Two-dimensional sufficient statistics for nominal targets: weighted
//! counts indexed by candidate split value (column) and class (row), with an
//! unknown slot on each axis, row/column marginals and column merging for
//! subset search. Storage is sized once at creation; resetting for another
//! attribute never reallocates.

/// Weighted class frequencies per candidate split value.
///
/// Cells are addressed with `Option<usize>`; `None` is the unknown slot.
/// Column marginals exclude the unknown row, row marginals exclude the
/// unknown column and merged columns, and `known` is the total weight with
/// both axes known. `combine` folds one column's statistics into another in
/// place and records the destination, so coarser partitions can be scored
/// without rescanning data; `uncombine` subtracts the same quantities back
/// out.
#[derive(Clone, Debug)]
pub struct FrequencyTable {
    xcap: usize,
    ycap: usize,
    xcnt: usize,
    ycnt: usize,
    frqs: Vec<f64>,
    xmrgs: Vec<f64>,
    ymrgs: Vec<f64>,
    known: f64,
    total: f64,
    dests: Vec<usize>,
}

impl FrequencyTable {
    /// Create a table able to hold `xcap` columns and `ycap` rows. All
    /// storage is allocated here; later resets only clear it.
    pub fn new(xcap: usize, ycap: usize) -> Self {
        FrequencyTable {
            xcap,
            ycap,
            xcnt: xcap,
            ycnt: ycap,
            frqs: vec![0.0; (xcap + 1) * (ycap + 1)],
            xmrgs: vec![0.0; xcap + 1],
            ymrgs: vec![0.0; ycap + 1],
            known: 0.0,
            total: 0.0,
            dests: (0..xcap).collect(),
        }
    }

    /// Clear the table and set the active column/row counts.
    pub fn reset(&mut self, xcnt: usize, ycnt: usize) {
        debug_assert!(xcnt <= self.xcap && ycnt <= self.ycap);
        self.xcnt = xcnt;
        self.ycnt = ycnt;
        self.frqs.fill(0.0);
        self.xmrgs.fill(0.0);
        self.ymrgs.fill(0.0);
        self.known = 0.0;
        self.total = 0.0;
        for (i, d) in self.dests.iter_mut().enumerate() {
            *d = i;
        }
    }

    #[inline]
    fn at(&self, xi: usize, yi: usize) -> usize {
        xi * (self.ycap + 1) + yi
    }

    #[inline]
    fn xi(x: Option<usize>) -> usize {
        x.map_or(0, |v| v + 1)
    }

    pub fn columns(&self) -> usize {
        self.xcnt
    }

    pub fn rows(&self) -> usize {
        self.ycnt
    }

    /// Accumulate one weighted observation.
    pub fn add(&mut self, x: Option<usize>, y: Option<usize>, weight: f64) {
        debug_assert!(x.map_or(true, |v| v < self.xcnt));
        debug_assert!(y.map_or(true, |v| v < self.ycnt));
        let idx = self.at(Self::xi(x), Self::xi(y));
        self.frqs[idx] += weight;
        self.total += weight;
    }

    /// Move one observation's mass between two known columns, keeping the
    /// marginals current.
    pub fn shift(&mut self, src: usize, dst: usize, y: Option<usize>, weight: f64) {
        let yi = Self::xi(y);
        let si = self.at(src + 1, yi);
        let di = self.at(dst + 1, yi);
        self.frqs[si] -= weight;
        self.frqs[di] += weight;
        if y.is_some() {
            self.xmrgs[src + 1] -= weight;
            self.xmrgs[dst + 1] += weight;
        }
    }

    /// Recompute all marginals and the known total from the raw cells.
    pub fn marginalize(&mut self) {
        for m in self.xmrgs.iter_mut() {
            *m = 0.0;
        }
        for m in self.ymrgs.iter_mut() {
            *m = 0.0;
        }
        self.known = 0.0;
        for x in 0..=self.xcnt {
            // column marginals exclude the unknown row
            let mut cm = 0.0;
            for y in 1..=self.ycnt {
                cm += self.frqs[self.at(x, y)];
            }
            self.xmrgs[x] = cm;
        }
        for x in 1..=self.xcnt {
            if self.dests[x - 1] != x - 1 {
                continue;
            }
            for y in 1..=self.ycnt {
                let f = self.frqs[self.at(x, y)];
                self.ymrgs[y] += f;
                self.known += f;
            }
        }
    }

    /// Fold column `src` into column `dst`, which is resolved to its
    /// canonical column first. `src` must not already be merged.
    pub fn combine(&mut self, src: usize, dst: usize) {
        debug_assert_ne!(src, dst);
        debug_assert_eq!(self.dests[src], src, "source column already merged");
        let d = self.destination(dst);
        debug_assert_ne!(d, src);
        for y in 0..=self.ycnt {
            let f = self.frqs[self.at(src + 1, y)];
            let di = self.at(d + 1, y);
            self.frqs[di] += f;
        }
        self.xmrgs[d + 1] += self.xmrgs[src + 1];
        self.dests[src] = d;
    }

    /// Undo a `combine`, subtracting the same quantities back out.
    pub fn uncombine(&mut self, src: usize) {
        let d = self.dests[src];
        debug_assert_ne!(d, src, "source column is not merged");
        for y in 0..=self.ycnt {
            let f = self.frqs[self.at(src + 1, y)];
            let di = self.at(d + 1, y);
            self.frqs[di] -= f;
        }
        self.xmrgs[d + 1] -= self.xmrgs[src + 1];
        self.dests[src] = src;
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

    pub fn frequency(&self, x: Option<usize>, y: Option<usize>) -> f64 {
        self.frqs[self.at(Self::xi(x), Self::xi(y))]
    }

    /// Column marginal over known rows.
    pub fn column_total(&self, x: Option<usize>) -> f64 {
        self.xmrgs[Self::xi(x)]
    }

    /// Row marginal over known, canonical columns.
    pub fn row_total(&self, y: Option<usize>) -> f64 {
        self.ymrgs[Self::xi(y)]
    }

    /// Total weight with both the column and the row known.
    pub fn known(&self) -> f64 {
        self.known
    }

    /// Total accumulated weight, unknown slots included.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Known-row frequencies of one column as a slice.
    pub fn class_frequencies(&self, x: usize) -> &[f64] {
        let start = self.at(x + 1, 1);
        &self.frqs[start..start + self.ycnt]
    }

    /// Number of canonical columns carrying weight.
    pub fn supported_columns(&self) -> usize {
        (0..self.xcnt)
            .filter(|&x| self.is_canonical(x) && self.xmrgs[x + 1] > 0.0)
            .count()
    }

    /// Deep-copy another table's current aggregates. Capacities must match.
    pub fn copy_from(&mut self, src: &FrequencyTable) {
        debug_assert!(self.xcap == src.xcap && self.ycap == src.ycap);
        self.xcnt = src.xcnt;
        self.ycnt = src.ycnt;
        self.frqs.copy_from_slice(&src.frqs);
        self.xmrgs.copy_from_slice(&src.xmrgs);
        self.ymrgs.copy_from_slice(&src.ymrgs);
        self.known = src.known;
        self.total = src.total;
        self.dests.copy_from_slice(&src.dests);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FrequencyTable {
        // 3 columns, 2 classes
        let mut t = FrequencyTable::new(3, 2);
        t.reset(3, 2);
        t.add(Some(0), Some(0), 4.0);
        t.add(Some(0), Some(1), 1.0);
        t.add(Some(1), Some(0), 2.0);
        t.add(Some(1), Some(1), 3.0);
        t.add(Some(2), Some(1), 2.0);
        t.add(None, Some(0), 1.0);
        t.add(Some(2), None, 1.0);
        t.marginalize();
        t
    }

    #[test]
    fn marginals_and_totals() {
        let t = sample();
        assert_eq!(t.column_total(Some(0)), 5.0);
        assert_eq!(t.column_total(Some(1)), 5.0);
        assert_eq!(t.column_total(Some(2)), 2.0);
        assert_eq!(t.column_total(None), 1.0);
        assert_eq!(t.row_total(Some(0)), 6.0);
        assert_eq!(t.row_total(Some(1)), 6.0);
        assert_eq!(t.known(), 12.0);
        assert_eq!(t.total(), 14.0);
        // column marginal equals the sum of its known-row entries
        for x in 0..t.columns() {
            let s: f64 = t.class_frequencies(x).iter().sum();
            assert_eq!(s, t.column_total(Some(x)));
        }
    }

    #[test]
    fn combine_uncombine_is_exact_inverse() {
        let mut t = sample();
        let before = t.clone();
        t.combine(2, 0);
        assert_eq!(t.destination(2), 0);
        assert!(!t.is_canonical(2));
        assert_eq!(t.column_total(Some(0)), 7.0);
        assert_eq!(t.frequency(Some(0), Some(1)), 3.0);
        assert_eq!(t.supported_columns(), 2);
        t.uncombine(2);
        for x in 0..t.columns() {
            assert_eq!(t.column_total(Some(x)), before.column_total(Some(x)));
            for y in 0..t.rows() {
                assert_eq!(
                    t.frequency(Some(x), Some(y)),
                    before.frequency(Some(x), Some(y))
                );
            }
        }
        assert!(t.is_canonical(2));
    }

    #[test]
    fn combine_resolves_destination_chains() {
        let mut t = sample();
        t.combine(1, 0);
        // merging into an already-merged column lands on its destination
        t.combine(2, 1);
        assert_eq!(t.destination(2), 0);
        assert_eq!(t.column_total(Some(0)), 12.0);
        assert_eq!(t.supported_columns(), 1);
        t.uncombine(2);
        t.uncombine(1);
        assert_eq!(t.column_total(Some(0)), 5.0);
        assert_eq!(t.supported_columns(), 3);
    }

    #[test]
    fn shift_keeps_marginals_current() {
        let mut t = FrequencyTable::new(2, 2);
        t.reset(2, 2);
        t.add(Some(1), Some(0), 3.0);
        t.add(Some(1), Some(1), 2.0);
        t.marginalize();
        t.shift(1, 0, Some(0), 1.0);
        assert_eq!(t.column_total(Some(0)), 1.0);
        assert_eq!(t.column_total(Some(1)), 4.0);
        assert_eq!(t.frequency(Some(0), Some(0)), 1.0);
        assert_eq!(t.known(), 5.0);
    }

    #[test]
    fn copy_from_duplicates_aggregates() {
        let src = sample();
        let mut dst = FrequencyTable::new(3, 2);
        dst.copy_from(&src);
        assert_eq!(dst.known(), src.known());
        assert_eq!(dst.total(), src.total());
        assert_eq!(dst.frequency(Some(1), Some(1)), 3.0);
        assert_eq!(dst.column_total(Some(2)), 2.0);
    }

    #[test]
    fn reset_reuses_storage() {
        let mut t = sample();
        t.combine(1, 0);
        t.reset(2, 2);
        assert_eq!(t.columns(), 2);
        assert_eq!(t.total(), 0.0);
        assert!(t.is_canonical(1));
        assert_eq!(t.frequency(Some(0), Some(0)), 0.0);
    }
}
