//! results.rs — per-(individual, case) rating scoreboard
//!
//! Row-contiguous matrix with one row per genome and one cell per case.
//! NaN means "not yet reported"; a row with no NaN is complete and ready for
//! score reduction.

#[derive(Debug, Default)]
pub struct ResultsTable {
    cases: usize,
    genomes: usize,
    data: Vec<f64>,
}

impl ResultsTable {
    /// Reshape to `genomes × cases` and mark every cell unreported.
    pub fn resize(&mut self, cases: usize, genomes: usize) {
        self.cases = cases;
        self.genomes = genomes;
        self.data.clear();
        self.data.resize(cases * genomes, f64::NAN);
    }

    pub fn cases(&self) -> usize {
        self.cases
    }

    pub fn genomes(&self) -> usize {
        self.genomes
    }

    pub fn set(&mut self, genome: usize, case: usize, rating: f64) {
        self.data[genome * self.cases + case] = rating;
    }

    pub fn row(&self, genome: usize) -> &[f64] {
        &self.data[genome * self.cases..(genome + 1) * self.cases]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.cases.max(1))
    }

    pub fn row_complete(&self, genome: usize) -> bool {
        !self.row(genome).iter().any(|v| v.is_nan())
    }

    pub fn all_complete(&self) -> bool {
        !self.data.iter().any(|v| v.is_nan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_fills_with_nan() {
        let mut table = ResultsTable::default();
        table.resize(3, 2);
        assert_eq!(table.rows().count(), 2);
        assert!(table.rows().all(|row| row.iter().all(|v| v.is_nan())));
        assert!(!table.all_complete());
    }

    #[test]
    fn completion_tracks_per_row() {
        let mut table = ResultsTable::default();
        table.resize(2, 2);
        table.set(0, 0, 1.0);
        table.set(0, 1, 2.0);
        assert!(table.row_complete(0));
        assert!(!table.row_complete(1));
        assert!(!table.all_complete());
        table.set(1, 0, 3.0);
        table.set(1, 1, 4.0);
        assert!(table.all_complete());
        assert_eq!(table.row(1), &[3.0, 4.0]);
    }
}
