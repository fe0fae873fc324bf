#[cfg(feature = "faer")]
mod faer;
#[cfg(feature = "faer")]
pub use faer::*;

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use rsparse::*;

#[cfg(feature = "faer")]
pub type DefaultSolver = FaerSolver;

#[cfg(all(not(feature = "faer"), feature = "rsparse"))]
pub type DefaultSolver = RSparseSolver;

#[allow(non_snake_case)]
/// A sparse LU solver that keeps its factorization between solves.
///
/// The matrix is given in compressed sparse column form.
pub trait Solve {
    /// Factorizes the square matrix, replacing any previous factorization.
    ///
    /// # Parameters
    ///
    /// * `Ap` - Column pointers of the matrix.
    /// * `Ai` - Row indices of the matrix.
    /// * `Ax` - Non-zero values of the matrix.
    /// * `n` - Dimension of the system.
    fn factorize(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64], n: usize) -> Result<(), &'static str>;

    /// Solves in place with the stored factorization.
    ///
    /// `b` holds `nrhs` right-hand sides stored column by column.
    fn solve_factorized(&self, b: &mut [f64], nrhs: usize) -> Result<(), &'static str>;

    /// Drops the stored factorization.
    fn reset(&mut self);

    /// Factorizes then solves a single right-hand side.
    fn solve(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64], b: &mut [f64], n: usize) -> Result<(), &'static str> {
        self.factorize(Ap, Ai, Ax, n)?;
        self.solve_factorized(b, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_solver_multiple_rhs() {
        // [[4, 1], [2, 3]] in CSC form
        let ap = [0usize, 2, 4];
        let ai = [0usize, 1, 0, 1];
        let ax = [4.0, 2.0, 1.0, 3.0];
        let mut solver = DefaultSolver::default();
        assert!(solver.solve_factorized(&mut [1.0, 1.0], 1).is_err());
        solver.factorize(&ap, &ai, &ax, 2).unwrap();

        // columns: A*[1, 0] and A*[0, 1]
        let mut b = [4.0, 2.0, 1.0, 3.0];
        solver.solve_factorized(&mut b, 2).unwrap();
        let expected = [1.0, 0.0, 0.0, 1.0];
        for (x, e) in b.iter().zip(expected) {
            assert!((x - e).abs() < 1e-12, "{b:?}");
        }

        solver.reset();
        let mut single = [5.0, 5.0];
        solver.solve(&ap, &ai, &ax, &mut single, 2).unwrap();
        assert!((single[0] - 1.0).abs() < 1e-12 && (single[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_matrix_is_rejected() {
        let mut solver = DefaultSolver::default();
        assert_eq!(solver.factorize(&[0], &[], &[], 0), Err("empty matrix"));
        assert!(solver.solve_factorized(&mut [], 0).is_err());
    }
}
