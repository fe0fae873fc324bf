use faer::{
    MatMut,
    linalg::solvers::Solve,
    sparse::{
        SparseColMatRef, SymbolicSparseColMatRef,
        linalg::solvers::{Lu, SymbolicLu},
    },
};

use super::Solve as ScSolve;

#[derive(Default)]
pub struct FaerSolver {
    n: usize,
    lu: Option<Lu<usize, f64>>,
    symbolic: Option<SymbolicLu<usize>>,
}

#[allow(non_snake_case)]
impl ScSolve for FaerSolver {
    fn factorize(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64], n: usize) -> Result<(), &'static str> {
        if n == 0 {
            return Err("empty matrix");
        }
        if Ap.len() != n + 1 {
            return Err("column pointers do not match the dimension");
        }
        let s = unsafe { SymbolicSparseColMatRef::new_unchecked(n, n, Ap, None, Ai) };
        let mat = SparseColMatRef::new(s, Ax);
        if self.symbolic.is_none() || self.n != n {
            self.symbolic = Some(SymbolicLu::try_new(s).map_err(|_| "Faer symbolic error")?);
        }
        let symbolic = self.symbolic.as_ref().ok_or("missing symbolic analysis")?.clone();
        self.lu = Some(Lu::try_new_with_symbolic(symbolic, mat).map_err(|_| "Faer numerical error")?);
        self.n = n;
        Ok(())
    }

    fn solve_factorized(&self, b: &mut [f64], nrhs: usize) -> Result<(), &'static str> {
        let lu = self.lu.as_ref().ok_or("matrix is not factorized")?;
        if b.len() != self.n * nrhs {
            return Err("right-hand side does not match the dimension");
        }
        let rhs = MatMut::from_column_major_slice_mut(b, self.n, nrhs);
        lu.solve_in_place(rhs);
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.lu = None;
    }
}
