use rsparse::{
    data::{self, Nmrc, Numeric, Symb},
    lsolve, lu, sqr, usolve,
};

use super::Solve;

#[derive(Default)]
pub struct RSparseSolver {
    n: usize,
    symbolic: Option<Symb>,
    numeric: Option<Nmrc<f64>>,
}

#[allow(non_snake_case)]
impl Solve for RSparseSolver {
    fn factorize(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64], n: usize) -> Result<(), &'static str> {
        if n == 0 {
            return Err("empty matrix");
        }
        if Ap.len() != n + 1 {
            return Err("column pointers do not match the dimension");
        }
        let a = data::Sprs {
            m: n,
            n,
            i: Ai.to_vec(),
            p: Ap.iter().map(|&v| v as isize).collect(),
            x: Ax.to_vec(),
            nzmax: Ax.len(),
        };
        if self.symbolic.is_none() || self.n != n {
            self.symbolic = Some(sqr(&a, 1, false));
        }
        let s = self.symbolic.as_mut().ok_or("missing symbolic analysis")?;
        self.numeric = Some(lu(&a, s, 1e-6).map_err(|_| "LU factorization failed")?);
        self.n = n;
        Ok(())
    }

    fn solve_factorized(&self, b: &mut [f64], nrhs: usize) -> Result<(), &'static str> {
        let (Some(s), Some(num)) = (self.symbolic.as_ref(), self.numeric.as_ref()) else {
            return Err("matrix is not factorized");
        };
        let n = self.n;
        if b.len() != n * nrhs {
            return Err("right-hand side does not match the dimension");
        }
        let mut x = vec![0.0; n];
        for col in b.chunks_exact_mut(n) {
            ipvec(&num.pinv, col, &mut x[..]); // x = P*b
            lsolve(&num.l, &mut x); // x = L\x
            usolve(&num.u, &mut x); // x = U\x
            ipvec(&s.q, &x, col); // b = Q*x
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.numeric = None;
    }
}

fn ipvec_identity<T: Numeric<T>>(b: &[T], x: &mut [T]) {
    x.copy_from_slice(b);
}

fn ipvec_perm<T: Numeric<T>>(p: &[isize], b: &[T], x: &mut [T]) {
    for k in 0..b.len() {
        x[p[k] as usize] = b[k];
    }
}

fn ipvec<T: Numeric<T>>(p: &Option<Vec<isize>>, b: &[T], x: &mut [T]) {
    match p {
        Some(pvec) => ipvec_perm(pvec, b, x),
        None => ipvec_identity(b, x),
    }
}
