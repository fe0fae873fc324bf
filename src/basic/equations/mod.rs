use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use derive_more::Display;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use super::error::Result;

pub mod terms;

/// Physical quantity represented by a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum VariableKind {
    /// Real part of the bus voltage.
    BusVr,
    /// Imaginary part of the bus voltage.
    BusVi,
    /// Bus voltage angle (DC approximation).
    BusPhi,
}

/// Physical balance enforced by an equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum EquationKind {
    /// Real part of the bus current balance.
    BusYr,
    /// Imaginary part of the bus current balance.
    BusYi,
    /// Active power balance (DC approximation).
    BusP,
    /// Fixed voltage angle (DC slack).
    BusPhi,
}

/// An unknown of the system, identified by its element number and kind.
///
/// The derived ordering (element number, then kind) fixes the column numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{kind}({num})")]
pub struct Variable {
    pub num: usize,
    pub kind: VariableKind,
}

/// Identifier of an equation. The derived ordering fixes the row numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{kind}({num})")]
pub struct EquationId {
    pub num: usize,
    pub kind: EquationKind,
}

/// A linear contribution of one element to one equation.
pub trait LinearTerm: fmt::Debug {
    /// Short name used in messages.
    fn name(&self) -> String;

    /// The fixed set of variables the term depends on.
    fn variables(&self) -> &[Variable];

    /// Coefficient of `variable` in the linear form.
    fn coefficient(&self, variable: &Variable) -> Result<f64>;

    /// Constant part of the term, moved to the right-hand side when building targets.
    fn constant(&self) -> f64 {
        0.0
    }

    /// Evaluates the term at state `x` indexed by `column`.
    fn eval(&self, x: &[f64], column: &dyn Fn(&Variable) -> Option<usize>) -> Result<f64> {
        let mut value = self.constant();
        for v in self.variables() {
            if let Some(c) = column(v) {
                value += self.coefficient(v)? * x[c];
            }
        }
        Ok(value)
    }
}

#[derive(Debug)]
pub struct Equation {
    pub id: EquationId,
    terms: Vec<Box<dyn LinearTerm>>,
}

impl Equation {
    pub fn terms(&self) -> &[Box<dyn LinearTerm>] {
        &self.terms
    }

    /// Groups the terms of the equation by variable, in variable order.
    pub fn terms_by_variable(&self) -> BTreeMap<Variable, Vec<&dyn LinearTerm>> {
        let mut map: BTreeMap<Variable, Vec<&dyn LinearTerm>> = BTreeMap::new();
        for term in &self.terms {
            for v in term.variables() {
                map.entry(*v).or_default().push(term.as_ref());
            }
        }
        map
    }
}

/// Sparse equation system: lazily created variables and equations holding linear terms.
///
/// Variables and equations are never removed; their sorted orderings give the column and
/// row numbering used by the matrices built from the system.
#[derive(Debug, Default)]
pub struct EquationSystem {
    variables: BTreeSet<Variable>,
    equations: BTreeMap<EquationId, Equation>,
}

impl EquationSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the variable `(num, kind)`, registering it on first request.
    pub fn variable(&mut self, num: usize, kind: VariableKind) -> Variable {
        let v = Variable { num, kind };
        self.variables.insert(v);
        v
    }

    /// Returns the equation `(num, kind)`, creating it on first request.
    pub fn create_equation(&mut self, num: usize, kind: EquationKind) -> &mut Equation {
        let id = EquationId { num, kind };
        self.equations.entry(id).or_insert_with(|| Equation {
            id,
            terms: Vec::new(),
        })
    }

    /// Attaches a term to the equation `(num, kind)`.
    pub fn add_term(&mut self, num: usize, kind: EquationKind, term: Box<dyn LinearTerm>) {
        for v in term.variables() {
            self.variables.insert(*v);
        }
        self.create_equation(num, kind).terms.push(term);
    }

    pub fn equation(&self, num: usize, kind: EquationKind) -> Option<&Equation> {
        self.equations.get(&EquationId { num, kind })
    }

    pub fn sorted_variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    pub fn sorted_equations(&self) -> impl Iterator<Item = &Equation> {
        self.equations.values()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn equation_count(&self) -> usize {
        self.equations.len()
    }

    pub fn term_count(&self) -> usize {
        self.equations.values().map(|e| e.terms.len()).sum()
    }

    /// Column of each variable in the sorted ordering.
    pub fn variable_columns(&self) -> HashMap<Variable, usize> {
        self.variables.iter().enumerate().map(|(i, v)| (*v, i)).collect()
    }

    /// Row of each equation in the sorted ordering.
    pub fn equation_rows(&self) -> HashMap<EquationId, usize> {
        self.equations.keys().enumerate().map(|(i, e)| (*e, i)).collect()
    }

    pub fn variable_column(&self, v: &Variable) -> Option<usize> {
        self.variables
            .contains(v)
            .then(|| self.variables.range(..*v).count())
    }

    pub fn equation_row(&self, id: &EquationId) -> Option<usize> {
        self.equations
            .contains_key(id)
            .then(|| self.equations.range(..*id).count())
    }

    /// Assembles the coefficient matrix with equations as rows and variables as columns.
    pub fn jacobian(&self) -> Result<CscMatrix<f64>> {
        let columns = self.variable_columns();
        let mut coo = CooMatrix::new(self.equation_count(), self.variable_count());
        for (row, eq) in self.equations.values().enumerate() {
            for (v, terms) in eq.terms_by_variable() {
                let col = columns[&v];
                for term in terms {
                    coo.push(row, col, term.coefficient(&v)?);
                }
            }
        }
        Ok(CscMatrix::from(&coo))
    }

    /// Evaluates every equation at state `x` (indexed by sorted variable columns).
    pub fn eval(&self, x: &[f64]) -> Result<Vec<f64>> {
        let columns = self.variable_columns();
        let column = |v: &Variable| columns.get(v).copied();
        let mut values = Vec::with_capacity(self.equations.len());
        for eq in self.equations.values() {
            let mut value = 0.0;
            for term in &eq.terms {
                value += term.eval(x, &column)?;
            }
            values.push(value);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::terms::ShuntTerm;
    use super::*;

    #[test]
    fn test_lazy_creation_is_stable() {
        let mut sys = EquationSystem::new();
        let a = sys.variable(3, VariableKind::BusVi);
        let b = sys.variable(3, VariableKind::BusVi);
        assert_eq!(a, b);
        assert_eq!(sys.variable_count(), 1);

        sys.create_equation(1, EquationKind::BusYr);
        sys.create_equation(1, EquationKind::BusYr);
        assert_eq!(sys.equation_count(), 1);
    }

    #[test]
    fn test_sorted_orderings() {
        let mut sys = EquationSystem::new();
        for num in [4, 0, 2] {
            sys.variable(num, VariableKind::BusVi);
            sys.variable(num, VariableKind::BusVr);
            sys.create_equation(num, EquationKind::BusYi);
            sys.create_equation(num, EquationKind::BusYr);
        }
        let vars: Vec<_> = sys.sorted_variables().map(|v| (v.num, v.kind)).collect();
        assert_eq!(
            vars,
            vec![
                (0, VariableKind::BusVr),
                (0, VariableKind::BusVi),
                (2, VariableKind::BusVr),
                (2, VariableKind::BusVi),
                (4, VariableKind::BusVr),
                (4, VariableKind::BusVi),
            ]
        );
        let eqs: Vec<_> = sys.sorted_equations().map(|e| (e.id.num, e.id.kind)).collect();
        assert_eq!(eqs[0], (0, EquationKind::BusYr));
        assert_eq!(eqs[5], (4, EquationKind::BusYi));

        let v = Variable {
            num: 2,
            kind: VariableKind::BusVi,
        };
        assert_eq!(sys.variable_column(&v), Some(3));
        assert_eq!(sys.variable_columns()[&v], 3);
        let missing = Variable {
            num: 1,
            kind: VariableKind::BusVr,
        };
        assert_eq!(sys.variable_column(&missing), None);
        let id = EquationId {
            num: 4,
            kind: EquationKind::BusYr,
        };
        assert_eq!(sys.equation_row(&id), Some(4));
    }

    #[test]
    fn test_jacobian_and_eval() {
        let mut sys = EquationSystem::new();
        let vr = sys.variable(0, VariableKind::BusVr);
        let vi = sys.variable(0, VariableKind::BusVi);
        sys.add_term(0, EquationKind::BusYr, Box::new(ShuntTerm::real(2.0, 3.0, vr, vi)));
        sys.add_term(0, EquationKind::BusYi, Box::new(ShuntTerm::imaginary(2.0, 3.0, vr, vi)));

        let j = sys.jacobian().unwrap();
        let dense = nalgebra::DMatrix::from(&j);
        assert_eq!(dense[(0, 0)], 2.0);
        assert_eq!(dense[(0, 1)], -3.0);
        assert_eq!(dense[(1, 0)], 3.0);
        assert_eq!(dense[(1, 1)], 2.0);

        // (2 + 3j) * (1 + 1j) = -1 + 5j
        let f = sys.eval(&[1.0, 1.0]).unwrap();
        assert_eq!(f, vec![-1.0, 5.0]);
    }
}
