use crate::solution::ConstraintViolation;

/// Handle to a variable of a [`MilpProblem`]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub usize);

/// Handle to a constraint of a [`MilpProblem`]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintId(pub usize);

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Binary,
    Integer,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
}

impl Variable {
    pub fn is_integer(&self) -> bool {
        matches!(self.kind, VarKind::Binary | VarKind::Integer)
    }
}

/// Sparse linear objective, supplied to a backend on every call
#[derive(Debug, Clone)]
pub struct Objective {
    /// (variable, coefficient) pairs; repeated variables are summed
    pub terms: Vec<(VarId, f64)>,
    /// Whether to minimize or maximize
    pub minimize: bool,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    /// Name/label for the constraint (for diagnostics)
    pub name: String,
    /// (variable, coefficient) pairs
    pub terms: Vec<(VarId, f64)>,
    /// Comparison operator
    pub op: ConstraintOp,
    /// Right-hand side value
    pub rhs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

/// A mixed-integer linear program without an objective.
///
/// The objective is passed separately to [`crate::MilpBackend::optimize`] so
/// one formulation can be re-optimized under many objectives. Constraints can
/// be removed; removed slots keep their id so handles held by callers stay
/// stable.
#[derive(Debug, Clone, Default)]
pub struct MilpProblem {
    variables: Vec<Variable>,
    constraints: Vec<Option<Constraint>>,
}

impl Objective {
    pub fn maximize(terms: Vec<(VarId, f64)>) -> Self {
        Self { terms, minimize: false }
    }

    pub fn minimize(terms: Vec<(VarId, f64)>) -> Self {
        Self { terms, minimize: true }
    }

    /// Dense coefficient vector of length `n`
    pub fn dense(&self, n: usize) -> Vec<f64> {
        let mut coefficients = vec![0.0; n];
        for &(VarId(j), coef) in &self.terms {
            if j < n {
                coefficients[j] += coef;
            }
        }
        coefficients
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(VarId(j), coef)| coef * values.get(j).copied().unwrap_or(0.0))
            .sum()
    }
}

impl Constraint {
    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(VarId(j), coef)| coef * values.get(j).copied().unwrap_or(0.0))
            .sum()
    }
}

impl MilpProblem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, name: impl Into<String>, kind: VarKind, lower: f64, upper: f64) -> VarId {
        let (lower, upper) = match kind {
            VarKind::Binary => (lower.max(0.0), upper.min(1.0)),
            _ => (lower, upper),
        };
        self.variables.push(Variable {
            name: name.into(),
            kind,
            lower,
            upper,
        });
        VarId(self.variables.len() - 1)
    }

    /// Continuous variable in `[0, +inf)`
    pub fn add_nonneg(&mut self, name: impl Into<String>) -> VarId {
        self.add_variable(name, VarKind::Continuous, 0.0, f64::INFINITY)
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_variable(name, VarKind::Binary, 0.0, 1.0)
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        terms: Vec<(VarId, f64)>,
        op: ConstraintOp,
        rhs: f64,
    ) -> ConstraintId {
        self.constraints.push(Some(Constraint {
            name: name.into(),
            terms,
            op,
            rhs,
        }));
        ConstraintId(self.constraints.len() - 1)
    }

    /// Remove a constraint, returning it if it was still present
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Option<Constraint> {
        self.constraints.get_mut(id.0).and_then(Option::take)
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(id.0).and_then(Option::as_ref)
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.0)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Active constraints in insertion order
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().flatten()
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.iter().flatten().count()
    }

    /// Find which bounds, integrality requirements and constraints are
    /// violated by `values`, worst first.
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        if values.len() != self.variables.len() {
            violations.push(ConstraintViolation {
                constraint: "dimension".to_string(),
                required: self.variables.len() as f64,
                actual: values.len() as f64,
                violation_amount: (self.variables.len() as f64 - values.len() as f64).abs(),
                description: format!(
                    "expected {} values but got {}",
                    self.variables.len(),
                    values.len()
                ),
            });
            return violations;
        }

        for (var, &x) in self.variables.iter().zip(values) {
            if !x.is_finite() {
                violations.push(ConstraintViolation {
                    constraint: var.name.clone(),
                    required: var.lower,
                    actual: x,
                    violation_amount: f64::INFINITY,
                    description: format!("{} has non-finite value {}", var.name, x),
                });
                continue;
            }
            if x < var.lower - tolerance {
                violations.push(ConstraintViolation {
                    constraint: var.name.clone(),
                    required: var.lower,
                    actual: x,
                    violation_amount: var.lower - x,
                    description: format!("{} is below its lower bound {:.4}", var.name, var.lower),
                });
            } else if x > var.upper + tolerance {
                violations.push(ConstraintViolation {
                    constraint: var.name.clone(),
                    required: var.upper,
                    actual: x,
                    violation_amount: x - var.upper,
                    description: format!("{} exceeds its upper bound {:.4}", var.name, var.upper),
                });
            }
            if var.is_integer() && (x - x.round()).abs() > tolerance {
                violations.push(ConstraintViolation {
                    constraint: var.name.clone(),
                    required: x.round(),
                    actual: x,
                    violation_amount: (x - x.round()).abs(),
                    description: format!("{} = {:.4} is not integral", var.name, x),
                });
            }
        }

        for c in self.constraints() {
            let lhs = c.lhs(values);
            // Scale the tolerance with the magnitude of the row
            let tol = tolerance * c.rhs.abs().max(1.0);

            let violation = match c.op {
                ConstraintOp::Le if lhs > c.rhs + tol => {
                    let amt = lhs - c.rhs;
                    Some((amt, format!("{} exceeds maximum of {:.4} by {:.4}", c.name, c.rhs, amt)))
                }
                ConstraintOp::Ge if lhs < c.rhs - tol => {
                    let amt = c.rhs - lhs;
                    Some((amt, format!("{} is below minimum of {:.4} by {:.4}", c.name, c.rhs, amt)))
                }
                ConstraintOp::Eq if (lhs - c.rhs).abs() > tol => Some((
                    (lhs - c.rhs).abs(),
                    format!("{} requires exactly {:.4} but got {:.4}", c.name, c.rhs, lhs),
                )),
                _ => None,
            };

            if let Some((violation_amount, description)) = violation {
                violations.push(ConstraintViolation {
                    constraint: c.name.clone(),
                    required: c.rhs,
                    actual: lhs,
                    violation_amount,
                    description,
                });
            }
        }

        // Sort by violation amount (worst first)
        violations.sort_by(|a, b| {
            b.violation_amount
                .partial_cmp(&a.violation_amount)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        violations
    }
}
