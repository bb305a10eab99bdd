//! Named mixed-integer linear program on `good_lp` types.
//!
//! The dispatch builder declares variables and named constraints here; each
//! solver backend turns the model into its own representation (an
//! `lp-solvers` problem for CBC, a `good_lp` microlp model in-process).
//!
//! `good_lp` keeps variable positions private, so the model records the
//! declaration order itself. Solved values travel as a `Vec<f64>` in that
//! order and are read back through [`Assignment`].

use std::collections::HashMap;

use good_lp::variable::UnsolvedProblem;
use good_lp::{
    Constraint, Expression, IntoAffineExpression, ObjectiveDirection, ProblemVariables, Solution,
    SolutionStatus, Variable, VariableDefinition,
};

#[derive(Clone, Default)]
pub struct MilpModel {
    name: String,
    variables: ProblemVariables,
    order: Vec<Variable>,
    positions: HashMap<Variable, usize>,
    objective: Expression,
    constraints: Vec<Constraint>,
}

impl std::fmt::Debug for MilpModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MilpModel")
            .field("name", &self.name)
            .field("variables", &self.order.len())
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

impl MilpModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_variable(&mut self, name: impl Into<String>, definition: VariableDefinition) -> Variable {
        let variable = self.variables.add(definition.name(name));
        self.positions.insert(variable, self.order.len());
        self.order.push(variable);
        variable
    }

    /// Add `constraint` under `name`. Names are what infeasibility reports show.
    pub fn add_constraint(&mut self, name: impl Into<String>, constraint: Constraint) {
        self.constraints.push(constraint.set_name(name.into()));
    }

    pub fn set_objective(&mut self, objective: impl IntoAffineExpression) {
        self.objective = objective.into_expression();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared variables with their definitions, in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = (Variable, &VariableDefinition)> {
        self.variables.iter_variables_with_def()
    }

    pub fn variable_count(&self) -> usize {
        self.order.len()
    }

    pub fn binary_count(&self) -> usize {
        self.variables().filter(|(_, def)| def.is_integer()).count()
    }

    /// Position of `variable` in solved value vectors.
    pub fn position(&self, variable: Variable) -> Option<usize> {
        self.positions.get(&variable).copied()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name() == Some(name))
    }

    pub fn objective(&self) -> &Expression {
        &self.objective
    }

    /// Hand the variables and objective to a `good_lp` solver. Constraints are
    /// added by the caller.
    pub fn to_unsolved(&self) -> UnsolvedProblem {
        self.variables
            .clone()
            .optimise(ObjectiveDirection::Maximisation, self.objective.clone())
    }

    pub fn assignment<'a>(&'a self, values: &'a [f64]) -> Assignment<'a> {
        Assignment { model: self, values }
    }

    pub fn evaluate_objective(&self, values: &[f64]) -> f64 {
        self.assignment(values).eval(&self.objective)
    }

    /// Name of the first violated bound, integrality or constraint, if any.
    pub fn first_violation(&self, values: &[f64], tolerance: f64) -> Option<String> {
        let assignment = self.assignment(values);
        for (variable, def) in self.variables() {
            let value = assignment.value(variable);
            if value < def.get_min() - tolerance || value > def.get_max() + tolerance {
                return Some(format!("bounds of {}", def.get_name()));
            }
            if def.is_integer() && (value - value.round()).abs() > tolerance {
                return Some(format!("integrality of {}", def.get_name()));
            }
        }
        self.constraints
            .iter()
            .find(|c| !assignment.satisfies(c, tolerance))
            .map(|c| c.name().unwrap_or("unnamed").to_string())
    }
}

/// Solved values of a [`MilpModel`], usable wherever `good_lp` expects a [`Solution`].
pub struct Assignment<'a> {
    model: &'a MilpModel,
    values: &'a [f64],
}

impl Assignment<'_> {
    /// `good_lp` stores every constraint as `expression <= 0` or `expression == 0`.
    pub fn satisfies(&self, constraint: &Constraint, tolerance: f64) -> bool {
        let lhs = self.eval(constraint.expression());
        if constraint.is_equality() {
            lhs.abs() <= tolerance
        } else {
            lhs <= tolerance
        }
    }
}

impl Solution for Assignment<'_> {
    fn status(&self) -> SolutionStatus {
        SolutionStatus::Optimal
    }

    fn value(&self, variable: Variable) -> f64 {
        self.model
            .position(variable)
            .and_then(|position| self.values.get(position))
            .copied()
            .unwrap_or(0.0)
    }
}
