//! Dense convex quadratic programs on top of the Clarabel interior-point
//! solver.
//!
//! minimize  ½ x'Px + q'x
//! subject to  a_k'x = b_k,  lower <= x <= upper
//!
//! P only needs to be positive semidefinite, so singular covariance matrices
//! (riskless assets) are fine. The cost is rescaled so its largest entry is
//! one; daily-scale covariances would otherwise sit far below the solver's
//! absolute tolerances.

use clarabel::algebra::*;
use clarabel::solver::*;
use ndarray::{Array1, Array2};
use tracing::debug;

use super::SolverSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpStatus {
    Solved,
    PrimalInfeasible,
    MaxIterationsReached,
    NumericalError,
}

impl From<SolverStatus> for QpStatus {
    fn from(status: SolverStatus) -> Self {
        match status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => Self::Solved,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                Self::PrimalInfeasible
            }
            SolverStatus::MaxIterations | SolverStatus::MaxTime => Self::MaxIterationsReached,
            _ => Self::NumericalError,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QpSolution {
    pub x: Vec<f64>,
    pub status: QpStatus,
    pub iterations: u64,
}

#[derive(Debug, Clone)]
pub struct QuadraticProgram {
    p: Array2<f64>,
    q: Array1<f64>,
    equalities: Vec<(Vec<f64>, f64)>,
    lower: f64,
    upper: f64,
}

impl QuadraticProgram {
    pub fn new(p: Array2<f64>, q: Array1<f64>) -> Self {
        Self {
            p,
            q,
            equalities: Vec::new(),
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    pub fn n_variables(&self) -> usize {
        self.q.len()
    }

    /// a'x = rhs
    pub fn with_equality(mut self, a: &[f64], rhs: f64) -> Self {
        self.equalities.push((a.to_vec(), rhs));
        self
    }

    /// lower <= x_i <= upper for every variable. Infinite bounds are skipped.
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn solve(&self, settings: &SolverSettings) -> QpSolution {
        let n = self.n_variables();

        let cost_norm = self
            .p
            .iter()
            .chain(self.q.iter())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let cost_scale = if cost_norm > 0.0 { 1.0 / cost_norm } else { 1.0 };
        let p = upper_triangle(&self.p, cost_scale);
        let q: Vec<f64> = self.q.iter().map(|v| v * cost_scale).collect();

        // rows are stacked as [equalities; x >= lower; x <= upper], each in
        // the form a'x + s = b with s in the row's cone
        let mut rows: Vec<(Vec<(usize, f64)>, f64)> = Vec::new();
        for (a, rhs) in &self.equalities {
            let norm = a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
            let norm = if norm > 0.0 { norm } else { 1.0 };
            let entries = a
                .iter()
                .enumerate()
                .filter(|(_, v)| **v != 0.0)
                .map(|(j, v)| (j, v / norm))
                .collect();
            rows.push((entries, rhs / norm));
        }
        let n_equalities = rows.len();
        if self.lower.is_finite() {
            for j in 0..n {
                rows.push((vec![(j, -1.0)], -self.lower));
            }
        }
        if self.upper.is_finite() {
            for j in 0..n {
                rows.push((vec![(j, 1.0)], self.upper));
            }
        }
        let n_inequalities = rows.len() - n_equalities;

        let a = constraint_matrix(&rows, n);
        let b: Vec<f64> = rows.iter().map(|(_, rhs)| *rhs).collect();
        let mut cones: Vec<SupportedConeT<f64>> = Vec::with_capacity(2);
        if n_equalities > 0 {
            cones.push(ZeroConeT(n_equalities));
        }
        if n_inequalities > 0 {
            cones.push(NonnegativeConeT(n_inequalities));
        }

        let solver_settings = match DefaultSettingsBuilder::default()
            .max_iter(settings.max_iterations)
            .tol_gap_abs(settings.tol_gap_abs)
            .tol_gap_rel(settings.tol_gap_rel)
            .tol_feas(settings.tol_feas)
            .tol_infeas_abs(settings.tol_infeas)
            .tol_infeas_rel(settings.tol_infeas)
            .verbose(false)
            .build()
        {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "invalid qp settings");
                return self.failed(0);
            }
        };

        let mut solver = match DefaultSolver::new(&p, &q, &a, &b, &cones, solver_settings) {
            Ok(s) => s,
            Err(e) => {
                debug!(error = ?e, "qp data rejected");
                return self.failed(0);
            }
        };
        solver.solve();

        let status = QpStatus::from(solver.solution.status);
        let iterations = solver.solution.iterations as u64;
        debug!(?status, iterations, "qp finished");
        if solver.solution.x.iter().any(|v| !v.is_finite()) {
            return self.failed(iterations);
        }
        QpSolution {
            x: solver.solution.x.clone(),
            status,
            iterations,
        }
    }

    fn failed(&self, iterations: u64) -> QpSolution {
        QpSolution {
            x: vec![0.0; self.n_variables()],
            status: QpStatus::NumericalError,
            iterations,
        }
    }
}

/// Upper triangle of a symmetric matrix in compressed-column form.
fn upper_triangle(m: &Array2<f64>, scale: f64) -> CscMatrix<f64> {
    let n = m.ncols();
    let mut colptr = Vec::with_capacity(n + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();
    colptr.push(0);
    for j in 0..n {
        for i in 0..=j {
            let v = m[[i, j]];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v * scale);
            }
        }
        colptr.push(nzval.len());
    }
    CscMatrix::new(n, n, colptr, rowval, nzval)
}

fn constraint_matrix(rows: &[(Vec<(usize, f64)>, f64)], n: usize) -> CscMatrix<f64> {
    let mut colptr = Vec::with_capacity(n + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();
    colptr.push(0);
    for j in 0..n {
        for (i, (entries, _)) in rows.iter().enumerate() {
            if let Some((_, v)) = entries.iter().find(|(col, _)| *col == j) {
                rowval.push(i);
                nzval.push(*v);
            }
        }
        colptr.push(nzval.len());
    }
    CscMatrix::new(rows.len(), n, colptr, rowval, nzval)
}
