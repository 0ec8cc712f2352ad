//! (μ/μ_w, λ) CMA-ES following Hansen's tutorial, with best-ever tracking.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CmaesOptions {
    pub sigma: f64,
    pub max_evaluations: usize,
    /// Generations without relative improvement before stopping
    pub stall_generations: usize,
    pub stall_tolerance: f64,
    /// Stop as soon as the best value is at or below this
    pub target: f64,
    /// Samples per generation; `None` uses `4 + 3 ln n`
    pub population: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Budget,
    Stall,
    Target,
    /// Covariance or step size no longer usable
    Degenerate,
}

#[derive(Debug, Clone)]
pub struct CmaesOutcome {
    pub best: DVector<f64>,
    pub best_value: f64,
    pub evaluations: usize,
    pub generations: usize,
    /// Runs started after the first one
    pub restarts: usize,
    pub stop: StopReason,
}

/// Minimise `f` starting from `x0`.
pub fn minimize<R: Rng>(
    f: impl Fn(&DVector<f64>) -> f64,
    x0: DVector<f64>,
    options: &CmaesOptions,
    rng: &mut R,
) -> CmaesOutcome {
    let n = x0.len();
    let mut best_value = f(&x0);
    let mut evaluations = 1;
    if n == 0 || best_value <= options.target {
        return CmaesOutcome {
            best: x0,
            best_value,
            evaluations,
            generations: 0,
            restarts: 0,
            stop: StopReason::Target,
        };
    }

    let nf = n as f64;
    let lambda = options
        .population
        .unwrap_or_else(|| default_population(n))
        .max(4);
    let mu = lambda / 2;
    // stagnation patience grows with dimension, as in Hansen's tutorial
    let patience = options.stall_generations + 30 * n / lambda;
    let raw: Vec<f64> = (1..=mu)
        .map(|i| (mu as f64 + 0.5).ln() - (i as f64).ln())
        .collect();
    let raw_sum: f64 = raw.iter().sum();
    let weights: Vec<f64> = raw.iter().map(|w| w / raw_sum).collect();
    let mu_eff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

    let cc = (4.0 + mu_eff / nf) / (nf + 4.0 + 2.0 * mu_eff / nf);
    let cs = (mu_eff + 2.0) / (nf + mu_eff + 5.0);
    let c1 = 2.0 / ((nf + 1.3).powi(2) + mu_eff);
    let cmu = (1.0 - c1)
        .min(2.0 * (mu_eff - 2.0 + 1.0 / mu_eff) / ((nf + 2.0).powi(2) + mu_eff));
    let damps = 1.0 + 2.0 * (((mu_eff - 1.0) / (nf + 1.0)).sqrt() - 1.0).max(0.0) + cs;
    let chi_n = nf.sqrt() * (1.0 - 1.0 / (4.0 * nf) + 1.0 / (21.0 * nf * nf));

    let mut mean = x0.clone();
    let mut best = x0;
    let mut sigma = options.sigma;
    let mut cov = DMatrix::<f64>::identity(n, n);
    let mut pc = DVector::<f64>::zeros(n);
    let mut ps = DVector::<f64>::zeros(n);
    let mut generations = 0;
    let mut stalled = 0;

    let stop = loop {
        if evaluations + lambda > options.max_evaluations {
            break StopReason::Budget;
        }

        let eigen = SymmetricEigen::new(cov.clone());
        if eigen.eigenvalues.iter().any(|&e| !(e.is_finite() && e > 0.0)) || !sigma.is_finite() {
            break StopReason::Degenerate;
        }
        let basis = eigen.eigenvectors;
        let scales = eigen.eigenvalues.map(f64::sqrt);

        let mut population: Vec<(f64, DVector<f64>, DVector<f64>)> = (0..lambda)
            .map(|_| {
                let z = DVector::<f64>::from_fn(n, |_, _| rng.sample(StandardNormal));
                let y = &basis * z.component_mul(&scales);
                let x = &mean + sigma * &y;
                (f(&x), x, y)
            })
            .collect();
        evaluations += lambda;
        generations += 1;
        population.sort_by(|a, b| a.0.total_cmp(&b.0));

        let previous_best = best_value;
        if population[0].0 < best_value {
            best_value = population[0].0;
            best = population[0].1.clone();
        }
        if best_value <= options.target {
            break StopReason::Target;
        }
        let improvement = previous_best - best_value;
        if improvement > options.stall_tolerance * previous_best.abs().max(f64::MIN_POSITIVE) {
            stalled = 0;
        } else {
            stalled += 1;
            if stalled >= patience {
                break StopReason::Stall;
            }
        }

        let y_w = population
            .iter()
            .take(mu)
            .zip(&weights)
            .fold(DVector::<f64>::zeros(n), |acc, ((_, _, y), &w)| acc + y * w);
        mean += sigma * &y_w;

        let inv_sqrt =
            &basis * DMatrix::from_diagonal(&scales.map(|s| 1.0 / s)) * basis.transpose();
        ps = (1.0 - cs) * &ps + (cs * (2.0 - cs) * mu_eff).sqrt() * (&inv_sqrt * &y_w);
        let ps_norm = ps.norm() / (1.0 - (1.0 - cs).powi(2 * generations as i32)).sqrt();
        let hsig = if ps_norm / chi_n < 1.4 + 2.0 / (nf + 1.0) { 1.0 } else { 0.0 };
        pc = (1.0 - cc) * &pc + hsig * (cc * (2.0 - cc) * mu_eff).sqrt() * &y_w;

        let rank_mu = population
            .iter()
            .take(mu)
            .zip(&weights)
            .fold(DMatrix::<f64>::zeros(n, n), |acc, ((_, _, y), &w)| {
                acc + w * (y * y.transpose())
            });
        cov = (1.0 - c1 - cmu) * &cov
            + c1 * (&pc * pc.transpose() + (1.0 - hsig) * cc * (2.0 - cc) * &cov)
            + cmu * rank_mu;
        cov = 0.5 * (&cov + cov.transpose());

        sigma *= ((cs / damps) * (ps.norm() / chi_n - 1.0)).exp();
    };

    debug!(evaluations, generations, best_value, lambda, ?stop, "cma-es finished");
    CmaesOutcome {
        best,
        best_value,
        evaluations,
        generations,
        restarts: 0,
        stop,
    }
}

fn default_population(n: usize) -> usize {
    4 + (3.0 * (n.max(1) as f64).ln()).floor() as usize
}

/// IPOP restarts around [`minimize`].
///
/// A run that stalls or degenerates above the target is followed by a new
/// run with twice the population, until the target is met, `max_restarts`
/// runs have been added or `options.max_evaluations` is spent in total.
/// Restarts alternate between the best point so far and `x0`.
pub fn minimize_with_restarts<R: Rng>(
    f: impl Fn(&DVector<f64>) -> f64,
    x0: DVector<f64>,
    options: &CmaesOptions,
    max_restarts: usize,
    rng: &mut R,
) -> CmaesOutcome {
    let mut population = options.population.unwrap_or_else(|| default_population(x0.len()));
    let mut run = CmaesOptions {
        population: Some(population),
        ..*options
    };
    let mut total = minimize(&f, x0.clone(), &run, rng);

    while total.restarts < max_restarts
        && matches!(total.stop, StopReason::Stall | StopReason::Degenerate)
    {
        population *= 2;
        let remaining = options.max_evaluations.saturating_sub(total.evaluations);
        if remaining < population + 1 {
            total.stop = StopReason::Budget;
            break;
        }
        run = CmaesOptions {
            max_evaluations: remaining,
            population: Some(population),
            ..*options
        };
        let start = if total.restarts % 2 == 0 {
            total.best.clone()
        } else {
            x0.clone()
        };
        let next = minimize(&f, start, &run, rng);
        total.restarts += 1;
        total.evaluations += next.evaluations;
        total.generations += next.generations;
        total.stop = next.stop;
        if next.best_value < total.best_value {
            total.best_value = next.best_value;
            total.best = next.best;
        }
        debug!(
            restart = total.restarts,
            population,
            best_value = total.best_value,
            "cma-es restart finished"
        );
    }
    total
}
