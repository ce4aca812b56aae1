use crate::types::{FireError, FireResult};
use num_complex::Complex64;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Largest tolerated imaginary residue of the inverse transform
const IMAGINARY_TOLERANCE: f64 = 1e-6;

/// Distribution of the number of burned pixels in a cell
#[derive(Debug, Clone, PartialEq)]
pub struct PoissonBinomial {
    /// P(X = m) for m in 0..=n
    pub pmf: Vec<f64>,
    /// Closed-form mean, sum of p
    pub mean: f64,
    /// Closed-form variance, sum of p(1 - p)
    pub variance: f64,
}

impl PoissonBinomial {
    pub fn trials(&self) -> usize {
        self.pmf.len() - 1
    }

    /// Mean recomputed from the PMF
    pub fn pmf_mean(&self) -> f64 {
        self.pmf.iter().enumerate().map(|(m, p)| m as f64 * p).sum()
    }

    /// Variance recomputed from the PMF
    pub fn pmf_variance(&self) -> f64 {
        let mean = self.pmf_mean();
        self.pmf
            .iter()
            .enumerate()
            .map(|(m, p)| {
                let d = m as f64 - mean;
                d * d * p
            })
            .sum()
    }
}

/// Drop NaN probabilities and reject anything else outside [0, 1]
fn valid_probabilities(probabilities: &[f32]) -> FireResult<Vec<f64>> {
    let mut valid = Vec::with_capacity(probabilities.len());
    for &p in probabilities {
        if p.is_nan() {
            continue;
        }
        if !(0.0..=1.0).contains(&p) {
            return Err(FireError::InvalidArgument(format!(
                "Burn probability {} outside [0, 1]",
                p
            )));
        }
        valid.push(p as f64);
    }
    Ok(valid)
}

/// Variance of the burned pixel count, sum of p(1 - p)
fn closed_form_variance(probabilities: &[f64]) -> f64 {
    probabilities.iter().map(|p| p * (1.0 - p)).sum()
}

/// Characteristic function C(k) = prod(1 - p + p w_k), evaluated in log-polar form
fn characteristic(probabilities: &[f64], k: usize, points: usize) -> Complex64 {
    let omega = Complex64::from_polar(1.0, 2.0 * PI * k as f64 / points as f64);

    let mut log_modulus = 0.0;
    let mut argument = 0.0;
    for &p in probabilities {
        let z = Complex64::new(1.0 - p, 0.0) + omega * p;
        let modulus = z.norm();
        if modulus == 0.0 {
            return Complex64::new(0.0, 0.0);
        }
        log_modulus += modulus.ln();
        argument += z.arg();
    }

    Complex64::from_polar(log_modulus.exp(), argument)
}

#[cfg(feature = "parallel")]
fn characteristic_half(probabilities: &[f64], points: usize) -> Vec<Complex64> {
    use rayon::prelude::*;

    (0..=points / 2)
        .into_par_iter()
        .map(|k| characteristic(probabilities, k, points))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn characteristic_half(probabilities: &[f64], points: usize) -> Vec<Complex64> {
    (0..=points / 2)
        .map(|k| characteristic(probabilities, k, points))
        .collect()
}

/// Exact Poisson-binomial distribution of independent Bernoulli trials
///
/// NaN probabilities are skipped. The PMF is recovered from the
/// characteristic function with a forward FFT over `n + 1` points.
pub fn poisson_binomial(probabilities: &[f32]) -> FireResult<PoissonBinomial> {
    let probs = valid_probabilities(probabilities)?;
    let mean: f64 = probs.iter().sum();
    let variance = closed_form_variance(&probs);

    let pmf = match probs.len() {
        0 => vec![1.0],
        1 => vec![1.0 - probs[0], probs[0]],
        n => dft_pmf(&probs, n + 1),
    };

    Ok(PoissonBinomial { pmf, mean, variance })
}

fn dft_pmf(probs: &[f64], points: usize) -> Vec<f64> {
    log::debug!("Computing Poisson-binomial PMF over {} points", points);

    let half = characteristic_half(probs, points);
    let mut spectrum = vec![Complex64::new(0.0, 0.0); points];
    for (k, c) in half.iter().enumerate() {
        spectrum[k] = *c;
    }
    // C(n + 1 - k) = conj(C(k))
    for k in (points / 2 + 1)..points {
        spectrum[k] = spectrum[points - k].conj();
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(points);
    fft.process(&mut spectrum);

    let scale = 1.0 / points as f64;
    let max_imaginary = spectrum
        .iter()
        .map(|c| (c.im * scale).abs())
        .fold(0.0, f64::max);
    if max_imaginary > IMAGINARY_TOLERANCE {
        log::warn!(
            "Poisson-binomial PMF has imaginary residue {:.3e} over {} points",
            max_imaginary,
            points
        );
    }

    let mut pmf: Vec<f64> = spectrum.iter().map(|c| (c.re * scale).max(0.0)).collect();
    let total: f64 = pmf.iter().sum();
    if total > 0.0 {
        pmf.iter_mut().for_each(|p| *p /= total);
    }
    pmf
}

/// Uncertainty of one cell's burned-area estimate
#[derive(Debug, Clone, PartialEq)]
pub struct UncertaintyEstimate {
    /// Full distribution, present when the pixel count is within the PMF limit
    pub distribution: Option<PoissonBinomial>,
    /// Pixels that contributed a valid probability
    pub pixel_count: usize,
    /// Standard error attributed to each pixel (area units)
    pub error_per_pixel: f64,
    /// Standard error of the burned area (area units)
    pub total_error: f64,
}

impl UncertaintyEstimate {
    fn zero(pixel_count: usize) -> Self {
        Self {
            distribution: None,
            pixel_count,
            error_per_pixel: 0.0,
            total_error: 0.0,
        }
    }
}

/// Uncertainty engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncertaintyParams {
    /// Area of one pixel
    pub pixel_area: f64,
    /// Largest pixel count for which the PMF is materialized
    pub pmf_pixel_limit: usize,
}

impl Default for UncertaintyParams {
    fn default() -> Self {
        Self {
            pixel_area: 1.0,         // errors in pixel units
            pmf_pixel_limit: 100_000, // about 1.6 MB of PMF per cell
        }
    }
}

/// Propagates per-pixel burn probabilities into a burned-area error
pub struct UncertaintyEngine {
    params: UncertaintyParams,
}

impl UncertaintyEngine {
    pub fn new() -> Self {
        Self {
            params: UncertaintyParams::default(),
        }
    }

    pub fn with_params(params: UncertaintyParams) -> Self {
        Self { params }
    }

    pub fn with_pixel_area(pixel_area: f64) -> Self {
        Self {
            params: UncertaintyParams {
                pixel_area,
                ..UncertaintyParams::default()
            },
        }
    }

    pub fn params(&self) -> &UncertaintyParams {
        &self.params
    }

    /// Standard error of the burned area for pixels of constant area
    ///
    /// Linear in the pixel count; never builds the PMF.
    pub fn standard_error(&self, probabilities: &[f32]) -> FireResult<f64> {
        let probs = valid_probabilities(probabilities)?;
        Ok(closed_form_variance(&probs).sqrt() * self.params.pixel_area)
    }

    /// Error of the burned area for pixels of constant area
    ///
    /// The PMF is materialized up to `pmf_pixel_limit` pixels.
    pub fn estimate(&self, probabilities: &[f32]) -> FireResult<UncertaintyEstimate> {
        let n = probabilities.iter().filter(|p| !p.is_nan()).count();
        if n == 0 {
            return Ok(UncertaintyEstimate::zero(0));
        }

        let (distribution, variance) = if n <= self.params.pmf_pixel_limit {
            let dist = poisson_binomial(probabilities)?;
            if !approx::abs_diff_eq!(dist.pmf_mean(), dist.mean, epsilon = 1e-6 * n as f64) {
                log::warn!(
                    "PMF mean {} differs from closed form {}",
                    dist.pmf_mean(),
                    dist.mean
                );
            }
            let variance = dist.variance;
            (Some(dist), variance)
        } else {
            (None, closed_form_variance(&valid_probabilities(probabilities)?))
        };

        let error_per_pixel = variance.sqrt() * self.params.pixel_area / n as f64;
        Ok(UncertaintyEstimate {
            distribution,
            pixel_count: n,
            error_per_pixel,
            total_error: error_per_pixel * n as f64,
        })
    }

    /// Error of the burned area for pixels with individual areas
    pub fn estimate_weighted(
        &self,
        probabilities: &[f32],
        areas: &[f64],
    ) -> FireResult<UncertaintyEstimate> {
        if probabilities.len() != areas.len() {
            return Err(FireError::InvalidArgument(format!(
                "{} probabilities but {} pixel areas",
                probabilities.len(),
                areas.len()
            )));
        }

        let mut variance = 0.0;
        let mut n = 0;
        for (&p, &area) in probabilities.iter().zip(areas) {
            if p.is_nan() {
                continue;
            }
            if !(0.0..=1.0).contains(&p) {
                return Err(FireError::InvalidArgument(format!(
                    "Burn probability {} outside [0, 1]",
                    p
                )));
            }
            let p = p as f64;
            variance += area * area * p * (1.0 - p);
            n += 1;
        }

        if n == 0 {
            return Ok(UncertaintyEstimate::zero(0));
        }

        let total_error = variance.sqrt();
        Ok(UncertaintyEstimate {
            distribution: None,
            pixel_count: n,
            error_per_pixel: total_error / n as f64,
            total_error,
        })
    }
}

impl Default for UncertaintyEngine {
    fn default() -> Self {
        Self::new()
    }
}
