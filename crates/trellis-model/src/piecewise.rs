//! Piecewise linearization of power-law capital-cost curves.
//!
//! Equipment cost follows the economy-of-scale law
//! `C(x) = escalation * C_ref * (x / x_ref)^m`. The MILP cannot carry the
//! power law directly, so each costed unit gets an ordered breakpoint table
//! that the assembler embeds through a convex-combination (lambda) encoding.

use trellis_core::{CapexCurve, EconomicSettings, TrellisError, TrellisResult};

/// Ordered `(x, y)` breakpoints of one linearized cost curve.
///
/// `x` is capacity in t/h, `y` is escalated equipment cost in EUR. Both are
/// strictly increasing in index and start at the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoints {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Breakpoints {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Number of linear segments between consecutive breakpoints.
    pub fn segments(&self) -> usize {
        self.x.len().saturating_sub(1)
    }
}

/// Linearize `curve` over `[0, max_capacity]` with `segments` equal-width
/// segments.
///
/// `reference_cost` is passed separately from the curve so a mutated
/// parameter store value takes effect on re-assembly. A missing cost-index
/// entry for the curve's reference year surfaces as a configuration error
/// from [`EconomicSettings::escalation_factor`].
pub fn linearize(
    curve: &CapexCurve,
    reference_cost: f64,
    economics: &EconomicSettings,
    max_capacity: f64,
    segments: usize,
) -> TrellisResult<Breakpoints> {
    if segments == 0 {
        return Err(TrellisError::Config(
            "capex linearization needs at least one segment".into(),
        ));
    }
    if !(max_capacity > 0.0) || !(curve.reference_capacity > 0.0) {
        return Err(TrellisError::Config(format!(
            "capex linearization needs positive capacities, got max {} and reference {}",
            max_capacity, curve.reference_capacity
        )));
    }
    let escalation = economics.escalation_factor(curve.reference_year)?;

    let mut x = Vec::with_capacity(segments + 1);
    let mut y = Vec::with_capacity(segments + 1);
    for j in 0..=segments {
        let cap = max_capacity * j as f64 / segments as f64;
        x.push(cap);
        y.push(escalation * reference_cost * (cap / curve.reference_capacity).powf(curve.scale_exponent));
    }
    Ok(Breakpoints { x, y })
}

/// Linear interpolation on a breakpoint table; exact at breakpoints.
pub fn interpolate(bp: &Breakpoints, x: f64) -> TrellisResult<f64> {
    if bp.len() < 2 {
        return Err(TrellisError::Config(
            "interpolation needs at least two breakpoints".into(),
        ));
    }
    let first = bp.x[0];
    let last = bp.x[bp.len() - 1];
    if x < first || x > last {
        return Err(TrellisError::Config(format!(
            "capacity {} outside linearized range [{}, {}]",
            x, first, last
        )));
    }
    for j in 0..bp.segments() {
        let (x0, x1) = (bp.x[j], bp.x[j + 1]);
        if x <= x1 {
            if (x1 - x0).abs() < 1e-12 {
                return Ok(bp.y[j]);
            }
            let t = (x - x0) / (x1 - x0);
            return Ok(bp.y[j] + t * (bp.y[j + 1] - bp.y[j]));
        }
    }
    Ok(bp.y[bp.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> CapexCurve {
        CapexCurve {
            reference_capacity: 10.0,
            reference_cost: 1_000_000.0,
            scale_exponent: 0.7,
            reference_year: 2018,
        }
    }

    fn economics() -> EconomicSettings {
        let mut econ = EconomicSettings::default();
        // unity escalation keeps expected values easy to read
        econ.current_year = 2018;
        econ
    }

    #[test]
    fn test_breakpoints_start_at_origin_and_reach_max() {
        let bp = linearize(&curve(), 1_000_000.0, &economics(), 20.0, 4).unwrap();
        assert_eq!(bp.len(), 5);
        assert_eq!(bp.x[0], 0.0);
        assert_eq!(bp.y[0], 0.0);
        assert!((bp.x[4] - 20.0).abs() < 1e-12);
        // C(20) = 1e6 * (20/10)^0.7
        let expected = 1_000_000.0 * 2.0_f64.powf(0.7);
        assert!((bp.y[4] - expected).abs() < 1.0);
    }

    #[test]
    fn test_interpolation_exact_at_breakpoints() {
        let bp = linearize(&curve(), 1_000_000.0, &economics(), 20.0, 4).unwrap();
        for j in 0..bp.len() {
            let y = interpolate(&bp, bp.x[j]).unwrap();
            assert!((y - bp.y[j]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_interpolation_between_breakpoints_is_linear() {
        let bp = linearize(&curve(), 1_000_000.0, &economics(), 20.0, 4).unwrap();
        let mid = (bp.x[1] + bp.x[2]) / 2.0;
        let expected = (bp.y[1] + bp.y[2]) / 2.0;
        assert!((interpolate(&bp, mid).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_missing_reference_year_is_config_error() {
        let mut c = curve();
        c.reference_year = 1971;
        let err = linearize(&c, 1_000_000.0, &economics(), 20.0, 4).unwrap_err();
        assert!(err.to_string().contains("1971"));
    }

    #[test]
    fn test_out_of_range_interpolation_rejected() {
        let bp = linearize(&curve(), 1_000_000.0, &economics(), 20.0, 4).unwrap();
        assert!(interpolate(&bp, 25.0).is_err());
        assert!(interpolate(&bp, -1.0).is_err());
    }
}
