use chain_core::StrikeExposure;

/// Price where net gamma exposure changes sign, from per-strike aggregates.
pub fn find_gamma_flip(strikes: &[StrikeExposure]) -> Option<f64> {
    let points: Vec<(f64, f64)> = strikes.iter().map(|s| (s.strike, s.net_gamma_exposure)).collect();
    gamma_flip_from_points(&points)
}

/// First sign change in `(strike, net_gex)` scanning up from the lowest
/// strike, linearly interpolated by exposure magnitude.
///
/// A pair only counts when the two exposures have strictly opposite signs.
pub fn gamma_flip_from_points(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }

    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    sorted.windows(2).find_map(|pair| {
        let (k0, g0) = pair[0];
        let (k1, g1) = pair[1];
        if g0 * g1 < 0.0 {
            let weight = g0.abs() / (g0.abs() + g1.abs());
            Some(k0 + weight * (k1 - k0))
        } else {
            None
        }
    })
}
