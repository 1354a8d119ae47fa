/// Round to two decimal places, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Betting-style odds implied by a probability expressed in percent.
///
/// `100 / probability` rounded to two decimals, or `0` when the probability is
/// not strictly positive.
pub fn implied_odds(probability: f64) -> f64 {
    if probability > 0.0 {
        round2(100.0 / probability)
    } else {
        0.0
    }
}

/// True when `probability` is a usable percentage in `[0, 100]`.
pub fn is_valid_probability(probability: f64) -> bool {
    probability.is_finite() && (0.0..=100.0).contains(&probability)
}
