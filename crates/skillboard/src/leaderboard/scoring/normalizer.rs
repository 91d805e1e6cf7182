/// Upper bound of the common score scale.
pub const SCALE_MAX: f64 = 100.0;

/// Linearly rescale `value` from `[min, max]` onto `[0, 100]`, clamping out-of-range input.
///
/// A degenerate range (`max == min`) yields 0, as does a NaN value.
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    if span == 0.0 || value.is_nan() || span.is_nan() {
        return 0.0;
    }

    let scaled = (value - min) / span * SCALE_MAX;
    if scaled.is_nan() {
        return 0.0;
    }
    scaled.clamp(0.0, SCALE_MAX)
}
