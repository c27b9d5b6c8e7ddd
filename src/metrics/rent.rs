use crate::config::rent_tiers::*;

/// Monthly rent proxy from living area, used when a listing carries no
/// reported rent estimate. Smaller units command a premium per sqft.
/// Tier bounds are inclusive below, exclusive above.
pub fn estimate_rent(sqft: f64) -> f64 {
    if sqft <= 0.0 {
        return 0.0;
    }
    let rate = if sqft < SMALL_MAX_SQFT {
        SMALL_RATE
    } else if sqft <= MID_MAX_SQFT {
        MID_RATE
    } else {
        LARGE_RATE
    };
    sqft * rate
}
