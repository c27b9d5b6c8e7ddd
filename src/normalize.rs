//! Address canonicalization for cross-source matching.
//!
//! MLS addresses are free-form strings; county addresses are synthesized from
//! structured fields. Both sides go through `normalize` before any join, so
//! the replacement table lives here and nowhere else.

/// Ordered whole-token replacements: long-form street types and directionals
/// to their standard abbreviations.
const REPLACEMENTS: &[(&str, &str)] = &[
    ("STREET", "ST"),
    ("AVENUE", "AVE"),
    ("BOULEVARD", "BLVD"),
    ("DRIVE", "DR"),
    ("LANE", "LN"),
    ("COURT", "CT"),
    ("PLACE", "PL"),
    ("ROAD", "RD"),
    ("CIRCLE", "CIR"),
    ("NORTH", "N"),
    ("SOUTH", "S"),
    ("EAST", "E"),
    ("WEST", "W"),
    ("HIGHWAY", "HWY"),
    ("PARKWAY", "PKWY"),
    ("TERRACE", "TER"),
];

/// Canonical comparison key for an address. Total and deterministic; never
/// displayed to a user. Empty output means "no usable address" — the linker
/// must never treat two empty keys as a match.
pub fn normalize(addr: &str) -> String {
    let upper = addr.trim().to_uppercase();
    let stripped: String = upper
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();

    stripped
        .split_whitespace()
        .map(|token| {
            REPLACEMENTS
                .iter()
                .find(|(full, _)| *full == token)
                .map(|&(_, abbr)| abbr)
                .unwrap_or(token)
        })
        .collect::<Vec<_>>()
        .join(" ")
}
