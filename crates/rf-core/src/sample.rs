//! Sample type

/// Audio samples are processed as f64 throughout
pub type Sample = f64;
