//! Shared primitive types and limits.

/// Plugin-assigned parameter identifier. Stable, not necessarily contiguous.
pub type ParameterId = u32;

/// Normalized parameter value in `0.0..=1.0`.
pub type ParameterValue = f64;

/// Maximum channel count accepted on a negotiated bus.
pub const MAX_CHANNELS: usize = 32;

/// Maximum block size accepted at setup.
pub const MAX_BLOCK_SIZE: usize = 1 << 16;
