//! Hasher selection for snapshot tables
//!
//! Snapshot tables hash raw path bytes. With the `gxhash` feature enabled the
//! table uses gxhash's `GxBuildHasher`, which is considerably faster on
//! machines with AES-NI and SSE2. Without it (the default, so the crate builds
//! on any CPU) the std `RandomState` is used.

/// Hasher type that uses GxBuildHasher when available, std otherwise
#[cfg(feature = "gxhash")]
pub type KeyHasher = gxhash::GxBuildHasher;

/// Hasher type that uses GxBuildHasher when available, std otherwise
#[cfg(not(feature = "gxhash"))]
pub type KeyHasher = std::hash::RandomState;
