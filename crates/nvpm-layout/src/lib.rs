//! Field offset discovery for an opaque, externally built driver.
//!
//! The driver's structure layouts are not published and move between host
//! releases. Each interesting field is read or written by some known
//! function, so its offset is recovered by decoding that function until an
//! instruction of the expected shape turns up and taking its displacement.

mod cache;
mod catalog;
mod code;
mod layout;
mod resolver;
mod signature;

pub use cache::*;
pub use catalog::*;
pub use code::*;
pub use layout::*;
pub use resolver::*;
pub use signature::*;

/// Resolve a field offset through a shared cache.
///
/// This is a convenience wrapper around [`OffsetCache::resolve`].
pub fn resolve_offset(
    cache: &OffsetCache,
    entry: Option<CodeRegion<'_>>,
    signature: &FieldSignature,
) -> Probe {
    cache.resolve(entry, signature)
}
