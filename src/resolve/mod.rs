//! Resolver tools.
//!
//! Resolvers map user vocabulary onto FDA vocabulary: device terms to
//! product codes (local GUDID catalog), company names to FDA firm-name
//! variants, geographic terms to per-country manufacturer activity.
//! Their structured outputs merge into the session's
//! [`crate::core::ResolverContext`] for later turns to reuse.

mod device;
mod location;
mod manufacturer;

pub use device::DeviceResolver;
pub use location::LocationResolver;
pub use manufacturer::ManufacturerResolver;
