//! Authentication infrastructure module
//!
//! Bearer token handling for the HTTP boundary.

mod jwt;

pub use jwt::{JwtClaims, JwtConfig, JwtGenerator, JwtService};
