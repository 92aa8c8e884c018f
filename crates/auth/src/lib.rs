//! `studyhub-auth`: identity and ownership boundary.
//!
//! Decoupled from HTTP and storage: the API layer turns a bearer token into a
//! [`Principal`], and every course- or material-scoped operation goes through
//! [`authorize_owner`] before touching the store.

pub mod claims;
pub mod guard;
pub mod principal;

pub use claims::{validate_claims, Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError};
pub use guard::{authorize_owner, check_owner, AccessError, Owned};
pub use principal::Principal;
