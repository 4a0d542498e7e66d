//! Acting-user context. Every mutating store operation runs on behalf of a
//! `Principal`; a handle without one fails those with `Unauthenticated`.

mod principal;

pub use principal::Principal;
