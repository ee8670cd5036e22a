//! # fluxmcp-auth
//!
//! Bearer-token authentication for the MCP runtime: the [`AuthProvider`]
//! contract, an OAuth 2.0 token introspection client (RFC 7662), a TTL
//! cache to keep introspection off the hot path, and the static
//! method-to-scope policy the server's auth gate enforces.

pub mod cache;
pub mod introspection;
pub mod provider;
pub mod scopes;

pub use cache::ValidationCache;
pub use introspection::IntrospectionProvider;
pub use provider::{AuthError, AuthProvider, StaticTokenProvider, TokenValidation};
pub use scopes::{is_public_method, required_scopes};
