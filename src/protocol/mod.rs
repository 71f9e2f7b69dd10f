//! The three request dialects the connection loop can speak (spec.md §4.1-§4.4):
//! binary, memcached-compatible text, and a minimal HTTP/1.1 surface. Each
//! decodes into the same [`crate::command::Command`], so everything
//! downstream of dialect-sniffing (router, access mask, handlers, mutation
//! wrapper) is dialect-agnostic.

pub mod binary;
pub mod http;
pub mod text;
