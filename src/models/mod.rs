//! Data models for the movie catalog.
//!
//! Entries serialize as the JSON documents persisted by the catalog and
//! returned by the HTTP API.

pub mod movie;
