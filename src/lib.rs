//! geocascade: a cascading Country → Province → City location resolver.
//!
//! The [`location`] module holds the engine; [`server`] exposes resolver
//! sessions over HTTP and [`config`] carries the construction-time settings
//! both the CLI and the server share. [`picker`] decodes command-line
//! picker input.

pub mod config;
pub mod location;
pub mod picker;
pub mod server;
