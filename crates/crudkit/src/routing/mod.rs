//! Route resolution: typed path parameters, per-service route tables, and
//! the URL builder.
//!
//! - [`params`]: [`PathParam`] variants (id, query, version, method, child).
//! - [`table`]: [`Operation`] and [`RouteTable`] templates with `{0}` and
//!   `{ver}` placeholders.
//! - [`builder`]: [`RouteBuilder::build`], which turns a template and a
//!   param list into the final URL.

pub mod builder;
pub mod params;
pub mod table;

pub use builder::{RouteBuilder, VERSION_PLACEHOLDER};
pub use params::{PathParam, PathParamVecExt};
pub use table::{Operation, RouteTable};
