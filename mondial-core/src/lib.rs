//! Mondial Core - Entity Types
//!
//! Data types shared by every crate in the workspace: the geography entities,
//! store-level values, query criteria, loader configuration and the error
//! hierarchy. No I/O lives here.

mod config;
mod continent;
mod entities;
mod error;
mod filter;
mod surface;
mod value;

pub use config::*;
pub use continent::*;
pub use entities::*;
pub use error::*;
pub use filter::*;
pub use surface::*;
pub use value::*;
