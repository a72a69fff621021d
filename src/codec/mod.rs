//! Key and value codecs.
//!
//! Both run before any remote call: an input rejected here never reaches
//! the coordination service.

mod key;
mod value;

pub use key::*;
pub use value::*;
