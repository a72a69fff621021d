//! the test_utils folder here will share utils or fixtures between unit
//! tests of different modules
mod common;

pub use common::*;
