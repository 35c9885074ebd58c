//! Parse, generate, and transform JVM class files
//!
//! Everything of interest lives under [`jvm`]: a lazily-decoded view of existing classes, a
//! streaming builder API for writing new ones, and composable transforms connecting the two.

pub mod jvm;
mod util;
