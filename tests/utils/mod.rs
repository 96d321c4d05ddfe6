#![allow(dead_code)]
// Each integration test binary compiles this module separately and only
// uses a subset of it.

pub mod factories;
pub mod helpers;
