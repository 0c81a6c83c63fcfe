#![allow(dead_code)]

pub mod world;

pub use world::{Harness, HarnessBuilder};
