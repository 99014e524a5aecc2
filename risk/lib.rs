#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod align;
pub mod artifact;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod forest;
pub mod form;
pub mod predict;
pub mod render;
pub mod survival;
