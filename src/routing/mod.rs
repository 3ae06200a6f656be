// src/routing/mod.rs
pub mod estimator;
pub mod path_finder;
pub mod router;
