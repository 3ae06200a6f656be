// src/pricing/mod.rs
pub mod acceptable;
pub mod fees;
pub mod price_impact;
