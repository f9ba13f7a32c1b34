//! Deterministic Monte Carlo projection of a portfolio value under discretized
//! geometric Brownian motion, with an HTTP and command-line front end.

pub mod api;
pub mod core;
