//! Tollgate - Distributed Admission Control
//!
//! This crate implements an HTTP admission middleware backed by a shared,
//! sliding-window quota. Every instance records admissions in the same
//! counter store, so the per-key limit holds across processes.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
