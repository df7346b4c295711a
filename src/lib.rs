//! Cartolina: a single-flight social-preview image service.
//!
//! An axum front door accepts "render this card" requests and answers
//! `202 Accepted` immediately; an in-memory FIFO queue then executes each
//! task strictly in arrival order, one at a time: headless-Chromium render,
//! object-storage upload, and optionally a record update persisting the
//! published URL. State lives only in process memory; restarts forget
//! everything except what already reached storage.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
