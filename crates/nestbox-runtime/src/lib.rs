//! Container run pipeline for the Nestbox runtime.
//!
//! Pulls an image into a private root, launches the command inside it with
//! a changed root and a fresh PID namespace, and maps the result to an
//! exit status.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod engine;
pub mod exit;
pub mod interrupt;
pub mod process;
