//! # nestbox-core
//!
//! Low-level Linux isolation primitives for the Nestbox runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: cloning a child into a fresh PID namespace.
//! - **Filesystem**: `chroot(2)` root switching and the private
//!   per-invocation container root directory.
//!
//! The one unsafe system call, `clone(2)`, is encapsulated behind a
//! documented `unsafe fn` with a `// SAFETY:` note at the call site.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod namespace;
