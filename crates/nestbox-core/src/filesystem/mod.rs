//! Filesystem management for container isolation.
//!
//! Provides the private container root and `chroot(2)` switching into it.

pub mod chroot;
pub mod rootfs;
