//! Linux namespace management for container isolation.
//!
//! Only the PID namespace is isolated; mount, network, user, IPC, and UTS
//! namespaces are shared with the host.

pub mod pid;
