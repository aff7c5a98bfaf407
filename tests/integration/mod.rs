//! Integration test suite for hive.
//!
//! These tests drive whole components together against a real git
//! repository and the in-memory session host, so they need git but no
//! tmux server.
//!
//! # Test Categories
//!
//! - `lifecycle`: bring-up, teardown and restart across slots with real worktrees
//! - `aggregate`: what the dashboard sees for each slot
//! - `config`: layered config through the public store
//! - `keys`: modal dispatch and the key tables a layout installs

mod fixtures;

mod aggregate;
mod config;
mod keys;
mod lifecycle;
