//! Workspace primitives: stable `.git` relocation, worktree creation, and
//! the pairing symlink swap. Each operation is idempotent when its
//! postcondition already holds, per the workspace contract.

pub mod pairing;
pub mod relocate;
pub mod worktree;

pub use worktree::{GitBackend, GitOperations};
