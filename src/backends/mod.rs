//! Agent control plane: the `AgentProtocol` trait and its two backends
//! (local terminal, containerized terminal), plus the shared terminal
//! command builders and the Docker container lifecycle.

pub mod container;
pub mod containerized;
pub mod local;
pub mod terminal;
pub mod traits;

pub use containerized::{ContainerLaunchParams, ContainerizedBackend};
pub use local::LocalBackend;
pub use traits::{AgentProtocol, AgentStatus};
