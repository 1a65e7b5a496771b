//! Local terminal `AgentProtocol`: commands run directly against the host's
//! dedicated multiplexer socket.

pub use super::terminal::TerminalBackend as LocalBackend;
