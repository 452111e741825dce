//! Error types for the GUI streaming layer.

use incppect_core::IncppectError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImGuiWsError {
    /// The protocol layer failed.
    #[error(transparent)]
    Protocol(#[from] IncppectError),

    /// A custom client message is not a valid input event.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Texture dimensions and pixel bytes disagree.
    #[error("invalid texture: {0}")]
    InvalidTexture(String),

    /// The listen port could not be bound.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The network thread could not be started.
    #[error("failed to spawn network thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// The service was already stopped.
    #[error("service already stopped")]
    AlreadyStopped,

    /// A recording could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A recording file is not a valid session.
    #[error("encoding error: {0}")]
    Encoding(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_are_transparent() {
        let e: ImGuiWsError = IncppectError::DuplicatePath("imgui.n_textures".into()).into();
        assert_eq!(e.to_string(), "path already registered: imgui.n_textures");
    }

    #[test]
    fn invalid_event_message() {
        let e = ImGuiWsError::InvalidEvent("bad mouse".into());
        assert_eq!(e.to_string(), "invalid event: bad mouse");
    }

    #[test]
    fn bind_error_names_the_port() {
        let e = ImGuiWsError::Bind {
            port: 3000,
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(e.to_string().starts_with("failed to bind port 3000"));
    }
}
