//! Error types for peripheral access and real-time setup

use thiserror::Error;

/// Errors that can occur while driving the BCM2711 peripherals.
#[derive(Error, Debug)]
pub enum Error {
    /// Privileged access refused (register device or scheduling class)
    #[error("permission denied: {what} (run as root?)")]
    PermissionDenied {
        /// What was refused
        what: &'static str,
    },

    /// Register device missing, busy, or failed to map
    #[error("device unavailable: {device}: {reason}")]
    DeviceUnavailable {
        /// Device path
        device: &'static str,
        /// Underlying failure
        reason: String,
    },

    /// A software PWM channel is already running on this pin
    #[error("software PWM already active on pin {pin}")]
    AlreadyActive {
        /// BCM pin number
        pin: u8,
    },

    /// The hardware PWM controller is already claimed by a live handle
    #[error("hardware PWM controller already initialized")]
    ControllerActive,

    /// Frequency outside the realizable range (no safe clamp exists)
    #[error("invalid PWM frequency: {freq_hz} Hz")]
    InvalidFrequency {
        /// Requested frequency
        freq_hz: u32,
    },

    /// CPU core id beyond the last online core
    #[error("invalid core id {core} (valid: 0-{max})")]
    InvalidCore {
        /// Requested core
        core: usize,
        /// Highest valid core id
        max: usize,
    },

    /// System call error
    #[error("system call failed: {source}")]
    Sys {
        /// Source nix error
        #[from]
        source: nix::Error,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },
}

/// Result type for peripheral operations
pub type Result<T> = std::result::Result<T, Error>;
