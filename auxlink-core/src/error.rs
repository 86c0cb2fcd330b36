//! Error types.

/// Error type for link-level operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// The peer did not answer within the configured bound.
    Timeout,
    /// The reply was shorter than its layout requires.
    MalformedReply,
}

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Timeout => write!(f, "no reply from main controller"),
            Self::MalformedReply => write!(f, "malformed reply"),
        }
    }
}

/// Error type for bonding-information recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecallError {
    /// The main controller has no record for this address.
    NotFound,
    /// The request itself failed.
    Link(LinkError),
}

impl From<LinkError> for RecallError {
    fn from(err: LinkError) -> Self {
        RecallError::Link(err)
    }
}

impl core::fmt::Display for RecallError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "no bonding information"),
            Self::Link(err) => write!(f, "{err}"),
        }
    }
}

/// Error type for keyboard emulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyboardError {
    /// The requested HID interface id is not known.
    UnknownInterface,
    /// The interface is not connected / enumerated.
    NotReady,
    /// The report could not be delivered.
    Io,
}

impl core::fmt::Display for KeyboardError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownInterface => write!(f, "unknown HID interface"),
            Self::NotReady => write!(f, "HID interface not ready"),
            Self::Io => write!(f, "HID report failed"),
        }
    }
}

/// Functional self-test failure, reported to the main controller by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SelfTestFailure {
    /// The radio stack did not come up.
    RadioNotReady,
    /// Leakage with the charge path off, or no current within the ramp.
    ChargePath,
}

impl SelfTestFailure {
    /// Result code carried in the test-done event (0 means success).
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::RadioNotReady => 1,
            Self::ChargePath => 2,
        }
    }
}

impl core::fmt::Display for SelfTestFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RadioNotReady => write!(f, "radio not ready"),
            Self::ChargePath => write!(f, "charge path anomaly"),
        }
    }
}
