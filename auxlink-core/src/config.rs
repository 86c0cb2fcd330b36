//! Engine tuning parameters.
//!
//! The partial-dispatch margin and the self-test numbers are tuned for one
//! particular board. They are kept here as named values so a port to other
//! hardware can override them instead of editing the engine.
//!
//! Customize at compile time by creating your own const:
//!
//! ```
//! use auxlink_core::{LinkConfig, DEFAULT_CONFIG};
//!
//! const MY_CONFIG: LinkConfig = LinkConfig {
//!     request_timeout_ms: 250,
//!     ..DEFAULT_CONFIG
//! };
//! ```

/// Numbers used by the functional self-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SelfTestConfig {
    /// Address the radio is started with during the test.
    pub radio_address: [u8; 6],
    /// Regulator voltage for the leakage check (charge path left off).
    pub leakage_check_mv: u16,
    /// Current-sense differential above which the leakage check fails.
    pub leakage_threshold: i32,
    /// Regulator voltage the ramp starts from.
    pub ramp_start_mv: u16,
    /// Settling time after setting the ramp start voltage.
    pub ramp_settle_ms: u32,
    /// Regulator voltage increment per ramp step.
    pub ramp_step_mv: u16,
    /// Differential that ends the ramp successfully.
    pub ramp_end_current: i32,
    /// Sensed low-side voltage that aborts the ramp (open charge path).
    pub ramp_max_sense: i16,
    /// Commanded voltage above which the ramp aborts.
    pub ramp_limit_mv: u16,
    /// Delay between opening the charge path and turning the regulator off.
    pub shutdown_delay_ms: u32,
}

/// Link engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    /// A frame is only dispatched early while strictly more than this many
    /// bytes are still to be received, so the completion interrupt cannot
    /// fire while the snapshot is being taken.
    pub partial_safety_margin: u16,
    /// Upper bound for the sleep handshake's wait on an early-dispatched
    /// frame to finish arriving.
    pub sleep_sync_timeout_ms: u32,
    /// Upper bound for a synchronous request's reply.
    pub request_timeout_ms: u32,
    pub self_test: SelfTestConfig,
}

/// Default self-test numbers.
pub const DEFAULT_SELF_TEST: SelfTestConfig = SelfTestConfig {
    radio_address: [0xDE, 0xAD, 0xBE, 0xEF, 0x12, 0x13],
    leakage_check_mv: 1800,
    leakage_threshold: 100,
    ramp_start_mv: 1200,
    ramp_settle_ms: 5,
    ramp_step_mv: 10,
    ramp_end_current: 120,
    ramp_max_sense: 1600,
    ramp_limit_mv: 1650,
    shutdown_delay_ms: 1,
};

/// Default engine configuration.
pub const DEFAULT_CONFIG: LinkConfig = LinkConfig {
    partial_safety_margin: 20,
    sleep_sync_timeout_ms: 50,
    request_timeout_ms: 1000,
    self_test: DEFAULT_SELF_TEST,
};

impl Default for LinkConfig {
    fn default() -> Self {
        DEFAULT_CONFIG
    }
}

impl Default for SelfTestConfig {
    fn default() -> Self {
        DEFAULT_SELF_TEST
    }
}
