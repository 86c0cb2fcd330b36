//! Functional self-test of the radio and the battery charge path.
//!
//! Run at the factory on request of the main controller:
//!
//! 1. The radio stack must report a version once started.
//! 2. With the regulator on at a safe voltage and the charge path open, no
//!    current may flow.
//! 3. With the charge path closed, ramping the regulator up from a low
//!    voltage must produce charge current before an upper bound is hit.
//!
//! Whatever the outcome, the charge path and the regulator are off when
//! [`run`] returns.

use crate::config::SelfTestConfig;
use crate::error::SelfTestFailure;
use crate::ports::{ChargePath, Radio, System};

/// Run the test. The radio must already have been started.
pub async fn run<D>(device: &mut D, config: &SelfTestConfig) -> Result<(), SelfTestFailure>
where
    D: Radio + ChargePath + System,
{
    if device.radio_sdk_version() == 0 {
        return Err(SelfTestFailure::RadioNotReady);
    }

    device.enable_step_down(config.leakage_check_mv);
    let result = check_charge_path(device, config).await;

    device.disable_charge_path();
    device.delay_ms(config.shutdown_delay_ms).await;
    device.disable_step_down();
    result
}

async fn check_charge_path<D>(device: &mut D, config: &SelfTestConfig) -> Result<(), SelfTestFailure>
where
    D: ChargePath + System,
{
    // First conversion after the regulator comes up is not settled
    let _ = device.sample_current_sense().await;
    let leakage = device.sample_current_sense().await;
    if leakage.differential() > config.leakage_threshold {
        warn!("leakage with charge path open: {}", leakage.differential());
        return Err(SelfTestFailure::ChargePath);
    }

    let mut mv = config.ramp_start_mv;
    device.restart_current_sense();
    device.set_step_down_voltage(mv);
    device.delay_ms(config.ramp_settle_ms).await;
    device.enable_charge_path();

    loop {
        let sense = device.sample_current_sense().await;
        if sense.differential() > config.ramp_end_current {
            debug!("charge current at {} mV", mv);
            return Ok(());
        }

        mv = mv.saturating_add(config.ramp_step_mv);
        // A disconnected charge path lets the battery side follow the regulator
        if sense.low >= config.ramp_max_sense || mv > config.ramp_limit_mv {
            warn!("no charge current, stopped at {} mV", mv);
            return Err(SelfTestFailure::ChargePath);
        }
        device.set_step_down_voltage(mv);
        device.restart_current_sense();
    }
}
