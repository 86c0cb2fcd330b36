//! Charge path hardware and a minimal charge controller.
//!
//! The step-down setpoint is a PWM output behind an RC filter, one count
//! per millivolt. Charge current is the difference between the two ends of
//! the sense resistor, read as raw 12-bit ADC values.

use auxlink_core::auxlink_proto::ChargeStatus;
use auxlink_core::{Battery, ChargePath, CurrentSense};
use defmt::{debug, warn, Format};
use embassy_rp::adc::{self, Adc};
use embassy_rp::gpio::Output;
use embassy_rp::pwm::{Config as PwmConfig, Pwm};

/// Step-down output at full PWM duty.
const STEP_DOWN_FULL_SCALE_MV: u16 = 3300;

/// Step-down voltage a NiMH charge starts from.
const NIMH_CHARGE_START_MV: u16 = 1400;

/// ADC reference and resolution.
const ADC_REFERENCE_MV: u32 = 3300;
const ADC_FULL_SCALE: u32 = 4096;

/// Charging state, reported as the status word of [`ChargeStatus`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Format)]
#[repr(u16)]
enum ChargeState {
    #[default]
    Idle = 0,
    Charging = 1,
    Forced = 2,
}

/// Owns the regulator, the charge switch and the sense ADC.
pub struct Charger {
    adc: Adc<'static, adc::Async>,
    sense_high: adc::Channel<'static>,
    sense_low: adc::Channel<'static>,
    step_down: Pwm<'static>,
    step_down_config: PwmConfig,
    step_down_enable: Output<'static>,
    charge_switch: Output<'static>,
    step_down_mv: u16,
    state: ChargeState,
    last_sense: CurrentSense,
    adc_in_use: bool,
}

impl Charger {
    /// Create a charger with the regulator off and the charge path open.
    #[must_use]
    pub fn new(
        adc: Adc<'static, adc::Async>,
        sense_high: adc::Channel<'static>,
        sense_low: adc::Channel<'static>,
        step_down: Pwm<'static>,
        mut step_down_enable: Output<'static>,
        mut charge_switch: Output<'static>,
    ) -> Self {
        step_down_enable.set_low();
        charge_switch.set_low();

        let mut step_down_config = PwmConfig::default();
        step_down_config.top = STEP_DOWN_FULL_SCALE_MV;
        step_down_config.compare_a = 0;

        let mut charger = Self {
            adc,
            sense_high,
            sense_low,
            step_down,
            step_down_config,
            step_down_enable,
            charge_switch,
            step_down_mv: 0,
            state: ChargeState::Idle,
            last_sense: CurrentSense::default(),
            adc_in_use: false,
        };
        charger.apply_setpoint(0);
        charger
    }

    fn apply_setpoint(&mut self, mv: u16) {
        self.step_down_mv = mv.min(STEP_DOWN_FULL_SCALE_MV);
        self.step_down_config.compare_a = self.step_down_mv;
        self.step_down.set_config(&self.step_down_config);
    }

    async fn read_raw(&mut self, high_side: bool) -> i16 {
        let channel = if high_side {
            &mut self.sense_high
        } else {
            &mut self.sense_low
        };
        match self.adc.read(channel).await {
            Ok(raw) => i16::try_from(raw).unwrap_or(i16::MAX),
            Err(e) => {
                warn!("ADC read failed: {:?}", e);
                0
            }
        }
    }

    fn begin_charge(&mut self, mv: u16, state: ChargeState) {
        self.enable_step_down(mv);
        self.enable_charge_path();
        self.state = state;
    }

    fn end_charge(&mut self) {
        self.disable_charge_path();
        self.disable_step_down();
        self.state = ChargeState::Idle;
    }
}

fn raw_to_mv(raw: i16) -> u16 {
    let raw = u32::from(raw.max(0).unsigned_abs());
    u16::try_from(raw * ADC_REFERENCE_MV / ADC_FULL_SCALE).unwrap_or(u16::MAX)
}

impl Battery for Charger {
    fn charge_status(&mut self) -> ChargeStatus {
        let current = self.last_sense.differential();
        ChargeStatus {
            status: self.state as u16,
            battery_mv: raw_to_mv(self.last_sense.low),
            charge_current: i16::try_from(current).unwrap_or(i16::MAX),
            stepdown_mv: self.step_down_mv,
            dac_register: self.step_down_config.compare_a,
        }
    }

    fn start_using_adc(&mut self) {
        self.adc_in_use = true;
    }

    fn stop_using_adc(&mut self) {
        self.adc_in_use = false;
    }

    fn start_nimh_charge(&mut self) {
        if !self.adc_in_use {
            warn!("charge started without ADC in use");
        }
        debug!("NiMH charge start");
        self.begin_charge(NIMH_CHARGE_START_MV, ChargeState::Charging);
    }

    fn stop_charge(&mut self) {
        debug!("charge stop");
        self.end_charge();
    }

    fn force_charge_voltage(&mut self, mv: u16) {
        debug!("forcing charge voltage {} mV", mv);
        self.begin_charge(mv, ChargeState::Forced);
    }

    fn stop_forced_charge(&mut self) {
        if self.state == ChargeState::Forced {
            self.end_charge();
        }
    }
}

impl ChargePath for Charger {
    fn enable_step_down(&mut self, mv: u16) {
        self.apply_setpoint(mv);
        self.step_down_enable.set_high();
    }

    fn set_step_down_voltage(&mut self, mv: u16) {
        self.apply_setpoint(mv);
    }

    fn disable_step_down(&mut self) {
        self.step_down_enable.set_low();
        self.apply_setpoint(0);
    }

    fn enable_charge_path(&mut self) {
        self.charge_switch.set_high();
    }

    fn disable_charge_path(&mut self) {
        self.charge_switch.set_low();
    }

    fn restart_current_sense(&mut self) {
        // Conversions run on demand; nothing is in flight between samples
        self.last_sense = CurrentSense::default();
    }

    async fn sample_current_sense(&mut self) -> CurrentSense {
        let high = self.read_raw(true).await;
        let low = self.read_raw(false).await;
        self.last_sense = CurrentSense { high, low };
        self.last_sense
    }
}
