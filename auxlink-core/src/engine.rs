//! LinkEngine: drains received frames and routes them to their handlers.
//!
//! Every call to [`LinkEngine::poll()`] runs one pass of the routine:
//!
//! 1. **Full frames.** For each channel whose fully-received flag is set,
//!    clear it, then dispatch the landed frame unless it was already
//!    dispatched early, in which case it is discarded.
//! 2. **Early dispatch.** If the frame still arriving already holds its
//!    header and all `payload_length1` bytes, claim it, copy the received
//!    prefix into a private snapshot, and dispatch the snapshot.
//!
//! A physical frame is dispatched exactly once, by whichever of the two
//! paths gets to it first. The claim in step 2 is the only place that
//! decides to dispatch early, and it runs entirely inside a critical
//! section so the completion interrupt cannot slip in between the checks,
//! the flag update and the copy.

use embassy_futures::yield_now;

use auxlink_proto::{
    Channel, Encode, Event, EventId, Frame, MessageType, FRAME_SIZE, HEADER_SIZE,
};

use crate::config::{LinkConfig, DEFAULT_CONFIG};
use crate::interpreter;
use crate::ports::{Device, HidInterface, Transport};

/// Outcome of one routine pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[must_use]
pub enum PollResult {
    /// Nothing matched the filter (or no filter was given).
    NoMatch,
    /// A control frame of the expected type was captured; read it with
    /// [`LinkEngine::reply()`].
    Matched,
}

/// Device state the control commands toggle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ControlState {
    pub radio_enabled: bool,
    pub full_sleep_requested: bool,
}

/// Which engine buffer holds the frame being dispatched.
#[derive(Clone, Copy)]
enum Source {
    Received,
    Snapshot,
}

/// Aux-side message engine for the link to the main controller.
///
/// Owns the per-channel "answered early" state, the outbound frame and the
/// receive snapshot, so every piece of state the exactly-once rule depends
/// on lives in one place.
pub struct LinkEngine<T, D> {
    transport: T,
    device: D,
    config: LinkConfig,
    answered: [bool; 3],
    control: ControlState,
    rx: Frame,
    snapshot: Frame,
    tx: Frame,
}

impl<T: Transport, D: Device> LinkEngine<T, D> {
    /// Create an engine with [`DEFAULT_CONFIG`]. Reception is not armed
    /// until [`start()`](Self::start).
    pub fn new(transport: T, device: D) -> Self {
        Self::with_config(transport, device, DEFAULT_CONFIG)
    }

    /// Create an engine with custom timing and self-test settings.
    pub fn with_config(transport: T, device: D, config: LinkConfig) -> Self {
        Self {
            transport,
            device,
            config,
            answered: [false; 3],
            control: ControlState::default(),
            rx: Frame::zeroed(),
            snapshot: Frame::zeroed(),
            tx: Frame::zeroed(),
        }
    }

    /// Reset channel state and arm reception.
    pub fn start(&mut self) {
        self.context().restart_receive();
    }

    /// Run one pass of the routine, dispatching everything it finds.
    pub async fn poll(&mut self) {
        let _ = self.routine(None).await;
    }

    /// Run one pass of the routine, capturing the first control frame of
    /// type `expected` instead of interpreting it.
    ///
    /// USB and BLE frames, and control frames of other types, are handled
    /// as usual.
    pub async fn poll_filtered(&mut self, expected: MessageType) -> PollResult {
        self.routine(Some(expected)).await
    }

    /// Frame captured by the last [`PollResult::Matched`].
    ///
    /// Only the header and declared payload are meaningful; when the frame
    /// was captured early, the bytes that had not arrived yet read as zero.
    #[inline]
    pub fn reply(&self) -> &Frame {
        &self.snapshot
    }

    /// Whether the radio stack is currently running.
    #[inline]
    pub fn is_radio_enabled(&self) -> bool {
        self.control.radio_enabled
    }

    /// Consume a pending full-platform sleep request.
    ///
    /// Set by the sleep command while the radio is running: the link is
    /// already down, and the owning loop decides when to actually sleep.
    /// Call [`resume_link()`](Self::resume_link) once awake.
    pub fn take_full_sleep_request(&mut self) -> bool {
        core::mem::take(&mut self.control.full_sleep_requested)
    }

    /// Bring reception back up after a deferred sleep.
    pub fn resume_link(&mut self) {
        debug!("link resumed");
        self.start();
    }

    /// Send an aux event to the main controller.
    pub async fn send_event(&mut self, id: EventId, payload: &[u8]) {
        self.context().send_event(id, payload).await;
    }

    /// Encode `payload` into the outbound frame and send it.
    pub async fn send<E: Encode>(&mut self, payload: &E) {
        self.context().send_encoded(payload).await;
    }

    /// Get the active configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Get a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Get a reference to the device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Get a mutable reference to the device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Decompose the engine into its transport and device.
    pub fn into_parts(self) -> (T, D) {
        (self.transport, self.device)
    }

    async fn routine(&mut self, filter: Option<MessageType>) -> PollResult {
        for channel in Channel::ALL {
            if !self.transport.is_fully_received(channel) {
                continue;
            }
            self.transport.clear_fully_received(channel);

            let answered = &mut self.answered[channel.index()];
            if *answered {
                // Already handled from its first bytes; next cycle starts clean
                *answered = false;
                trace!("{} frame complete, already answered", channel);
                continue;
            }

            self.transport.read_received(channel, &mut self.rx);
            if channel == Channel::Control && filter == Some(self.rx.message_type()) {
                self.snapshot.clone_from(&self.rx);
                return PollResult::Matched;
            }
            self.dispatch(channel, Source::Received).await;
        }

        if let Some(channel) = self.claim_partial() {
            if channel == Channel::Control && filter == Some(self.snapshot.message_type()) {
                return PollResult::Matched;
            }
            self.dispatch(channel, Source::Snapshot).await;
        }

        PollResult::NoMatch
    }

    /// Claim the frame currently being received for early dispatch.
    ///
    /// On success the channel is marked answered and the snapshot holds the
    /// received prefix, zero padded.
    fn claim_partial(&mut self) -> Option<Channel> {
        let Self {
            transport,
            config,
            answered,
            snapshot,
            ..
        } = self;

        critical_section::with(|_| {
            let remaining = transport.remaining_bytes();
            let received = FRAME_SIZE.saturating_sub(usize::from(remaining));
            if received < HEADER_SIZE {
                return None;
            }

            let mut header = [0u8; HEADER_SIZE];
            transport.read_in_flight(&mut header);
            let message_type = MessageType(u16::from_le_bytes([header[0], header[1]]));
            let payload_len = u16::from_le_bytes([header[2], header[3]]);
            let channel = Channel::of(message_type);

            let claimable = received >= HEADER_SIZE + usize::from(payload_len)
                && !answered[channel.index()]
                && remaining > config.partial_safety_margin
                && !transport.is_fully_received(channel);
            if !claimable {
                return None;
            }

            answered[channel.index()] = true;
            snapshot.clear();
            transport.read_in_flight(&mut snapshot.as_bytes_mut()[..received]);
            Some(channel)
        })
    }

    async fn dispatch(&mut self, channel: Channel, source: Source) {
        let Self {
            transport,
            device,
            config,
            answered,
            control,
            rx,
            snapshot,
            tx,
        } = self;
        let frame: &Frame = match source {
            Source::Received => &*rx,
            Source::Snapshot => &*snapshot,
        };

        match channel {
            Channel::Usb => device.relay(HidInterface::Usb, frame.payload()).await,
            Channel::Ble => device.relay(HidInterface::Ble, frame.payload()).await,
            Channel::Control => {
                let mut ctx = Context {
                    transport,
                    device,
                    config,
                    answered,
                    control,
                    tx,
                };
                interpreter::handle(&mut ctx, frame).await;
            }
        }
    }

    fn context(&mut self) -> Context<'_, T, D> {
        Context {
            transport: &mut self.transport,
            device: &mut self.device,
            config: &self.config,
            answered: &mut self.answered,
            control: &mut self.control,
            tx: &mut self.tx,
        }
    }
}

/// Engine state lent to a control-frame handler: everything except the
/// frame buffers being dispatched from.
pub(crate) struct Context<'a, T, D> {
    pub transport: &'a mut T,
    pub device: &'a mut D,
    pub config: &'a LinkConfig,
    answered: &'a mut [bool; 3],
    pub control: &'a mut ControlState,
    tx: &'a mut Frame,
}

impl<T: Transport, D: Device> Context<'_, T, D> {
    /// Wait for the outbound slot, then hand out the zeroed outbound frame
    /// with `message_type` set.
    pub async fn prepare(&mut self, message_type: MessageType) -> &mut Frame {
        self.transport.wait_send_complete().await;
        self.tx.clear();
        self.tx.set_message_type(message_type);
        &mut *self.tx
    }

    /// Wait for the outbound slot, then hand out a copy of `frame`.
    pub async fn prepare_copy(&mut self, frame: &Frame) -> &mut Frame {
        self.transport.wait_send_complete().await;
        self.tx.clone_from(frame);
        &mut *self.tx
    }

    /// Transmit the outbound frame.
    pub async fn send(&mut self) {
        self.device.wake_peer_if_needed();
        self.transport.send(&*self.tx).await;
    }

    pub async fn send_encoded<E: Encode>(&mut self, payload: &E) {
        let tx = self.prepare(E::MESSAGE_TYPE).await;
        payload.encode(tx);
        self.send().await;
    }

    pub async fn send_event(&mut self, id: EventId, payload: &[u8]) {
        self.send_encoded(&Event::with_payload(id, payload)).await;
    }

    /// Start the radio unless it is already running.
    pub fn enable_radio(&mut self, address: &[u8; 6]) {
        if self.control.radio_enabled {
            return;
        }
        info!("radio on");
        self.device.radio_start(address);
        self.control.radio_enabled = true;
    }

    /// Stop the radio unless it is already stopped.
    pub fn disable_radio(&mut self) {
        if !self.control.radio_enabled {
            return;
        }
        info!("radio off");
        self.device.radio_stop();
        self.control.radio_enabled = false;
    }

    /// Wait for a frame of `channel` that was dispatched early to finish
    /// arriving, and consume its completion.
    ///
    /// Gives up with a warning after [`LinkConfig::sleep_sync_timeout_ms`];
    /// the completion is then left for the routine to discard.
    pub async fn await_partial_resolution(&mut self, channel: Channel) {
        let idx = channel.index();
        if !self.answered[idx] {
            return;
        }

        let deadline = self
            .device
            .uptime_ms()
            .saturating_add(u64::from(self.config.sleep_sync_timeout_ms));
        loop {
            if self.transport.is_fully_received(channel) {
                self.transport.clear_fully_received(channel);
                self.answered[idx] = false;
                return;
            }
            if self.device.uptime_ms() >= deadline {
                warn!("{} frame never completed, not waiting any longer", channel);
                return;
            }
            yield_now().await;
        }
    }

    /// Clear channel state and re-arm reception.
    pub fn restart_receive(&mut self) {
        *self.answered = [false; 3];
        self.transport.start_receive();
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec;
    use std::vec::Vec;

    use embassy_futures::block_on;

    use auxlink_proto::{EventId, MainCommandId, Message, RNG_BLOCK_SIZE};

    use super::*;
    use crate::testing::{control_frame, event_ids, Call, MockDevice, MockTransport, TxLog};

    fn engine() -> LinkEngine<MockTransport, MockDevice> {
        let mut engine = LinkEngine::new(MockTransport::new(), MockDevice::new());
        engine.start();
        engine
    }

    fn relay_frame(message_type: MessageType, payload: &[u8]) -> Frame {
        let mut frame = Frame::zeroed();
        frame.set_message_type(message_type);
        frame.set_payload(payload).unwrap();
        frame
    }

    fn relays(engine: &LinkEngine<MockTransport, MockDevice>) -> Vec<Call> {
        engine
            .device()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Relay(..)))
            .collect()
    }

    #[test]
    fn test_start_arms_reception() {
        let engine = engine();
        assert!(engine.transport().is_receiving());
    }

    #[test]
    fn test_full_frame_dispatched_once() {
        let mut engine = engine();
        engine
            .transport_mut()
            .land(&relay_frame(MessageType::USB, &[1, 2, 3]));

        block_on(engine.poll());
        block_on(engine.poll());

        assert_eq!(
            relays(&engine),
            vec![Call::Relay(HidInterface::Usb, vec![1, 2, 3])]
        );
        assert!(!engine.transport().is_fully_received(Channel::Usb));
    }

    #[test]
    fn test_each_channel_drained_in_one_pass() {
        let mut engine = engine();
        engine
            .transport_mut()
            .land(&relay_frame(MessageType::USB, &[1]));
        engine
            .transport_mut()
            .land(&relay_frame(MessageType::BLE, &[2]));

        block_on(engine.poll());

        assert_eq!(
            relays(&engine),
            vec![
                Call::Relay(HidInterface::Usb, vec![1]),
                Call::Relay(HidInterface::Ble, vec![2]),
            ]
        );
    }

    #[test]
    fn test_partial_dispatch_then_completion_is_noop() {
        let mut engine = engine();
        let frame = relay_frame(MessageType::BLE, &[7; 16]);
        engine.transport_mut().receive_prefix(&frame, HEADER_SIZE + 16);

        block_on(engine.poll());
        assert_eq!(
            relays(&engine),
            vec![Call::Relay(HidInterface::Ble, vec![7; 16])]
        );
        assert!(engine.answered[Channel::Ble.index()]);

        // Polling while the padding is still arriving does nothing
        engine.transport_mut().receive_prefix(&frame, 300);
        block_on(engine.poll());

        engine.transport_mut().complete_in_flight();
        block_on(engine.poll());

        assert_eq!(relays(&engine).len(), 1);
        assert!(!engine.answered[Channel::Ble.index()]);
    }

    #[test]
    fn test_partial_waits_for_declared_payload() {
        let mut engine = engine();
        let frame = relay_frame(MessageType::USB, &[9; 64]);

        // Header plus half the payload
        engine.transport_mut().receive_prefix(&frame, HEADER_SIZE + 32);
        block_on(engine.poll());
        assert!(relays(&engine).is_empty());

        engine.transport_mut().receive_prefix(&frame, HEADER_SIZE + 64);
        block_on(engine.poll());
        assert_eq!(relays(&engine).len(), 1);
    }

    #[test]
    fn test_partial_refused_inside_safety_margin() {
        let mut engine = engine();
        let margin = usize::from(engine.config().partial_safety_margin);
        let frame = relay_frame(MessageType::USB, &[5; 520]);

        // Exactly `margin` bytes left: too close to the completion interrupt
        engine
            .transport_mut()
            .receive_prefix(&frame, FRAME_SIZE - margin);
        block_on(engine.poll());
        assert!(relays(&engine).is_empty());

        // The full path picks it up instead
        engine.transport_mut().complete_in_flight();
        block_on(engine.poll());
        assert_eq!(relays(&engine).len(), 1);
    }

    #[test]
    fn test_partial_refused_while_completion_pending() {
        let mut engine = engine();
        let first = relay_frame(MessageType::USB, &[1]);
        let second = relay_frame(MessageType::USB, &[2]);

        engine.transport_mut().land(&first);
        engine.transport_mut().receive_prefix(&second, 64);
        // The undrained completion on the same channel blocks the claim
        assert!(engine.claim_partial().is_none());

        block_on(engine.poll());
        assert_eq!(
            relays(&engine),
            vec![
                Call::Relay(HidInterface::Usb, vec![1]),
                Call::Relay(HidInterface::Usb, vec![2]),
            ]
        );
    }

    #[test]
    fn test_every_frame_dispatched_exactly_once() {
        // Sweep the poll point across the whole receive of each frame
        for stop in (0..=FRAME_SIZE).step_by(17) {
            let mut engine = engine();
            let frame = relay_frame(MessageType::BLE, &[stop as u8; 40]);

            engine.transport_mut().receive_prefix(&frame, stop);
            block_on(engine.poll());
            engine.transport_mut().complete_in_flight();
            block_on(engine.poll());
            block_on(engine.poll());

            assert_eq!(relays(&engine).len(), 1, "poll at {stop} bytes");
            assert_eq!(engine.answered, [false; 3]);
        }
    }

    #[test]
    fn test_snapshot_zero_pads_missing_bytes() {
        let mut engine = engine();
        let mut frame = control_frame(MessageType::RNG_TRANSFER, &[0xAB; RNG_BLOCK_SIZE]);
        frame.as_bytes_mut()[200] = 0xCD;
        engine.transport_mut().receive_prefix(&frame, 100);

        assert_eq!(
            block_on(engine.poll_filtered(MessageType::RNG_TRANSFER)),
            PollResult::Matched
        );
        assert_eq!(engine.reply().payload(), &[0xAB; RNG_BLOCK_SIZE]);
        assert_eq!(engine.reply().as_bytes()[200], 0);
    }

    #[test]
    fn test_filter_captures_full_control_frame() {
        let mut engine = engine();
        engine
            .transport_mut()
            .land(&control_frame(MessageType::RNG_TRANSFER, &[3; RNG_BLOCK_SIZE]));

        assert_eq!(
            block_on(engine.poll_filtered(MessageType::RNG_TRANSFER)),
            PollResult::Matched
        );
        assert_eq!(engine.reply().message_type(), MessageType::RNG_TRANSFER);
        // Captured, not interpreted
        assert!(engine.transport().sent().is_empty());
    }

    #[test]
    fn test_filter_processes_other_frames_normally() {
        let mut engine = engine();
        engine
            .transport_mut()
            .land(&relay_frame(MessageType::USB, &[4]));
        engine
            .transport_mut()
            .land(&control_frame(MessageType::PING_WITH_INFO, &[]));

        assert_eq!(
            block_on(engine.poll_filtered(MessageType::RNG_TRANSFER)),
            PollResult::NoMatch
        );
        assert_eq!(relays(&engine).len(), 1);
        assert_eq!(event_ids(engine.transport().sent()), [EventId::IM_HERE]);
    }

    #[test]
    fn test_usb_frame_never_matches_filter() {
        let mut engine = engine();
        engine
            .transport_mut()
            .land(&relay_frame(MessageType::USB, &[1]));

        assert_eq!(
            block_on(engine.poll_filtered(MessageType::USB)),
            PollResult::NoMatch
        );
        assert_eq!(relays(&engine).len(), 1);
    }

    #[test]
    fn test_recovery_marker_resets_via_full_path() {
        let mut engine = engine();
        engine.transport_mut().land(&Frame::recovery_marker());

        block_on(engine.poll());

        assert_eq!(engine.device().calls(), vec![Call::Reset]);
        assert!(engine.transport().sent().is_empty());
    }

    #[test]
    fn test_recovery_marker_never_claimed_early() {
        let mut engine = engine();
        engine
            .transport_mut()
            .receive_prefix(&Frame::recovery_marker(), FRAME_SIZE - 100);

        block_on(engine.poll());
        assert!(engine.device().calls().is_empty());
    }

    #[test]
    fn test_unknown_type_is_consumed_silently() {
        let mut engine = engine();
        engine
            .transport_mut()
            .land(&control_frame(MessageType(0x0777), &[1, 2, 3]));

        block_on(engine.poll());
        block_on(engine.poll());

        assert!(engine.device().calls().is_empty());
        assert!(engine.transport().sent().is_empty());
        assert!(!engine.transport().is_fully_received(Channel::Control));
    }

    #[test]
    fn test_second_send_waits_for_first() {
        let mut engine = engine();
        engine.transport_mut().set_send_duration(3);

        block_on(async {
            engine.send_event(EventId::USB_ENUMERATED, &[]).await;
            engine.send_event(EventId::IM_HERE, &[]).await;
        });

        assert_eq!(
            engine.transport().tx_log(),
            vec![
                TxLog::Started(EventId::USB_ENUMERATED),
                TxLog::Completed,
                TxLog::Started(EventId::IM_HERE),
            ]
        );
    }

    #[test]
    fn test_send_wakes_peer_first() {
        let mut engine = engine();
        block_on(engine.send_event(EventId::USB_ENUMERATED, &[]));
        assert_eq!(engine.device().calls(), vec![Call::WakePeer]);
        let sent = engine.transport().sent();
        assert!(matches!(
            sent[0].message(),
            Message::Event {
                id: EventId::USB_ENUMERATED,
                ..
            }
        ));
    }

    #[test]
    fn test_outbound_frame_zeroed_between_sends() {
        let mut engine = engine();
        block_on(engine.send_event(EventId::FUNC_TEST_DONE, &[0xEE; 32]));
        block_on(engine.send_event(EventId::IM_HERE, &[]));

        let sent = engine.transport().sent();
        assert!(sent[1].payload_area()[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_full_sleep_request_taken_once() {
        let mut engine = engine();
        engine.control.full_sleep_requested = true;

        assert!(engine.take_full_sleep_request());
        assert!(!engine.take_full_sleep_request());
    }

    #[test]
    fn test_resume_link_clears_answered_state() {
        let mut engine = engine();
        engine.answered = [true; 3];
        engine.transport_mut().stop_receive();

        engine.resume_link();

        assert_eq!(engine.answered, [false; 3]);
        assert!(engine.transport().is_receiving());
    }

    #[test]
    fn test_main_command_claimed_early_is_not_repeated() {
        let mut engine = engine();
        let frame = control_frame(
            MessageType::MAIN_MCU_COMMAND,
            &MainCommandId::STOP_CHARGE.to_le_bytes(),
        );
        engine.transport_mut().receive_prefix(&frame, 32);
        block_on(engine.poll());
        engine.transport_mut().complete_in_flight();
        block_on(engine.poll());

        assert_eq!(engine.device().calls(), vec![Call::StopCharge]);
    }

    #[test]
    fn test_filtered_early_claim_of_other_type_answered_once() {
        let mut engine = engine();
        let frame = control_frame(MessageType::PING_WITH_INFO, &[]);
        engine.transport_mut().receive_prefix(&frame, HEADER_SIZE);

        assert_eq!(
            block_on(engine.poll_filtered(MessageType::RNG_TRANSFER)),
            PollResult::NoMatch
        );
        assert_eq!(event_ids(engine.transport().sent()), [EventId::IM_HERE]);

        engine.transport_mut().complete_in_flight();
        block_on(engine.poll());

        assert_eq!(event_ids(engine.transport().sent()), [EventId::IM_HERE]);
    }
}
