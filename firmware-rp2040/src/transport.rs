//! UART transport to the main controller.
//!
//! Frames are fixed-size, so the receiver needs no delimiter: it counts
//! bytes into the in-flight buffer and, when [`FRAME_SIZE`] of them have
//! arrived, lands the frame in the buffer of its channel and raises that
//! channel's flag. [`receive_loop`] runs on the interrupt executor; every
//! byte is stored under the same critical section the engine's early claim
//! takes, so the engine never sees a half-updated count.

use core::cell::RefCell;

use auxlink_core::auxlink_proto::{Channel, Frame, FRAME_SIZE};
use auxlink_core::{ReceiveFlags, Transport};
use defmt::{trace, warn};
use embassy_rp::uart::{Async, UartRx, UartTx};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicBool, AtomicU16, Ordering};

/// Link baud rate, 8N1.
pub const LINK_BAUDRATE: u32 = 1_000_000;

struct RxBuffers {
    in_flight: Frame,
    landed: [Frame; 3],
}

impl RxBuffers {
    const fn new() -> Self {
        Self {
            in_flight: Frame::zeroed(),
            landed: [Frame::zeroed(), Frame::zeroed(), Frame::zeroed()],
        }
    }
}

static RX_BUFFERS: Mutex<CriticalSectionRawMutex, RefCell<RxBuffers>> =
    Mutex::new(RefCell::new(RxBuffers::new()));
static RX_FLAGS: ReceiveFlags = ReceiveFlags::new();
static RX_REMAINING: AtomicU16 = AtomicU16::new(FRAME_SIZE as u16);
static RX_ARMED: AtomicBool = AtomicBool::new(false);

/// Feed UART bytes into the frame buffers forever.
///
/// Bytes arriving while reception is disarmed are dropped. A line error
/// throws away the frame in progress.
pub async fn receive_loop(mut rx: UartRx<'static, Async>) -> ! {
    let mut byte = [0u8; 1];
    loop {
        if let Err(e) = rx.read(&mut byte).await {
            warn!("link rx error: {:?}", e);
            restart_frame();
            continue;
        }
        if RX_ARMED.load(Ordering::Acquire) {
            store_byte(byte[0]);
        }
    }
}

fn store_byte(byte: u8) {
    RX_BUFFERS.lock(|buffers| {
        let mut buffers = buffers.borrow_mut();
        let remaining = RX_REMAINING.load(Ordering::Relaxed);
        let offset = FRAME_SIZE - usize::from(remaining);
        buffers.in_flight.as_bytes_mut()[offset] = byte;

        if remaining > 1 {
            RX_REMAINING.store(remaining - 1, Ordering::Release);
            return;
        }

        let channel = buffers.in_flight.channel();
        let frame = *buffers.in_flight.as_bytes();
        *buffers.landed[channel.index()].as_bytes_mut() = frame;
        buffers.in_flight.clear();
        RX_REMAINING.store(FRAME_SIZE as u16, Ordering::Release);
        RX_FLAGS.mark_complete(channel);
        trace!("frame landed on {:?}", channel);
    });
}

fn restart_frame() {
    RX_BUFFERS.lock(|buffers| {
        buffers.borrow_mut().in_flight.clear();
        RX_REMAINING.store(FRAME_SIZE as u16, Ordering::Release);
    });
}

/// Engine side of the UART link.
///
/// Owns the transmit half; the receive half is driven by [`receive_loop`]
/// and shared through statics.
pub struct UartTransport {
    tx: UartTx<'static, Async>,
}

impl UartTransport {
    #[must_use]
    pub fn new(tx: UartTx<'static, Async>) -> Self {
        Self { tx }
    }
}

impl Transport for UartTransport {
    fn start_receive(&mut self) {
        restart_frame();
        RX_FLAGS.reset();
        RX_ARMED.store(true, Ordering::Release);
    }

    fn stop_receive(&mut self) {
        RX_ARMED.store(false, Ordering::Release);
        restart_frame();
    }

    async fn send(&mut self, frame: &Frame) {
        // DMA write completes before returning, so a previous send is done too
        if let Err(e) = self.tx.write(frame.as_bytes()).await {
            warn!("link tx error: {:?}", e);
        }
    }

    async fn wait_send_complete(&mut self) {
        if let Err(e) = self.tx.blocking_flush() {
            warn!("link flush error: {:?}", e);
        }
    }

    fn remaining_bytes(&self) -> u16 {
        RX_REMAINING.load(Ordering::Acquire)
    }

    fn is_fully_received(&self, channel: Channel) -> bool {
        RX_FLAGS.is_complete(channel)
    }

    fn clear_fully_received(&self, channel: Channel) {
        RX_FLAGS.clear(channel);
    }

    fn read_received(&self, channel: Channel, frame: &mut Frame) {
        RX_BUFFERS.lock(|buffers| {
            *frame.as_bytes_mut() = *buffers.borrow().landed[channel.index()].as_bytes();
        });
    }

    fn read_in_flight(&self, dst: &mut [u8]) {
        RX_BUFFERS.lock(|buffers| {
            let buffers = buffers.borrow();
            let n = dst.len().min(FRAME_SIZE);
            dst[..n].copy_from_slice(&buffers.in_flight.as_bytes()[..n]);
        });
    }
}
