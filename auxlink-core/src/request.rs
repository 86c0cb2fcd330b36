//! Request/response calls to the main controller.
//!
//! Each call sends a request, then keeps running the engine routine in
//! filtered mode until the reply arrives. Traffic that is not the reply is
//! handled normally in the meantime. The wait is bounded by
//! [`LinkConfig::request_timeout_ms`](crate::LinkConfig::request_timeout_ms).

use embassy_futures::yield_now;

use auxlink_proto::{
    BleCommandId, BleRequest, BondingInfo, MessageType, RngRequest, BONDING_INFO_SIZE,
    RNG_BLOCK_SIZE,
};

use crate::engine::{LinkEngine, PollResult};
use crate::error::{LinkError, RecallError};
use crate::ports::{Device, System, Transport};

/// Size of the bonding-recall request payload: address type then address.
const RECALL_REQUEST_SIZE: usize = 1 + 6;

impl<T: Transport, D: Device> LinkEngine<T, D> {
    /// Ask the main controller for a block of random bytes.
    ///
    /// # Errors
    ///
    /// [`LinkError::Timeout`] if no reply arrives in time,
    /// [`LinkError::MalformedReply`] if it carries fewer than 32 bytes.
    pub async fn fetch_random_bytes(&mut self) -> Result<[u8; RNG_BLOCK_SIZE], LinkError> {
        self.send(&RngRequest).await;
        self.await_reply(MessageType::RNG_TRANSFER).await?;

        let mut bytes = [0u8; RNG_BLOCK_SIZE];
        let payload = self
            .reply()
            .payload()
            .get(..RNG_BLOCK_SIZE)
            .ok_or(LinkError::MalformedReply)?;
        bytes.copy_from_slice(payload);
        Ok(bytes)
    }

    /// Look up the bonding record stored for a peer address.
    ///
    /// # Errors
    ///
    /// [`RecallError::NotFound`] when the main controller answers with
    /// anything but a full record, [`RecallError::Link`] if it does not
    /// answer in time.
    pub async fn recall_bonding_info(
        &mut self,
        address_type: u8,
        address: &[u8; 6],
    ) -> Result<BondingInfo, RecallError> {
        let mut query = [0u8; RECALL_REQUEST_SIZE];
        query[0] = address_type;
        query[1..].copy_from_slice(address);
        self.send(&BleRequest {
            id: BleCommandId::RECALL_BOND_INFO,
            payload: &query,
        })
        .await;
        self.await_reply(MessageType::BLE_COMMAND).await?;

        let reply = self.reply();
        if usize::from(reply.payload_len()) != 2 + BONDING_INFO_SIZE {
            debug!("no bonding record, reply length {}", reply.payload_len());
            return Err(RecallError::NotFound);
        }
        let record = reply.payload().get(2..).and_then(BondingInfo::from_slice);
        record.ok_or(RecallError::NotFound)
    }

    /// Hand a bonding record to the main controller for storage. No reply
    /// is expected.
    pub async fn store_bonding_info(&mut self, info: &BondingInfo) {
        self.send(&BleRequest {
            id: BleCommandId::STORE_BOND_INFO,
            payload: info.as_bytes(),
        })
        .await;
    }

    async fn await_reply(&mut self, expected: MessageType) -> Result<(), LinkError> {
        let deadline = self
            .device()
            .uptime_ms()
            .saturating_add(u64::from(self.config().request_timeout_ms));
        loop {
            if self.poll_filtered(expected).await == PollResult::Matched {
                return Ok(());
            }
            if self.device().uptime_ms() >= deadline {
                warn!("no reply of type {}", expected);
                return Err(LinkError::Timeout);
            }
            yield_now().await;
        }
    }
}
