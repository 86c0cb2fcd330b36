//! Numeric identifiers carried in frames: message types, command sub-ids
//! and event ids.
//!
//! Each identifier is a transparent `u16` newtype so that values received
//! from the peer which this firmware does not know about can still be
//! represented and ignored.

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name(pub u16);

        impl $name {
            /// Get the raw u16 value.
            #[inline]
            #[must_use]
            pub const fn raw(self) -> u16 {
                self.0
            }

            /// Little-endian wire representation.
            #[inline]
            #[must_use]
            pub const fn to_le_bytes(self) -> [u8; 2] {
                self.0.to_le_bytes()
            }

            /// Read from the first two bytes of `bytes` (missing bytes read as zero).
            #[inline]
            #[must_use]
            pub fn from_le_slice(bytes: &[u8]) -> Self {
                let lo = bytes.first().copied().unwrap_or(0);
                let hi = bytes.get(1).copied().unwrap_or(0);
                Self(u16::from_le_bytes([lo, hi]))
            }
        }

        impl From<u16> for $name {
            fn from(value: u16) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(
    /// Frame `message_type` discriminant.
    MessageType
);

impl MessageType {
    pub const USB: Self = Self(0x0000);
    pub const BLE: Self = Self(0x0001);
    pub const BOOTLOADER: Self = Self(0x0002);
    pub const PLATFORM_DETAILS: Self = Self(0x0003);
    pub const MAIN_MCU_COMMAND: Self = Self(0x0004);
    pub const AUX_MCU_EVENT: Self = Self(0x0005);
    pub const NIMH_CHARGE: Self = Self(0x0006);
    pub const PING_WITH_INFO: Self = Self(0x0007);
    pub const KEYBOARD_TYPE: Self = Self(0x0008);
    pub const FIDO2: Self = Self(0x0009);
    pub const BLE_COMMAND: Self = Self(0x000A);
    pub const RNG_TRANSFER: Self = Self(0x000B);
}

id_newtype!(
    /// Sub-command of a main-controller command frame.
    MainCommandId
);

impl MainCommandId {
    pub const SLEEP: Self = Self(0x0001);
    pub const ATTACH_USB: Self = Self(0x0002);
    /// Obsolete: the frame is echoed back unchanged.
    pub const PING: Self = Self(0x0003);
    pub const DETACH_USB: Self = Self(0x0004);
    pub const NIMH_CHARGE: Self = Self(0x0005);
    pub const NO_COMMS_UNAVAILABLE: Self = Self(0x0006);
    pub const STOP_CHARGE: Self = Self(0x0007);
    pub const SET_BATTERY_LEVEL: Self = Self(0x0008);
    pub const TX_SWEEP: Self = Self(0x0009);
    pub const TX_TONE_CONTINUOUS: Self = Self(0x000A);
    pub const TX_TONE_STOP: Self = Self(0x000B);
    pub const FORCE_CHARGE_VOLTAGE: Self = Self(0x000C);
    pub const STOP_FORCED_CHARGE: Self = Self(0x000D);
    pub const FUNCTIONAL_TEST: Self = Self(0x000E);
    pub const UPDATE_DEVICE_STATUS: Self = Self(0x000F);
}

id_newtype!(
    /// Sub-command of a BLE command frame.
    BleCommandId
);

impl BleCommandId {
    pub const ENABLE: Self = Self(0x0001);
    pub const DISABLE: Self = Self(0x0002);
    pub const STORE_BOND_INFO: Self = Self(0x0003);
    pub const RECALL_BOND_INFO: Self = Self(0x0004);
}

id_newtype!(
    /// Event id of an aux-event frame sent to the main controller.
    EventId
);

impl EventId {
    pub const BLE_ENABLED: Self = Self(0x0001);
    pub const BLE_DISABLED: Self = Self(0x0002);
    pub const SLEEP_RECEIVED: Self = Self(0x0003);
    pub const IM_HERE: Self = Self(0x0004);
    pub const USB_DETACHED: Self = Self(0x0005);
    pub const FUNC_TEST_DONE: Self = Self(0x0006);
    pub const USB_ENUMERATED: Self = Self(0x0007);
    pub const TX_SWEEP_DONE: Self = Self(0x0008);
}

id_newtype!(
    /// Command field of a bootloader frame.
    BootloaderCommand
);

impl BootloaderCommand {
    pub const START_PROGRAMMING: Self = Self(0x0000);
}

/// Number of random bytes carried by an RNG transfer reply.
pub const RNG_BLOCK_SIZE: usize = 32;
