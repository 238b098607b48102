//! Protocol commands
//!
//! Command bytes of the SportIdent extended protocol and the canned
//! messages the driver sends to a master station.

use super::Message;

/// Start of frame
pub const STX: u8 = 0x02;
/// End of frame
pub const ETX: u8 = 0x03;
/// Acknowledge, sent unframed
pub const ACK: u8 = 0x06;
/// Negative acknowledge, sent unframed
pub const NAK: u8 = 0x15;
/// Wakeup byte, may precede any frame
pub const WAKEUP: u8 = 0xFF;

/// Switch the station to master (direct) mode
pub const SET_MASTER_MODE: u8 = 0xF0;
/// Read a system value from station memory
pub const GET_SYSTEM_VALUE: u8 = 0x83;
/// Card 5 inserted in the station
pub const SI_CARD_5_DETECTED: u8 = 0xE5;
/// Card 6 inserted in the station
pub const SI_CARD_6_PLUS_DETECTED: u8 = 0xE6;
/// Card 8, 9, 10, 11, pCard or SIAC inserted in the station
pub const SI_CARD_8_PLUS_DETECTED: u8 = 0xE8;
/// Card taken out of the station
pub const SI_CARD_REMOVED: u8 = 0xE7;
/// Read card 5 data
pub const GET_SI_CARD_5: u8 = 0xB1;
/// Read one block of card 8+ data
pub const GET_SI_CARD_8_PLUS: u8 = 0xEF;
/// Make the station beep, also sent back as a notification
pub const BEEP: u8 = 0xF9;
/// Punch record pushed in autosend mode
pub const TRANSMIT_RECORD: u8 = 0xD3;

/// Master mode selector for [`SET_MASTER_MODE`]
pub const DIRECT_MODE: u8 = 0x4D;
/// System memory offset of the protocol configuration byte
pub const CONFIG_PROTOCOL_OFFSET: u8 = 0x74;
/// Bit of the protocol configuration byte set when the extended protocol is on
pub const EXTENDED_PROTOCOL_MASK: u8 = 0x01;

/// Frame index of the protocol configuration byte in a system-value reply
pub const PROTOCOL_CONFIG_INDEX: usize = 6;

/// Bootstrap frame putting the station in master mode
pub fn startup_sequence() -> Message {
    Message::new(SET_MASTER_MODE, vec![DIRECT_MODE])
}

/// Request the protocol configuration byte
pub fn get_protocol_configuration() -> Message {
    Message::new(GET_SYSTEM_VALUE, vec![CONFIG_PROTOCOL_OFFSET, 0x01])
}

/// Two beeps confirming the driver is online
pub fn beep_twice() -> Message {
    Message::new(BEEP, vec![0x02])
}

/// Request the content of the inserted card 5
pub fn read_sicard_5() -> Message {
    Message::new(GET_SI_CARD_5, Vec::new())
}

/// Request block 0 of the inserted card 8+
pub fn read_sicard_8_plus_b0() -> Message {
    Message::new(GET_SI_CARD_8_PLUS, vec![0x00])
}

/// Request block 1 of the inserted card 8+
pub fn read_sicard_8_plus_b1() -> Message {
    Message::new(GET_SI_CARD_8_PLUS, vec![0x01])
}

/// Acknowledge a card read; the station beeps and waits for removal
pub fn ack_sequence() -> Message {
    Message::new(ACK, Vec::new())
}

/// Human-readable name of a command byte, for logs
pub fn command_name(command: u8) -> &'static str {
    match command {
        ACK => "ACK",
        NAK => "NAK",
        SET_MASTER_MODE => "SET_MASTER_MODE",
        GET_SYSTEM_VALUE => "GET_SYSTEM_VALUE",
        SI_CARD_5_DETECTED => "SI_CARD_5_DETECTED",
        SI_CARD_6_PLUS_DETECTED => "SI_CARD_6_PLUS_DETECTED",
        SI_CARD_8_PLUS_DETECTED => "SI_CARD_8_PLUS_DETECTED",
        SI_CARD_REMOVED => "SI_CARD_REMOVED",
        GET_SI_CARD_5 => "GET_SI_CARD_5",
        GET_SI_CARD_8_PLUS => "GET_SI_CARD_8_PLUS",
        BEEP => "BEEP",
        TRANSMIT_RECORD => "TRANSMIT_RECORD",
        _ => "UNKNOWN",
    }
}

/// Single-byte commands travel without STX/ETX framing
pub fn is_unframed(command: u8) -> bool {
    matches!(command, ACK | NAK)
}
