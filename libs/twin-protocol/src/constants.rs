//! Modbus protocol constants based on the official specification
//!
//! - Maximum PDU size: 253 bytes (inherited from the RS485 ADU limit of 256 bytes)
//! - Register/coil limits are calculated to fit within the PDU size constraint

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Modbus MBAP header length for TCP
/// Format: Transaction ID(2) + Protocol ID(2) + Length(2) = 6 bytes
/// The Unit ID that follows is counted by the Length field, not by this constant.
pub const MBAP_HEADER_LEN: usize = 6;

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (Unit ID + PDU)
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Smallest complete frame: MBAP header + unit id + function code
pub const MIN_FRAME_LEN: usize = MBAP_HEADER_LEN + 2;

// ============================================================================
// Operation Limits
// ============================================================================

/// Maximum number of coils for FC01/FC02 (Read Coils / Read Discrete Inputs)
///
/// 1 (FC) + 1 (byte count) + ceil(N / 8) <= 253 allows 2008; the spec
/// rounds this to 2000.
pub const MAX_READ_COILS: u16 = 2000;

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// 1 (FC) + 1 (byte count) + N * 2 <= 253 gives N <= 125.
pub const MAX_READ_REGISTERS: u16 = 125;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Error bit set on the function code of exception responses
pub const EXCEPTION_BIT: u8 = 0x80;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

// ============================================================================
// Write Single Coil wire values
// ============================================================================

/// FC05 value for "coil on"
pub const COIL_ON: u16 = 0xFF00;

/// FC05 value for "coil off"
pub const COIL_OFF: u16 = 0x0000;
