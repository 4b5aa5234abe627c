//! Modbus/TCP frame codec
//!
//! Structured parse/serialize for Application Data Units (MBAP header +
//! PDU), replacing ad hoc byte slicing with one typed codec. Function
//! codes 1-5 are decoded into typed payloads; anything else is carried as
//! a raw payload so transformation layers can pass it through untouched.
//!
//! FC 1-4 share a function code between request and response with
//! different layouts, so parsing is direction-aware.

use tracing::{debug, trace};

use crate::constants::{
    COIL_OFF, COIL_ON, EXCEPTION_BIT, FC_READ_COILS, FC_READ_DISCRETE_INPUTS,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_SINGLE_COIL, MAX_MBAP_LENGTH,
    MBAP_HEADER_LEN, MIN_FRAME_LEN,
};
use crate::error::{ProtocolError, Result};

/// Which side of the exchange a buffer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server
    Request,
    /// Server to client
    Response,
}

/// Value carried by a Write Single Coil frame.
///
/// The wire encoding admits exactly two values; anything else is a
/// protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoilState {
    Off,
    On,
}

impl CoilState {
    /// Decode the FC05 16-bit value field
    pub fn from_wire(raw: u16) -> Result<Self> {
        match raw {
            COIL_ON => Ok(CoilState::On),
            COIL_OFF => Ok(CoilState::Off),
            other => Err(ProtocolError::MalformedFrame(format!(
                "invalid coil value 0x{other:04X} (must be 0x0000 or 0xFF00)"
            ))),
        }
    }

    /// Encode to the FC05 16-bit value field
    pub fn to_wire(self) -> u16 {
        match self {
            CoilState::On => COIL_ON,
            CoilState::Off => COIL_OFF,
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, CoilState::On)
    }
}

impl From<bool> for CoilState {
    fn from(on: bool) -> Self {
        if on {
            CoilState::On
        } else {
            CoilState::Off
        }
    }
}

/// Modbus TCP MBAP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbapHeader {
    /// Transaction identifier
    pub transaction_id: u16,
    /// Protocol identifier (fixed to 0)
    pub protocol_id: u16,
    /// Length field (unit id + PDU byte count)
    pub length: u16,
    /// Unit identifier (slave ID)
    pub unit_id: u8,
}

impl MbapHeader {
    /// Parse the 7 header bytes of a TCP frame
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MBAP_HEADER_LEN + 1 {
            return Err(ProtocolError::MalformedFrame(format!(
                "header truncated: {} bytes",
                data.len()
            )));
        }
        Ok(Self {
            transaction_id: u16::from_be_bytes([data[0], data[1]]),
            protocol_id: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
            unit_id: data[6],
        })
    }
}

/// Typed PDU for the supported function codes.
///
/// `ReadBitsResponse` always carries `byte_count * 8` bits: the wire
/// format packs bits into whole bytes and the true coil count is only
/// known to the requester, which truncates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    /// FC 1-4 request: starting address + quantity
    ReadRequest {
        function: u8,
        address: u16,
        quantity: u16,
    },
    /// FC 1/2 response: packed coil or discrete-input bits
    ReadBitsResponse { function: u8, bits: Vec<bool> },
    /// FC 3/4 response: 16-bit registers, big-endian on the wire
    ReadRegistersResponse { function: u8, registers: Vec<u16> },
    /// FC 5 request and response share this shape
    WriteSingleCoil { address: u16, value: CoilState },
    /// Unsupported function code (including exception responses);
    /// payload preserved byte-for-byte
    Raw { function: u8, payload: Vec<u8> },
}

impl Pdu {
    /// Function code of this PDU
    pub fn function_code(&self) -> u8 {
        match self {
            Pdu::ReadRequest { function, .. }
            | Pdu::ReadBitsResponse { function, .. }
            | Pdu::ReadRegistersResponse { function, .. }
            | Pdu::Raw { function, .. } => *function,
            Pdu::WriteSingleCoil { .. } => FC_WRITE_SINGLE_COIL,
        }
    }

    /// Whether this is an exception response (error bit set)
    pub fn is_exception(&self) -> bool {
        self.function_code() & EXCEPTION_BIT != 0
    }

    fn parse_body(function: u8, body: &[u8], direction: Direction) -> Result<Self> {
        match (function, direction) {
            (
                FC_READ_COILS..=FC_READ_INPUT_REGISTERS,
                Direction::Request,
            ) => {
                if body.len() != 4 {
                    return Err(ProtocolError::MalformedFrame(format!(
                        "FC{function:02} request body must be 4 bytes, got {}",
                        body.len()
                    )));
                }
                Ok(Pdu::ReadRequest {
                    function,
                    address: u16::from_be_bytes([body[0], body[1]]),
                    quantity: u16::from_be_bytes([body[2], body[3]]),
                })
            },
            (FC_READ_COILS | FC_READ_DISCRETE_INPUTS, Direction::Response) => {
                let byte_count = *body.first().ok_or_else(|| {
                    ProtocolError::MalformedFrame("bit response missing byte count".to_string())
                })? as usize;
                if body.len() != 1 + byte_count {
                    return Err(ProtocolError::MalformedFrame(format!(
                        "bit response declares {byte_count} data bytes, got {}",
                        body.len() - 1
                    )));
                }
                Ok(Pdu::ReadBitsResponse {
                    function,
                    bits: unpack_bits(&body[1..]),
                })
            },
            (
                FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS,
                Direction::Response,
            ) => {
                let byte_count = *body.first().ok_or_else(|| {
                    ProtocolError::MalformedFrame("register response missing byte count".to_string())
                })? as usize;
                if body.len() != 1 + byte_count || byte_count % 2 != 0 {
                    return Err(ProtocolError::MalformedFrame(format!(
                        "register response declares {byte_count} data bytes, got {}",
                        body.len() - 1
                    )));
                }
                let registers = body[1..]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Ok(Pdu::ReadRegistersResponse {
                    function,
                    registers,
                })
            },
            (FC_WRITE_SINGLE_COIL, _) => {
                if body.len() != 4 {
                    return Err(ProtocolError::MalformedFrame(format!(
                        "FC05 body must be 4 bytes, got {}",
                        body.len()
                    )));
                }
                Ok(Pdu::WriteSingleCoil {
                    address: u16::from_be_bytes([body[0], body[1]]),
                    value: CoilState::from_wire(u16::from_be_bytes([body[2], body[3]]))?,
                })
            },
            _ => {
                trace!("passing function code 0x{:02X} through uninterpreted", function);
                Ok(Pdu::Raw {
                    function,
                    payload: body.to_vec(),
                })
            },
        }
    }

    fn write_body(&self, out: &mut Vec<u8>) {
        match self {
            Pdu::ReadRequest {
                address, quantity, ..
            } => {
                out.extend_from_slice(&address.to_be_bytes());
                out.extend_from_slice(&quantity.to_be_bytes());
            },
            Pdu::ReadBitsResponse { bits, .. } => {
                let packed = pack_bits(bits);
                out.push(packed.len() as u8);
                out.extend_from_slice(&packed);
            },
            Pdu::ReadRegistersResponse { registers, .. } => {
                out.push((registers.len() * 2) as u8);
                for reg in registers {
                    out.extend_from_slice(&reg.to_be_bytes());
                }
            },
            Pdu::WriteSingleCoil { address, value } => {
                out.extend_from_slice(&address.to_be_bytes());
                out.extend_from_slice(&value.to_wire().to_be_bytes());
            },
            Pdu::Raw { payload, .. } => {
                out.extend_from_slice(payload);
            },
        }
    }
}

/// Complete Modbus/TCP Application Data Unit.
///
/// The MBAP protocol id is always 0 and the length field is recomputed
/// from the actual payload on every serialization, so neither is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusAdu {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub pdu: Pdu,
}

impl ModbusAdu {
    /// Parse one complete frame.
    ///
    /// Fails with [`ProtocolError::MalformedFrame`] when fewer than 8
    /// bytes are available, the protocol id is non-zero, or the declared
    /// length disagrees with the bytes actually present.
    pub fn parse(data: &[u8], direction: Direction) -> Result<Self> {
        if data.len() < MIN_FRAME_LEN {
            return Err(ProtocolError::MalformedFrame(format!(
                "frame too short: {} bytes",
                data.len()
            )));
        }

        let header = MbapHeader::parse(data)?;
        if header.protocol_id != 0 {
            return Err(ProtocolError::MalformedFrame(format!(
                "invalid protocol ID: expected 0, got {}",
                header.protocol_id
            )));
        }
        if header.length as usize > MAX_MBAP_LENGTH {
            return Err(ProtocolError::MalformedFrame(format!(
                "declared length {} exceeds maximum {MAX_MBAP_LENGTH}",
                header.length
            )));
        }
        if data.len() != MBAP_HEADER_LEN + header.length as usize {
            return Err(ProtocolError::MalformedFrame(format!(
                "declared length {} disagrees with {} available payload bytes",
                header.length,
                data.len() - MBAP_HEADER_LEN
            )));
        }

        let function = data[MBAP_HEADER_LEN + 1];
        let body = &data[MBAP_HEADER_LEN + 2..];
        let pdu = Pdu::parse_body(function, body, direction)?;

        debug!(
            "parsed frame: trans_id={:04X}, unit_id={}, FC={:02X}, body_len={}",
            header.transaction_id,
            header.unit_id,
            function,
            body.len()
        );

        Ok(Self {
            transaction_id: header.transaction_id,
            unit_id: header.unit_id,
            pdu,
        })
    }

    /// Serialize to wire bytes, recomputing the MBAP length from the
    /// payload actually emitted (the inbound value is never trusted).
    pub fn serialize(&self) -> Vec<u8> {
        let mut body = Vec::new();
        self.pdu.write_body(&mut body);

        let length = (2 + body.len()) as u16; // unit_id + function code + body

        let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + length as usize);
        frame.extend_from_slice(&self.transaction_id.to_be_bytes());
        frame.extend_from_slice(&0u16.to_be_bytes()); // protocol_id
        frame.extend_from_slice(&length.to_be_bytes());
        frame.push(self.unit_id);
        frame.push(self.pdu.function_code());
        frame.extend_from_slice(&body);
        frame
    }
}

/// Total frame length declared by a buffered MBAP header, once the six
/// header bytes are available. Used to split a read buffer into frames.
pub fn declared_frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < MBAP_HEADER_LEN {
        return None;
    }
    let length = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    Some(MBAP_HEADER_LEN + length)
}

/// Pack bits into bytes, LSB-first: bit `k` lands in `byte[k / 8]` at
/// position `k % 8`. Produces `ceil(n / 8)` bytes.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (k, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[k / 8] |= 1 << (k % 8);
        }
    }
    bytes
}

/// Unpack every bit of `bytes`, LSB-first within each byte
pub fn unpack_bits(bytes: &[u8]) -> Vec<bool> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        for pos in 0..8 {
            bits.push(byte & (1 << pos) != 0);
        }
    }
    bits
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn roundtrip(adu: &ModbusAdu, direction: Direction) {
        let bytes = adu.serialize();
        let parsed = ModbusAdu::parse(&bytes, direction).unwrap();
        assert_eq!(&parsed, adu);
    }

    #[test]
    fn test_roundtrip_read_requests() {
        for fc in [
            FC_READ_COILS,
            FC_READ_DISCRETE_INPUTS,
            FC_READ_HOLDING_REGISTERS,
            FC_READ_INPUT_REGISTERS,
        ] {
            let adu = ModbusAdu {
                transaction_id: 0x1234,
                unit_id: 1,
                pdu: Pdu::ReadRequest {
                    function: fc,
                    address: 0x0000,
                    quantity: 10,
                },
            };
            roundtrip(&adu, Direction::Request);
        }
    }

    #[test]
    fn test_roundtrip_bit_responses_boundary_quantities() {
        // 0 coils, 1 byte worth, and the 2000-coil limit (250 bytes).
        for n_bytes in [0usize, 1, 250] {
            let bits = unpack_bits(&vec![0xA5; n_bytes]);
            let adu = ModbusAdu {
                transaction_id: 7,
                unit_id: 1,
                pdu: Pdu::ReadBitsResponse {
                    function: FC_READ_COILS,
                    bits,
                },
            };
            roundtrip(&adu, Direction::Response);
        }
    }

    #[test]
    fn test_roundtrip_register_responses_boundary_quantities() {
        for n_regs in [1usize, 125] {
            let registers: Vec<u16> = (0..n_regs as u16).map(|i| i * 3 + 1).collect();
            let adu = ModbusAdu {
                transaction_id: 0xFFFF,
                unit_id: 1,
                pdu: Pdu::ReadRegistersResponse {
                    function: FC_READ_HOLDING_REGISTERS,
                    registers,
                },
            };
            roundtrip(&adu, Direction::Response);
        }
    }

    #[test]
    fn test_roundtrip_write_single_coil_both_directions() {
        for value in [CoilState::On, CoilState::Off] {
            let adu = ModbusAdu {
                transaction_id: 1,
                unit_id: 1,
                pdu: Pdu::WriteSingleCoil { address: 0, value },
            };
            roundtrip(&adu, Direction::Request);
            roundtrip(&adu, Direction::Response);
        }
    }

    #[test]
    fn test_roundtrip_raw_passthrough() {
        // FC16 is out of the supported set; bytes must survive untouched.
        let adu = ModbusAdu {
            transaction_id: 9,
            unit_id: 1,
            pdu: Pdu::Raw {
                function: 0x10,
                payload: vec![0x00, 0x01, 0x00, 0x01, 0x02, 0x12, 0x34],
            },
        };
        roundtrip(&adu, Direction::Request);
        roundtrip(&adu, Direction::Response);
    }

    #[test]
    fn test_exception_response_surfaces_as_raw() {
        // FC03 exception: function 0x83, code 0x02
        let frame = [0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x02];
        let adu = ModbusAdu::parse(&frame, Direction::Response).unwrap();
        assert_eq!(
            adu.pdu,
            Pdu::Raw {
                function: 0x83,
                payload: vec![0x02],
            }
        );
        assert!(adu.pdu.is_exception());
    }

    #[test]
    fn test_known_write_coil_off_bytes() {
        // Tx=1, unit=1, write coil 0 -> OFF
        let frame = [
            0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x00, 0x00, 0x00,
        ];
        let adu = ModbusAdu::parse(&frame, Direction::Request).unwrap();
        assert_eq!(adu.transaction_id, 1);
        assert_eq!(adu.unit_id, 1);
        assert_eq!(
            adu.pdu,
            Pdu::WriteSingleCoil {
                address: 0,
                value: CoilState::Off,
            }
        );
        assert_eq!(adu.serialize(), frame);
    }

    #[test]
    fn test_parse_rejects_short_frame() {
        let result = ModbusAdu::parse(&[0x00, 0x01, 0x00, 0x00], Direction::Request);
        assert!(matches!(result, Err(ProtocolError::MalformedFrame(_))));
    }

    #[test]
    fn test_parse_rejects_nonzero_protocol_id() {
        let frame = [0x00, 0x01, 0x00, 0x01, 0x00, 0x02, 0x01, 0x05];
        let result = ModbusAdu::parse(&frame, Direction::Request);
        assert!(result.unwrap_err().to_string().contains("protocol ID"));
    }

    #[test]
    fn test_parse_rejects_length_mismatch() {
        // Declares 6 bytes after the length field but carries 4.
        let frame = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x00];
        let result = ModbusAdu::parse(&frame, Direction::Request);
        assert!(result.unwrap_err().to_string().contains("disagrees"));
    }

    #[test]
    fn test_parse_rejects_invalid_coil_value() {
        let frame = [
            0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x00, 0x12, 0x34,
        ];
        let result = ModbusAdu::parse(&frame, Direction::Request);
        assert!(result.unwrap_err().to_string().contains("coil value"));
    }

    #[test]
    fn test_serialize_recomputes_length() {
        let adu = ModbusAdu {
            transaction_id: 0x0001,
            unit_id: 1,
            pdu: Pdu::ReadRegistersResponse {
                function: FC_READ_HOLDING_REGISTERS,
                registers: vec![0x000A, 0x0102],
            },
        };
        let bytes = adu.serialize();
        // length = unit(1) + fc(1) + byte_count(1) + 4 data bytes
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 7);
        assert_eq!(bytes.len(), MBAP_HEADER_LEN + 7);
    }

    #[test]
    fn test_coil_packing_nine_coils() {
        let mut bits = vec![false; 9];
        bits[8] = true;
        let packed = pack_bits(&bits);
        assert_eq!(packed.len(), 2); // byte_count = ceil(9/8)
        assert_eq!(packed[0], 0x00);
        assert_eq!(packed[1], 0x01); // coil 8 -> byte 1, bit 0
    }

    #[test]
    fn test_coil_packing_lsb_first() {
        // 11001101 pattern from the Modbus spec example
        let bits = unpack_bits(&[0xCD]);
        assert_eq!(
            bits,
            vec![true, false, true, true, false, false, true, true]
        );
        assert_eq!(pack_bits(&bits), vec![0xCD]);
    }

    #[test]
    fn test_declared_frame_len() {
        let frame = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05];
        assert_eq!(declared_frame_len(&frame), Some(12));
        assert_eq!(declared_frame_len(&frame[..5]), None);
    }

    #[test]
    fn test_read_request_direction_matters() {
        // The same FC03 bytes are a request on one side and malformed as
        // a response (4-byte body cannot satisfy byte_count + data).
        let adu = ModbusAdu {
            transaction_id: 2,
            unit_id: 1,
            pdu: Pdu::ReadRequest {
                function: FC_READ_HOLDING_REGISTERS,
                address: 0,
                quantity: 2,
            },
        };
        let bytes = adu.serialize();
        assert!(ModbusAdu::parse(&bytes, Direction::Request).is_ok());
        assert!(ModbusAdu::parse(&bytes, Direction::Response).is_err());
    }
}
