//! Async Modbus/TCP client.
//!
//! One connection, one unit id, one in-flight transaction at a time
//! (request and response are processed strictly in send order; no
//! pipelining). Responses are validated against the pending transaction
//! id and function code before being handed back.

use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::constants::{
    EXCEPTION_BIT, FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS,
    FC_READ_INPUT_REGISTERS,
};
use crate::error::{exception_description, ProtocolError, Result};
use crate::frame::{CoilState, Direction, ModbusAdu, Pdu};
use crate::net::{read_frame, write_frame};

/// Modbus/TCP client bound to a single unit id
#[derive(Debug)]
pub struct ModbusTcpClient {
    stream: TcpStream,
    unit_id: u8,
    next_transaction_id: u16,
}

impl ModbusTcpClient {
    /// Connect to a Modbus/TCP server
    pub async fn connect<A: ToSocketAddrs>(addr: A, unit_id: u8) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ProtocolError::Connection(format!("connect failed: {e}")))?;
        Ok(Self {
            stream,
            unit_id,
            next_transaction_id: 1,
        })
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        self.stream.shutdown().await?;
        Ok(())
    }

    fn next_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        // Wraps naturally from 0xFFFF to 0x0000
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }

    /// Send one request PDU and await its validated response PDU
    async fn transact(&mut self, pdu: Pdu) -> Result<Pdu> {
        let expected_fc = pdu.function_code();
        let request = ModbusAdu {
            transaction_id: self.next_transaction_id(),
            unit_id: self.unit_id,
            pdu,
        };

        write_frame(&mut self.stream, &request.serialize()).await?;

        let bytes = read_frame(&mut self.stream)
            .await?
            .ok_or_else(|| ProtocolError::Connection("server closed connection".to_string()))?;
        let response = ModbusAdu::parse(&bytes, Direction::Response)?;

        if response.transaction_id != request.transaction_id {
            return Err(ProtocolError::InvalidData(format!(
                "transaction id mismatch: sent {:04X}, got {:04X}",
                request.transaction_id, response.transaction_id
            )));
        }
        if response.unit_id != self.unit_id {
            return Err(ProtocolError::InvalidData(format!(
                "unit id mismatch: expected {}, got {}",
                self.unit_id, response.unit_id
            )));
        }

        if response.pdu.is_exception() {
            if let Pdu::Raw { function, payload } = &response.pdu {
                let code = payload.first().copied().unwrap_or(0);
                return Err(ProtocolError::Exception {
                    function: function & !EXCEPTION_BIT,
                    code,
                    description: exception_description(code),
                });
            }
        }

        if response.pdu.function_code() != expected_fc {
            return Err(ProtocolError::InvalidData(format!(
                "function code mismatch: expected {:02X}, got {:02X}",
                expected_fc,
                response.pdu.function_code()
            )));
        }

        debug!(
            "transaction {:04X} complete: FC={:02X}",
            request.transaction_id, expected_fc
        );
        Ok(response.pdu)
    }

    async fn read_bits(&mut self, function: u8, address: u16, quantity: u16) -> Result<Vec<bool>> {
        let response = self
            .transact(Pdu::ReadRequest {
                function,
                address,
                quantity,
            })
            .await?;
        match response {
            Pdu::ReadBitsResponse { mut bits, .. } => {
                if bits.len() < quantity as usize {
                    return Err(ProtocolError::InvalidData(format!(
                        "short bit response: asked {quantity}, got {}",
                        bits.len()
                    )));
                }
                // The wire pads to whole bytes; only the asked-for bits count.
                bits.truncate(quantity as usize);
                Ok(bits)
            },
            other => Err(ProtocolError::InvalidData(format!(
                "unexpected response PDU for FC{function:02}: {other:?}"
            ))),
        }
    }

    /// Read `quantity` coils (FC01)
    pub async fn read_coils(&mut self, address: u16, quantity: u16) -> Result<Vec<bool>> {
        self.read_bits(FC_READ_COILS, address, quantity).await
    }

    /// Read `quantity` discrete inputs (FC02)
    pub async fn read_discrete_inputs(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<bool>> {
        self.read_bits(FC_READ_DISCRETE_INPUTS, address, quantity)
            .await
    }

    async fn read_register_block(
        &mut self,
        function: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>> {
        let response = self
            .transact(Pdu::ReadRequest {
                function,
                address,
                quantity,
            })
            .await?;
        match response {
            Pdu::ReadRegistersResponse { registers, .. } => {
                if registers.len() != quantity as usize {
                    return Err(ProtocolError::InvalidData(format!(
                        "register count mismatch: asked {quantity}, got {}",
                        registers.len()
                    )));
                }
                Ok(registers)
            },
            other => Err(ProtocolError::InvalidData(format!(
                "unexpected response PDU for FC{function:02}: {other:?}"
            ))),
        }
    }

    /// Read `quantity` holding registers (FC03)
    pub async fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>> {
        self.read_register_block(FC_READ_HOLDING_REGISTERS, address, quantity)
            .await
    }

    /// Read `quantity` input registers (FC04)
    pub async fn read_input_registers(&mut self, address: u16, quantity: u16) -> Result<Vec<u16>> {
        self.read_register_block(FC_READ_INPUT_REGISTERS, address, quantity)
            .await
    }

    /// Write a single coil (FC05); the server's echo is validated
    pub async fn write_coil(&mut self, address: u16, value: bool) -> Result<CoilState> {
        let sent = CoilState::from(value);
        let response = self
            .transact(Pdu::WriteSingleCoil {
                address,
                value: sent,
            })
            .await?;
        match response {
            Pdu::WriteSingleCoil {
                address: echo_addr,
                value: echo_value,
            } => {
                if echo_addr != address {
                    return Err(ProtocolError::InvalidData(format!(
                        "write echo address mismatch: sent {address}, got {echo_addr}"
                    )));
                }
                // The echoed value is returned rather than asserted equal:
                // an interposed party may acknowledge a different state.
                Ok(echo_value)
            },
            other => Err(ProtocolError::InvalidData(format!(
                "unexpected response PDU for FC05: {other:?}"
            ))),
        }
    }
}
