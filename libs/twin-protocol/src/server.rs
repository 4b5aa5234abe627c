//! Async Modbus/TCP server answering FC 1-5 from a shared [`DataStore`].
//!
//! One task per accepted connection; each request is answered before the
//! next is read. Store access takes the lock per request, so a
//! publisher holding the write lock is never observed mid-tick.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::constants::{
    EXCEPTION_BIT, EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE,
    EXCEPTION_ILLEGAL_FUNCTION, FC_READ_COILS, FC_READ_DISCRETE_INPUTS,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, MAX_READ_COILS, MAX_READ_REGISTERS,
};
use crate::error::{ProtocolError, Result};
use crate::frame::{Direction, ModbusAdu, Pdu};
use crate::net::{read_frame, write_frame};
use crate::store::DataStore;

/// Shared handle to the server's datastore
pub type SharedStore = Arc<RwLock<DataStore>>;

/// Accept connections until cancelled.
///
/// Each connection gets its own task; a transport error terminates only
/// that connection, never the listener.
pub async fn serve(listener: TcpListener, store: SharedStore, cancel: CancellationToken) {
    info!(
        "modbus server listening on {:?}",
        listener.local_addr().ok()
    );
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("modbus server shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {peer}");
                        let store = store.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, store, cancel).await {
                                error!("connection from {peer} failed: {e}");
                            } else {
                                debug!("connection from {peer} closed");
                            }
                        });
                    },
                    Err(e) => error!("accept failed: {e}"),
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    store: SharedStore,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let bytes = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = read_frame(&mut stream) => match read? {
                Some(bytes) => bytes,
                None => return Ok(()),
            },
        };

        let request = ModbusAdu::parse(&bytes, Direction::Request)?;
        let response = answer(&request, &store);
        write_frame(&mut stream, &response.serialize()).await?;
    }
}

/// Build the response ADU for one request against the store.
///
/// Pure with respect to the network; exercised directly by tests.
pub fn answer(request: &ModbusAdu, store: &SharedStore) -> ModbusAdu {
    let pdu = match &request.pdu {
        Pdu::ReadRequest {
            function,
            address,
            quantity,
        } => answer_read(*function, *address, *quantity, store),
        Pdu::WriteSingleCoil { address, value } => {
            match store.write().write_coil(*address, value.is_on()) {
                Some(()) => Pdu::WriteSingleCoil {
                    address: *address,
                    value: *value,
                },
                None => exception(request.pdu.function_code(), EXCEPTION_ILLEGAL_DATA_ADDRESS),
            }
        },
        Pdu::Raw { function, .. } => {
            warn!("unsupported function code 0x{function:02X}, answering Illegal Function");
            exception(*function, EXCEPTION_ILLEGAL_FUNCTION)
        },
        // Response-shaped PDUs cannot come out of Direction::Request parsing
        other => exception(other.function_code(), EXCEPTION_ILLEGAL_FUNCTION),
    };

    ModbusAdu {
        transaction_id: request.transaction_id,
        unit_id: request.unit_id,
        pdu,
    }
}

fn answer_read(function: u8, address: u16, quantity: u16, store: &SharedStore) -> Pdu {
    let store = store.read();
    match function {
        FC_READ_COILS | FC_READ_DISCRETE_INPUTS => {
            if quantity == 0 || quantity > MAX_READ_COILS {
                return exception(function, EXCEPTION_ILLEGAL_DATA_VALUE);
            }
            let bits = if function == FC_READ_COILS {
                store.read_coils(address, quantity)
            } else {
                store.read_discrete_inputs(address, quantity)
            };
            match bits {
                Some(bits) => Pdu::ReadBitsResponse { function, bits },
                None => exception(function, EXCEPTION_ILLEGAL_DATA_ADDRESS),
            }
        },
        FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
            if quantity == 0 || quantity > MAX_READ_REGISTERS {
                return exception(function, EXCEPTION_ILLEGAL_DATA_VALUE);
            }
            match store.read_registers(address, quantity) {
                Some(registers) => Pdu::ReadRegistersResponse {
                    function,
                    registers,
                },
                None => exception(function, EXCEPTION_ILLEGAL_DATA_ADDRESS),
            }
        },
        _ => exception(function, EXCEPTION_ILLEGAL_FUNCTION),
    }
}

fn exception(function: u8, code: u8) -> Pdu {
    Pdu::Raw {
        function: function | EXCEPTION_BIT,
        payload: vec![code],
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::client::ModbusTcpClient;
    use crate::frame::CoilState;

    fn shared_store() -> SharedStore {
        Arc::new(RwLock::new(DataStore::new(
            vec![true],
            vec![true],
            vec![100, 200],
        )))
    }

    fn request(pdu: Pdu) -> ModbusAdu {
        ModbusAdu {
            transaction_id: 42,
            unit_id: 1,
            pdu,
        }
    }

    #[test]
    fn test_answer_read_coils() {
        let store = shared_store();
        let response = answer(
            &request(Pdu::ReadRequest {
                function: FC_READ_COILS,
                address: 0,
                quantity: 1,
            }),
            &store,
        );
        assert_eq!(response.transaction_id, 42);
        match response.pdu {
            Pdu::ReadBitsResponse { bits, .. } => {
                assert_eq!(bits.len(), 8); // padded to a whole byte
                assert!(bits[0]);
            },
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_answer_read_registers() {
        let store = shared_store();
        let response = answer(
            &request(Pdu::ReadRequest {
                function: FC_READ_HOLDING_REGISTERS,
                address: 0,
                quantity: 2,
            }),
            &store,
        );
        assert_eq!(
            response.pdu,
            Pdu::ReadRegistersResponse {
                function: FC_READ_HOLDING_REGISTERS,
                registers: vec![100, 200],
            }
        );
    }

    #[test]
    fn test_answer_input_registers_alias_holding() {
        let store = shared_store();
        let response = answer(
            &request(Pdu::ReadRequest {
                function: FC_READ_INPUT_REGISTERS,
                address: 0,
                quantity: 2,
            }),
            &store,
        );
        match response.pdu {
            Pdu::ReadRegistersResponse { registers, .. } => {
                assert_eq!(registers, vec![100, 200]);
            },
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_answer_write_coil_echo_and_store() {
        let store = shared_store();
        let response = answer(
            &request(Pdu::WriteSingleCoil {
                address: 0,
                value: CoilState::Off,
            }),
            &store,
        );
        assert_eq!(
            response.pdu,
            Pdu::WriteSingleCoil {
                address: 0,
                value: CoilState::Off,
            }
        );
        assert_eq!(store.read().read_coils(0, 1), Some(vec![false]));
    }

    #[test]
    fn test_answer_illegal_address() {
        let store = shared_store();
        let response = answer(
            &request(Pdu::ReadRequest {
                function: FC_READ_HOLDING_REGISTERS,
                address: 10,
                quantity: 2,
            }),
            &store,
        );
        assert_eq!(
            response.pdu,
            Pdu::Raw {
                function: FC_READ_HOLDING_REGISTERS | EXCEPTION_BIT,
                payload: vec![EXCEPTION_ILLEGAL_DATA_ADDRESS],
            }
        );
    }

    #[test]
    fn test_answer_illegal_quantity() {
        let store = shared_store();
        let response = answer(
            &request(Pdu::ReadRequest {
                function: FC_READ_COILS,
                address: 0,
                quantity: MAX_READ_COILS + 1,
            }),
            &store,
        );
        assert_eq!(
            response.pdu,
            Pdu::Raw {
                function: FC_READ_COILS | EXCEPTION_BIT,
                payload: vec![EXCEPTION_ILLEGAL_DATA_VALUE],
            }
        );
    }

    #[test]
    fn test_answer_unsupported_function() {
        let store = shared_store();
        let response = answer(
            &request(Pdu::Raw {
                function: 0x10,
                payload: vec![0x00, 0x00, 0x00, 0x01, 0x02, 0x00, 0x07],
            }),
            &store,
        );
        assert_eq!(
            response.pdu,
            Pdu::Raw {
                function: 0x90,
                payload: vec![EXCEPTION_ILLEGAL_FUNCTION],
            }
        );
    }

    #[tokio::test]
    async fn test_client_server_over_socket() {
        let store = shared_store();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, store.clone(), cancel.clone()));

        let mut client = ModbusTcpClient::connect(addr, 1).await.unwrap();

        let coils = client.read_coils(0, 1).await.unwrap();
        assert_eq!(coils, vec![true]);

        let inputs = client.read_discrete_inputs(0, 1).await.unwrap();
        assert_eq!(inputs, vec![true]);

        let regs = client.read_holding_registers(0, 2).await.unwrap();
        assert_eq!(regs, vec![100, 200]);

        let echo = client.write_coil(0, false).await.unwrap();
        assert_eq!(echo, CoilState::Off);
        assert_eq!(store.read().read_coils(0, 1), Some(vec![false]));

        // Out-of-range read surfaces the Modbus exception
        let err = client.read_holding_registers(50, 2).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Exception { code: 0x02, .. }));

        client.close().await.unwrap();
        cancel.cancel();
        server.await.unwrap();
    }
}
