//! Register/coil datastore backing the Modbus server.
//!
//! One table each for coils, discrete inputs and registers. Input
//! registers (FC04) are served from the same block as holding registers
//! (FC03), mirroring the single sequential datablock the twin was
//! originally modeled with. Out-of-range access returns `None`; the
//! server maps that to an Illegal Data Address exception.
//!
//! The store itself is not synchronized. The server wraps it in a
//! `parking_lot::RwLock` and the updater publishes each simulation tick
//! under one write lock, so readers only ever observe whole snapshots.

/// Coil, discrete-input and register tables for one unit
#[derive(Debug, Clone)]
pub struct DataStore {
    coils: Vec<bool>,
    discrete_inputs: Vec<bool>,
    registers: Vec<u16>,
}

impl DataStore {
    /// Create a store with the given initial values
    pub fn new(coils: Vec<bool>, discrete_inputs: Vec<bool>, registers: Vec<u16>) -> Self {
        Self {
            coils,
            discrete_inputs,
            registers,
        }
    }

    fn range_ok(len: usize, address: u16, quantity: u16) -> bool {
        let end = address as usize + quantity as usize;
        quantity > 0 && end <= len
    }

    /// Read `quantity` coils starting at `address`
    pub fn read_coils(&self, address: u16, quantity: u16) -> Option<Vec<bool>> {
        if !Self::range_ok(self.coils.len(), address, quantity) {
            return None;
        }
        let start = address as usize;
        Some(self.coils[start..start + quantity as usize].to_vec())
    }

    /// Read `quantity` discrete inputs starting at `address`
    pub fn read_discrete_inputs(&self, address: u16, quantity: u16) -> Option<Vec<bool>> {
        if !Self::range_ok(self.discrete_inputs.len(), address, quantity) {
            return None;
        }
        let start = address as usize;
        Some(self.discrete_inputs[start..start + quantity as usize].to_vec())
    }

    /// Read `quantity` registers starting at `address` (FC03 and FC04)
    pub fn read_registers(&self, address: u16, quantity: u16) -> Option<Vec<u16>> {
        if !Self::range_ok(self.registers.len(), address, quantity) {
            return None;
        }
        let start = address as usize;
        Some(self.registers[start..start + quantity as usize].to_vec())
    }

    /// Write a single coil; `None` when the address is out of range
    pub fn write_coil(&mut self, address: u16, value: bool) -> Option<()> {
        let slot = self.coils.get_mut(address as usize)?;
        *slot = value;
        Some(())
    }

    /// Current coil values
    pub fn coils(&self) -> &[bool] {
        &self.coils
    }

    /// Replace every table in one call. Combined with an exclusive lock
    /// this makes a simulation tick a single unobservable step.
    pub fn publish(&mut self, coils: &[bool], discrete_inputs: &[bool], registers: &[u16]) {
        self.coils.clear();
        self.coils.extend_from_slice(coils);
        self.discrete_inputs.clear();
        self.discrete_inputs.extend_from_slice(discrete_inputs);
        self.registers.clear();
        self.registers.extend_from_slice(registers);
    }
}
