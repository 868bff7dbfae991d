//! Scripted fault injection

use gancathode_core::DeviceError;

#[derive(Debug, Clone)]
struct PendingFault<Op> {
    op: Op,
    /// Matching calls still allowed to succeed before this fault fires
    skip: usize,
    error: DeviceError,
}

/// Queue of faults keyed by operation
///
/// A fault fires once, on the first matching call after `skip` matching
/// calls have succeeded.
#[derive(Debug, Clone)]
pub struct FaultScript<Op> {
    pending: Vec<PendingFault<Op>>,
}

impl<Op> Default for FaultScript<Op> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<Op: Copy + PartialEq> FaultScript<Op> {
    /// Create an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `op`
    pub fn inject(&mut self, op: Op, error: DeviceError) {
        self.inject_after(op, 0, error);
    }

    /// Fail the call of `op` after `skip` successful ones
    pub fn inject_after(&mut self, op: Op, skip: usize, error: DeviceError) {
        self.pending.push(PendingFault { op, skip, error });
    }

    /// Record a call of `op`, returning the scripted error if one fires
    pub fn check(&mut self, op: Op) -> Result<(), DeviceError> {
        let mut fired = None;
        for (i, fault) in self.pending.iter_mut().enumerate() {
            if fault.op != op {
                continue;
            }
            if fault.skip == 0 {
                fired = Some(i);
                break;
            }
            fault.skip -= 1;
        }

        match fired {
            Some(i) => Err(self.pending.remove(i).error),
            None => Ok(()),
        }
    }

    /// Number of faults not yet fired
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}
