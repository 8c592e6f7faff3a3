//! In-flight accounting.
//!
//! Every command sent adds one to the counter and every reply read takes one
//! away. Without pipelining the counter may only ever be 0 or 1: a second send
//! before the first reply is read means the caller has lost track of which
//! reply belongs to which command.

use crate::connection::ConnectionError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineState {
    in_flight: usize,
    pipelining: bool,
}

impl PipelineState {
    pub fn new(pipelining: bool) -> Self {
        Self {
            in_flight: 0,
            pipelining,
        }
    }

    /// Commands sent whose replies have not been read.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_pipelining(&self) -> bool {
        self.pipelining
    }

    pub fn set_pipelining(&mut self, enabled: bool) {
        self.pipelining = enabled;
    }

    /// Records a send.
    pub fn on_send(&mut self) -> Result<(), ConnectionError> {
        if !self.pipelining && self.in_flight > 0 {
            return Err(ConnectionError::PipelineDesync(
                "command sent while a reply is still unread",
            ));
        }
        self.in_flight += 1;
        Ok(())
    }

    /// Records a reply about to be read.
    pub fn on_reply(&mut self) -> Result<(), ConnectionError> {
        if self.in_flight == 0 {
            return Err(ConnectionError::PipelineDesync(
                "reply read with no command in flight",
            ));
        }
        self.in_flight -= 1;
        Ok(())
    }

    /// Ends a pipeline: the counter goes back to zero and pipelining is off.
    pub fn finish_drain(&mut self) {
        self.in_flight = 0;
        self.pipelining = false;
    }

    /// Forgets outstanding commands after the connection is torn down.
    pub fn reset(&mut self) {
        self.in_flight = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_step_mode() {
        let mut state = PipelineState::new(false);
        state.on_send().unwrap();
        assert_eq!(state.in_flight(), 1);
        assert!(matches!(
            state.on_send(),
            Err(ConnectionError::PipelineDesync(_))
        ));
        state.on_reply().unwrap();
        state.on_send().unwrap();
    }

    #[test]
    fn test_never_negative() {
        let mut state = PipelineState::default();
        assert!(matches!(
            state.on_reply(),
            Err(ConnectionError::PipelineDesync(_))
        ));
        assert_eq!(state.in_flight(), 0);
    }

    #[test]
    fn test_pipelined_mode() {
        let mut state = PipelineState::new(true);
        for _ in 0..5 {
            state.on_send().unwrap();
        }
        assert_eq!(state.in_flight(), 5);
        state.on_reply().unwrap();
        assert_eq!(state.in_flight(), 4);

        state.finish_drain();
        assert_eq!(state.in_flight(), 0);
        assert!(!state.is_pipelining());
    }

    #[test]
    fn test_reset_keeps_mode() {
        let mut state = PipelineState::new(true);
        state.on_send().unwrap();
        state.reset();
        assert_eq!(state.in_flight(), 0);
        assert!(state.is_pipelining());
    }
}
