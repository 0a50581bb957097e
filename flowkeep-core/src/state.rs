//! Handshake and teardown tracking.
//!
//! A deliberately small state machine: it only checks that a segment is
//! plausible given the control flags seen so far. Sequence, window and
//! checksum validation are left out.

use crate::flow::{Direction, TcpFlags};

/// Connection state as seen from the capture point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing (or nothing plausible) seen yet.
    AwaitingSetup,
    /// Client SYN seen, waiting for the server's SYN+ACK.
    SynSent,
    Established,
    /// One side sent FIN.
    Closing,
    /// Both sides sent FIN, waiting for the final ACK.
    LastAck,
    Closed,
    Reset,
}

impl HandshakeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeState::AwaitingSetup => "awaiting_setup",
            HandshakeState::SynSent => "syn_sent",
            HandshakeState::Established => "established",
            HandshakeState::Closing => "closing",
            HandshakeState::LastAck => "last_ack",
            HandshakeState::Closed => "closed",
            HandshakeState::Reset => "reset",
        }
    }
}

/// Outcome of [`StateMachine::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// The segment may be handed to reassembly.
    pub accepted: bool,
    /// The segment did not fit the current state.
    pub anomaly: bool,
}

impl Verdict {
    const ACCEPT: Verdict = Verdict {
        accepted: true,
        anomaly: false,
    };
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    state: HandshakeState,
    strict: bool,
    /// Direction of the first FIN, once seen.
    fin_from: Option<Direction>,
    /// First segment was mid-stream under strict mode.
    nonconforming: bool,
    /// Sticky protocol anomaly marker.
    anomalous: bool,
}

impl StateMachine {
    pub fn new(strict: bool) -> Self {
        Self {
            state: HandshakeState::AwaitingSetup,
            strict,
            fin_from: None,
            nonconforming: false,
            anomalous: false,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_nonconforming(&self) -> bool {
        self.nonconforming
    }

    pub fn is_anomalous(&self) -> bool {
        self.anomalous
    }

    /// Advance the state for `flags` travelling in `direction` and decide
    /// whether the segment may be reassembled.
    pub fn evaluate(&mut self, flags: TcpFlags, direction: Direction) -> Verdict {
        use HandshakeState::*;

        if self.nonconforming {
            return Verdict {
                accepted: false,
                anomaly: false,
            };
        }

        let plausible = match self.state {
            AwaitingSetup => {
                if flags.syn && !flags.ack && direction == Direction::ClientToServer {
                    self.state = SynSent;
                    true
                } else if flags.syn {
                    false
                } else if self.strict {
                    self.nonconforming = true;
                    return Verdict {
                        accepted: false,
                        anomaly: false,
                    };
                } else {
                    self.state = Established;
                    self.on_established(flags, direction);
                    true
                }
            }
            SynSent => {
                if flags.rst {
                    self.state = Reset;
                    true
                } else if flags.syn && flags.ack && direction == Direction::ServerToClient {
                    self.state = Established;
                    true
                } else {
                    // A retransmitted client SYN is fine, anything else is early.
                    flags.syn && !flags.ack && direction == Direction::ClientToServer
                }
            }
            Established => {
                self.on_established(flags, direction);
                true
            }
            Closing => {
                if flags.rst {
                    self.state = Reset;
                } else if flags.fin && self.fin_from != Some(direction) {
                    self.state = LastAck;
                }
                true
            }
            LastAck => {
                if flags.rst {
                    self.state = Reset;
                } else if flags.ack && !flags.fin {
                    self.state = Closed;
                }
                true
            }
            Closed | Reset => false,
        };

        if plausible {
            return Verdict::ACCEPT;
        }

        self.anomalous = true;
        Verdict {
            accepted: !self.strict,
            anomaly: true,
        }
    }

    fn on_established(&mut self, flags: TcpFlags, direction: Direction) {
        if flags.rst {
            self.state = HandshakeState::Reset;
        } else if flags.fin {
            self.state = HandshakeState::Closing;
            self.fin_from = Some(direction);
        }
    }
}
