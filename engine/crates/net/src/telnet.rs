//! Telnet framing.
//!
//! Splits an inbound byte stream into frames: negotiation instructions
//! (`IAC WILL|WONT|DO|DONT <opt>`) and LF-terminated text lines. The server
//! supports no telnet options, so every negotiation is answered with a
//! refusal (see [`Negotiation::refusal`]).
//!
//! `IAC IAC` is a literal 0xff data byte. Subnegotiation blocks
//! (`IAC SB ... IAC SE`) and two-byte commands (NOP, GA, ...) are consumed
//! without producing a frame.

use std::collections::VecDeque;

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

/// Longest line content accepted, terminator excluded.
pub const MAX_LINE_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Will,
    Wont,
    Do,
    Dont,
}

impl Intent {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            WILL => Some(Self::Will),
            WONT => Some(Self::Wont),
            DO => Some(Self::Do),
            DONT => Some(Self::Dont),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Will => WILL,
            Self::Wont => WONT,
            Self::Do => DO,
            Self::Dont => DONT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    pub intent: Intent,
    pub option: u8,
}

impl Negotiation {
    /// The reply declining this instruction's capability.
    ///
    /// "I will do X" / "I won't do X" => `DONT X`;
    /// "please do X" / "please don't" => `WONT X`.
    pub fn refusal(&self) -> [u8; 3] {
        let reply = match self.intent {
            Intent::Will | Intent::Wont => DONT,
            Intent::Do | Intent::Dont => WONT,
        };
        [IAC, reply, self.option]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Negotiation(Negotiation),
    /// One line, terminator stripped. Invalid UTF-8 is replaced, not rejected.
    Line(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramerError {
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

#[derive(Debug, Default, Clone, Copy)]
enum State {
    #[default]
    Data,
    Iac,
    Negotiate(Intent),
    Subneg { iac_seen: bool },
}

/// Streaming framer. Feed bytes with [`Framer::push`], then drain frames
/// with [`Framer::next_frame`] until it returns `Ok(None)`.
///
/// A partial line or partial control sequence at the end of the input is
/// kept until more bytes arrive. Once a line overflows, the framer stays
/// failed.
#[derive(Debug, Default)]
pub struct Framer {
    input: VecDeque<u8>,
    state: State,
    line: Vec<u8>,
    failed: bool,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>, FramerError> {
        if self.failed {
            return Err(Self::overflow());
        }
        while let Some(b) = self.input.pop_front() {
            match self.state {
                State::Data => match b {
                    IAC => self.state = State::Iac,
                    b'\n' => {
                        let line = String::from_utf8_lossy(&self.line).into_owned();
                        self.line.clear();
                        return Ok(Some(Frame::Line(line)));
                    }
                    b'\r' | 0 => {}
                    _ => self.push_data(b)?,
                },
                State::Iac => {
                    if b == IAC {
                        self.state = State::Data;
                        self.push_data(IAC)?;
                    } else if let Some(intent) = Intent::from_byte(b) {
                        self.state = State::Negotiate(intent);
                    } else if b == SB {
                        self.state = State::Subneg { iac_seen: false };
                    } else {
                        self.state = State::Data;
                    }
                }
                State::Negotiate(intent) => {
                    self.state = State::Data;
                    return Ok(Some(Frame::Negotiation(Negotiation { intent, option: b })));
                }
                State::Subneg { iac_seen } => {
                    self.state = match (iac_seen, b) {
                        (true, SE) => State::Data,
                        (false, IAC) => State::Subneg { iac_seen: true },
                        _ => State::Subneg { iac_seen: false },
                    };
                }
            }
        }
        Ok(None)
    }

    /// Bytes of the line currently being assembled.
    pub fn pending_len(&self) -> usize {
        self.line.len()
    }

    fn push_data(&mut self, b: u8) -> Result<(), FramerError> {
        if self.line.len() >= MAX_LINE_LEN {
            self.failed = true;
            self.line.clear();
            self.input.clear();
            return Err(Self::overflow());
        }
        self.line.push(b);
        Ok(())
    }

    fn overflow() -> FramerError {
        FramerError::LineTooLong {
            limit: MAX_LINE_LEN,
        }
    }
}
