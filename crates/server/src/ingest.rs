//! Incremental framing of a streamed JSON array.
//!
//! The upload body is one top-level JSON array of entries, possibly
//! gigabytes long, arriving in arbitrary byte chunks. [`JsonArrayFramer`]
//! splits that stream into complete element slices without buffering the
//! whole document; each element is then parsed on its own. Framing only
//! tracks string/escape state and bracket depth, so it accepts exactly the
//! documents whose elements `serde_json` would accept, and rejects broken
//! array syntax early.

use thiserror::Error;

/// Framing errors for a streamed JSON array body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("expected a JSON array")]
    NotAnArray,
    #[error("malformed JSON array near byte {offset}")]
    Malformed { offset: u64 },
    #[error("unexpected end of JSON array")]
    Truncated,
    #[error("trailing data after JSON array")]
    TrailingData,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Before the opening `[`.
    Start,
    /// Expecting the first element or `]`.
    FirstElement,
    /// Expecting an element after a comma.
    NextElement,
    /// Inside an element; brackets counted in `depth`.
    InElement,
    /// Between a completed element and the following `,` or `]`.
    AfterElement,
    /// After the closing `]`; only whitespace may follow.
    End,
}

/// Incremental splitter for a top-level JSON array.
pub struct JsonArrayFramer {
    state: State,
    element: Vec<u8>,
    depth: u32,
    in_string: bool,
    escape: bool,
    offset: u64,
}

impl JsonArrayFramer {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            element: Vec::new(),
            depth: 0,
            in_string: false,
            escape: false,
            offset: 0,
        }
    }

    /// Feed one chunk, appending any completed elements to `out`.
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<Vec<u8>>) -> Result<(), FrameError> {
        for &byte in chunk {
            self.offset += 1;
            match self.state {
                State::Start => match byte {
                    b if b.is_ascii_whitespace() => {}
                    b'[' => self.state = State::FirstElement,
                    _ => return Err(FrameError::NotAnArray),
                },
                State::FirstElement | State::NextElement => match byte {
                    b if b.is_ascii_whitespace() => {}
                    b']' if self.state == State::FirstElement => self.state = State::End,
                    _ => {
                        self.state = State::InElement;
                        self.begin_element(byte);
                    }
                },
                State::InElement => {
                    // A scalar element has no terminator of its own; the
                    // delimiter that ends it belongs to the array.
                    if self.depth == 0 && !self.in_string {
                        match byte {
                            b',' => {
                                self.complete(out);
                                self.state = State::NextElement;
                                continue;
                            }
                            b']' => {
                                self.complete(out);
                                self.state = State::End;
                                continue;
                            }
                            b if b.is_ascii_whitespace() => {
                                self.complete(out);
                                self.state = State::AfterElement;
                                continue;
                            }
                            _ => {}
                        }
                    }
                    self.element.push(byte);
                    if self.step(byte) && self.element_closed() {
                        self.complete(out);
                    }
                }
                State::AfterElement => match byte {
                    b if b.is_ascii_whitespace() => {}
                    b',' => self.state = State::NextElement,
                    b']' => self.state = State::End,
                    _ => {
                        return Err(FrameError::Malformed {
                            offset: self.offset,
                        });
                    }
                },
                State::End => {
                    if !byte.is_ascii_whitespace() {
                        return Err(FrameError::TrailingData);
                    }
                }
            }
        }
        Ok(())
    }

    /// Assert the array was closed; call after the last chunk.
    pub fn finish(&self) -> Result<(), FrameError> {
        if self.state == State::End {
            Ok(())
        } else {
            Err(FrameError::Truncated)
        }
    }

    fn begin_element(&mut self, byte: u8) {
        self.element.clear();
        self.element.push(byte);
        self.depth = 0;
        self.in_string = false;
        self.escape = false;
        self.step(byte);
    }

    /// Advance string/bracket state by one byte. Returns true when the byte
    /// may have closed a container or string.
    fn step(&mut self, byte: u8) -> bool {
        if self.in_string {
            if self.escape {
                self.escape = false;
            } else if byte == b'\\' {
                self.escape = true;
            } else if byte == b'"' {
                self.in_string = false;
                return true;
            }
            return false;
        }
        match byte {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' => {
                self.depth = self.depth.saturating_sub(1);
                return true;
            }
            _ => {}
        }
        false
    }

    /// True when a container or string element just closed.
    fn element_closed(&self) -> bool {
        let first = self.element.first().copied();
        match first {
            Some(b'{' | b'[') => self.depth == 0,
            Some(b'"') => !self.in_string,
            _ => false,
        }
    }

    fn complete(&mut self, out: &mut Vec<Vec<u8>>) {
        out.push(std::mem::take(&mut self.element));
        self.state = State::AfterElement;
    }
}

impl Default for JsonArrayFramer {
    fn default() -> Self {
        Self::new()
    }
}
