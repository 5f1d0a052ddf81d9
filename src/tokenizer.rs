//! Line tokenizer for the snapshot format
//!
//! Every header and record line after the preamble is a sequence of
//! `KEY=VALUE` pairs separated by `|`:
//!
//! ```text
//! KEY="etc/hosts"|TYPE=f|SIZE=220|UID=0|GID=0|PERM=0644|...
//! ```
//!
//! [`tokenize`] turns one line into a flat, ordered field list
//! (`key0, value0, key1, value1, ...`) using a byte-level state machine:
//!
//! | State       | Meaning                                            |
//! |-------------|----------------------------------------------------|
//! | `Undefined` | between tokens, nothing captured yet               |
//! | `Bare`      | inside an unquoted run (key or value)              |
//! | `Quoted`    | inside a `"..."` value; every byte is literal      |
//! | `Delimiter` | after a closing quote, expecting `\|` or line end  |
//!
//! Grammar details:
//!
//! - Keys are made of ASCII alphanumerics and `_`; other bytes in key
//!   position are ignored.
//! - A quoted value ends at a `"` that is followed by `|` or the end of the
//!   line. A `"` anywhere else inside the span is kept verbatim.
//! - If the closing quote never comes, the opening quote is treated as a
//!   literal byte and the value is re-read as a bare run.
//! - A control byte outside a quoted span ends the line.
//!
//! The tokenizer is a pure function of its input and does not allocate more
//! than the captured fields.

use thiserror::Error;

/// Longest single field (key or value) accepted
pub const MAX_FIELD_LEN: usize = 4096;

/// Most fields (keys plus values) accepted on one line
pub const MAX_FIELDS: usize = 1024;

/// Reasons a line cannot be tokenized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// A key was not followed by `=`
    #[error("key without value at byte {0}")]
    IncompletePair(usize),
    /// `=` appeared with no key in front of it
    #[error("empty key at byte {0}")]
    EmptyKey(usize),
    /// A field grew past [`MAX_FIELD_LEN`]
    #[error("field exceeds {MAX_FIELD_LEN} bytes")]
    FieldTooLong,
    /// More than [`MAX_FIELDS`] fields on one line
    #[error("more than {MAX_FIELDS} fields on one line")]
    TooManyFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Undefined,
    Bare,
    Quoted,
    Delimiter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Key,
    Value,
}

/// Fields of one tokenized line, addressable by position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLine {
    fields: Vec<Vec<u8>>,
}

impl ParsedLine {
    /// Number of captured fields (always even)
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Number of key/value pairs
    pub fn pair_count(&self) -> usize {
        self.fields.len() / 2
    }

    /// Field at `index`; even positions are keys, odd positions values
    pub fn field(&self, index: usize) -> Option<&[u8]> {
        self.fields.get(index).map(Vec::as_slice)
    }

    /// Key/value pairs in line order
    pub fn pairs(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.fields
            .chunks_exact(2)
            .map(|pair| (pair[0].as_slice(), pair[1].as_slice()))
    }

    /// Value of the first pair whose key equals `key`
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.pairs()
            .find(|(k, _)| *k == key.as_bytes())
            .map(|(_, v)| v)
    }

    /// Check if no pairs were found
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

struct Machine<'a> {
    line: &'a [u8],
    pos: usize,
    state: State,
    side: Side,
    token: Vec<u8>,
    quote_start: usize,
    fields: Vec<Vec<u8>>,
}

impl<'a> Machine<'a> {
    fn new(line: &'a [u8]) -> Self {
        Self {
            line,
            pos: 0,
            state: State::Undefined,
            side: Side::Key,
            token: Vec::new(),
            quote_start: 0,
            fields: Vec::new(),
        }
    }

    fn push_byte(&mut self, b: u8) -> Result<(), TokenError> {
        if self.token.len() >= MAX_FIELD_LEN {
            return Err(TokenError::FieldTooLong);
        }
        self.token.push(b);
        Ok(())
    }

    fn finish_token(&mut self) -> Result<(), TokenError> {
        if self.fields.len() >= MAX_FIELDS {
            return Err(TokenError::TooManyFields);
        }
        self.fields.push(std::mem::take(&mut self.token));
        self.side = match self.side {
            Side::Key => Side::Value,
            Side::Value => Side::Key,
        };
        self.state = State::Undefined;
        Ok(())
    }

    /// Handle running out of input (or hitting a line-ending control byte)
    ///
    /// Returns `true` when tokenizing resumes at a rewound position.
    fn end_of_line(&mut self) -> Result<bool, TokenError> {
        match (self.state, self.side) {
            (State::Quoted, _) => {
                // Unterminated quote: keep it as a literal and re-read bare
                self.token.clear();
                self.push_byte(b'"')?;
                self.pos = self.quote_start + 1;
                self.state = State::Bare;
                Ok(true)
            }
            (State::Bare, Side::Value) | (State::Undefined, Side::Value) => {
                self.finish_token()?;
                Ok(false)
            }
            (State::Bare, Side::Key) => Err(TokenError::IncompletePair(self.pos)),
            (State::Undefined, Side::Key) | (State::Delimiter, _) => Ok(false),
        }
    }

    fn run(mut self) -> Result<ParsedLine, TokenError> {
        loop {
            let Some(&b) = self.line.get(self.pos) else {
                if self.end_of_line()? {
                    continue;
                }
                break;
            };
            let is_control = b < 0x20 || b == 0x7f;

            match self.state {
                State::Undefined => {
                    if is_control {
                        if self.end_of_line()? {
                            continue;
                        }
                        break;
                    }
                    match (b, self.side) {
                        (b'"', Side::Value) => {
                            self.state = State::Quoted;
                            self.quote_start = self.pos;
                            self.pos += 1;
                        }
                        (b'=', Side::Key) => return Err(TokenError::EmptyKey(self.pos)),
                        (b'|', Side::Key) => self.pos += 1,
                        (b'|', Side::Value) => {
                            self.finish_token()?;
                            self.pos += 1;
                        }
                        _ => self.state = State::Bare,
                    }
                }
                State::Bare => {
                    if is_control {
                        if self.end_of_line()? {
                            continue;
                        }
                        break;
                    }
                    match (b, self.side) {
                        (b'=', Side::Key) => {
                            if self.token.is_empty() {
                                return Err(TokenError::EmptyKey(self.pos));
                            }
                            self.finish_token()?;
                        }
                        (b'|', Side::Key) => return Err(TokenError::IncompletePair(self.pos)),
                        (b'|', Side::Value) => self.finish_token()?,
                        (c, Side::Key) if c.is_ascii_alphanumeric() || c == b'_' => {
                            self.push_byte(c)?
                        }
                        (_, Side::Key) => {}
                        (c, Side::Value) => self.push_byte(c)?,
                    }
                    self.pos += 1;
                }
                State::Quoted => {
                    let next = self.line.get(self.pos + 1).copied();
                    let closes = b == b'"'
                        && match next {
                            None => true,
                            Some(n) => n == b'|' || n < 0x20 || n == 0x7f,
                        };
                    if closes {
                        self.finish_token()?;
                        self.state = State::Delimiter;
                    } else {
                        self.push_byte(b)?;
                    }
                    self.pos += 1;
                }
                State::Delimiter => {
                    if is_control {
                        break;
                    }
                    // Only `|` can follow a closing quote
                    self.state = State::Undefined;
                    self.pos += 1;
                }
            }
        }

        Ok(ParsedLine {
            fields: self.fields,
        })
    }
}

/// Split one line into its key/value fields
///
/// # Errors
///
/// Returns a [`TokenError`] when a key has no value, a key is empty, or a
/// length limit is exceeded.
///
/// # Example
///
/// ```rust
/// use difftree::tokenizer::tokenize;
///
/// let line = tokenize(br#"KEY="a|b"|SIZE=5"#).unwrap();
/// assert_eq!(line.field(1), Some(&b"a|b"[..]));
/// assert_eq!(line.get("SIZE"), Some(&b"5"[..]));
/// ```
pub fn tokenize(line: &[u8]) -> Result<ParsedLine, TokenError> {
    Machine::new(line).run()
}
