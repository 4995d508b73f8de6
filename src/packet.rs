//! Wire-format definitions for TFTP messages (RFC 1350).
//!
//! Every datagram exchanged with the peer is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout of the five message kinds.
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for malformed or truncated input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  RRQ / WRQ   | 01/02 | filename | 0 | mode | 0 |
//!  DATA        |  03   |  block   |  payload (0..=512 bytes) |
//!  ACK         |  04   |  block   |
//!  ERROR       |  05   |  code    |  message | 0 |
//!               2 bytes  2 bytes
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Opcode constants for the leading two bytes of every datagram.
pub mod opcode {
    /// Read request.
    pub const RRQ: u16 = 1;
    /// Write request.
    pub const WRQ: u16 = 2;
    /// Data block.
    pub const DATA: u16 = 3;
    /// Acknowledgment.
    pub const ACK: u16 = 4;
    /// Error.
    pub const ERROR: u16 = 5;
}

/// Fixed payload size of a full Data block.  A shorter block ends the transfer.
pub const BLOCK_SIZE: usize = 512;

/// Opcode plus block number (or error code).
pub const HEADER_LEN: usize = 4;

/// Largest well-formed Data datagram.
pub const MAX_DATA_LEN: usize = HEADER_LEN + BLOCK_SIZE;

const OPCODE_LEN: usize = 2;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Transfer-encoding name carried by read and write requests.
///
/// Payload bytes are never translated; the mode is passed through to the peer
/// as an opaque label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Netascii,
    Octet,
    Mail,
}

impl Mode {
    /// Canonical lowercase name as written on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Netascii => "netascii",
            Mode::Octet => "octet",
            Mode::Mail => "mail",
        }
    }
}

impl FromStr for Mode {
    type Err = PacketError;

    /// Mode names are case-insensitive (RFC 1350 §5).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "netascii" => Ok(Mode::Netascii),
            "octet" => Ok(Mode::Octet),
            "mail" => Ok(Mode::Mail),
            _ => Err(PacketError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Error codes carried by an Error message.
///
/// Codes outside the standard range are preserved in [`ErrorCode::Unknown`]
/// so that decoding never loses information.  Build codes from the wire with
/// [`ErrorCode::from`], which maps 0..=7 to their named variants, so that
/// `ErrorCode::from(code.as_u16()) == code` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotDefined,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTransferId,
    FileExists,
    NoSuchUser,
    /// A code above 7.  `Unknown(0..=7)` would decode as the named variant.
    Unknown(u16),
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        match self {
            ErrorCode::NotDefined => 0,
            ErrorCode::FileNotFound => 1,
            ErrorCode::AccessViolation => 2,
            ErrorCode::DiskFull => 3,
            ErrorCode::IllegalOperation => 4,
            ErrorCode::UnknownTransferId => 5,
            ErrorCode::FileExists => 6,
            ErrorCode::NoSuchUser => 7,
            ErrorCode::Unknown(code) => code,
        }
    }

    /// Human-readable description of the code.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::NotDefined => "Not defined, see error message (if any).",
            ErrorCode::FileNotFound => "File not found.",
            ErrorCode::AccessViolation => "Access violation.",
            ErrorCode::DiskFull => "Disk full or allocation exceeded.",
            ErrorCode::IllegalOperation => "Illegal TFTP operation.",
            ErrorCode::UnknownTransferId => "Unknown transfer ID.",
            ErrorCode::FileExists => "File already exists.",
            ErrorCode::NoSuchUser => "No such user.",
            ErrorCode::Unknown(_) => "Unknown error",
        }
    }
}

impl From<u16> for ErrorCode {
    fn from(code: u16) -> Self {
        match code {
            0 => ErrorCode::NotDefined,
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFull,
            4 => ErrorCode::IllegalOperation,
            5 => ErrorCode::UnknownTransferId,
            6 => ErrorCode::FileExists,
            7 => ErrorCode::NoSuchUser,
            other => ErrorCode::Unknown(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u16())
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A complete TFTP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    ReadRequest { filename: String, mode: Mode },
    WriteRequest { filename: String, mode: Mode },
    Data { block: u16, payload: Vec<u8> },
    Ack { block: u16 },
    Error { code: ErrorCode, message: String },
}

impl Packet {
    /// Numeric opcode of this message kind.
    pub fn opcode(&self) -> u16 {
        match self {
            Packet::ReadRequest { .. } => opcode::RRQ,
            Packet::WriteRequest { .. } => opcode::WRQ,
            Packet::Data { .. } => opcode::DATA,
            Packet::Ack { .. } => opcode::ACK,
            Packet::Error { .. } => opcode::ERROR,
        }
    }

    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::ReadRequest { .. } => "RRQ",
            Packet::WriteRequest { .. } => "WRQ",
            Packet::Data { .. } => "DATA",
            Packet::Ack { .. } => "ACK",
            Packet::Error { .. } => "ERROR",
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// Returns [`Err`] if a text field contains a zero byte, a request has an
    /// empty filename, or a Data payload exceeds [`BLOCK_SIZE`].
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut buf = Vec::with_capacity(self.encoded_len_hint());
        buf.extend_from_slice(&self.opcode().to_be_bytes());

        match self {
            Packet::ReadRequest { filename, mode } | Packet::WriteRequest { filename, mode } => {
                if filename.is_empty() {
                    return Err(PacketError::EmptyFilename);
                }
                put_cstr(&mut buf, filename)?;
                put_cstr(&mut buf, mode.as_str())?;
            }
            Packet::Data { block, payload } => {
                if payload.len() > BLOCK_SIZE {
                    return Err(PacketError::PayloadTooLarge(payload.len()));
                }
                buf.extend_from_slice(&block.to_be_bytes());
                buf.extend_from_slice(payload);
            }
            Packet::Ack { block } => {
                buf.extend_from_slice(&block.to_be_bytes());
            }
            Packet::Error { code, message } => {
                buf.extend_from_slice(&code.as_u16().to_be_bytes());
                put_cstr(&mut buf, message)?;
            }
        }

        Ok(buf)
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than the opcode or the minimum for its opcode,
    /// - the opcode is not one of the five known kinds,
    /// - a request is missing a field terminator, has an empty filename, or
    ///   names an unknown mode, or
    /// - a Data payload is longer than [`BLOCK_SIZE`].
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < OPCODE_LEN {
            return Err(PacketError::BufferTooShort(buf.len()));
        }
        let op = u16::from_be_bytes([buf[0], buf[1]]);
        let body = &buf[OPCODE_LEN..];

        match op {
            opcode::RRQ | opcode::WRQ => {
                let (filename, rest) = take_cstr(body)?;
                let (mode, _) = take_cstr(rest)?;
                if filename.is_empty() {
                    return Err(PacketError::EmptyFilename);
                }
                let filename = text(filename)?.to_string();
                let mode: Mode = text(mode)?.parse()?;
                Ok(if op == opcode::RRQ {
                    Packet::ReadRequest { filename, mode }
                } else {
                    Packet::WriteRequest { filename, mode }
                })
            }
            opcode::DATA => {
                let block = read_u16(buf, op)?;
                let payload = &buf[HEADER_LEN..];
                if payload.len() > BLOCK_SIZE {
                    return Err(PacketError::PayloadTooLarge(payload.len()));
                }
                Ok(Packet::Data {
                    block,
                    payload: payload.to_vec(),
                })
            }
            opcode::ACK => Ok(Packet::Ack {
                block: read_u16(buf, op)?,
            }),
            opcode::ERROR => {
                let code = ErrorCode::from(read_u16(buf, op)?);
                // The terminator is optional; stop at the first zero if present.
                let raw = &buf[HEADER_LEN..];
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                Ok(Packet::Error {
                    code,
                    message: String::from_utf8_lossy(&raw[..end]).into_owned(),
                })
            }
            other => Err(PacketError::UnknownOpcode(other)),
        }
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            Packet::ReadRequest { filename, mode } | Packet::WriteRequest { filename, mode } => {
                OPCODE_LEN + filename.len() + mode.as_str().len() + 2
            }
            Packet::Data { payload, .. } => HEADER_LEN + payload.len(),
            Packet::Ack { .. } => HEADER_LEN,
            Packet::Error { message, .. } => HEADER_LEN + message.len() + 1,
        }
    }
}

/// Errors that can arise when encoding or parsing a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram of {0} bytes is too short to carry an opcode")]
    BufferTooShort(usize),
    #[error("datagram of {len} bytes is too short for opcode {opcode}")]
    Truncated { opcode: u16, len: usize },
    #[error("unknown opcode {0}")]
    UnknownOpcode(u16),
    #[error("request field is missing its zero terminator")]
    MissingTerminator,
    #[error("request filename is empty")]
    EmptyFilename,
    #[error("text field contains an embedded zero byte")]
    EmbeddedNul,
    #[error("request field is not valid UTF-8")]
    InvalidText,
    #[error("unknown transfer mode {0:?}")]
    UnknownMode(String),
    #[error("data payload of {0} bytes exceeds the {BLOCK_SIZE}-byte block size")]
    PayloadTooLarge(usize),
}

fn read_u16(buf: &[u8], op: u16) -> Result<u16, PacketError> {
    match buf.get(OPCODE_LEN..HEADER_LEN) {
        Some(&[hi, lo]) => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(PacketError::Truncated {
            opcode: op,
            len: buf.len(),
        }),
    }
}

/// Split `buf` at its first zero byte, returning the field and the remainder
/// after the terminator.
fn take_cstr(buf: &[u8]) -> Result<(&[u8], &[u8]), PacketError> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(PacketError::MissingTerminator)?;
    Ok((&buf[..end], &buf[end + 1..]))
}

fn put_cstr(buf: &mut Vec<u8>, s: &str) -> Result<(), PacketError> {
    if s.as_bytes().contains(&0) {
        return Err(PacketError::EmbeddedNul);
    }
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    Ok(())
}

fn text(bytes: &[u8]) -> Result<&str, PacketError> {
    std::str::from_utf8(bytes).map_err(|_| PacketError::InvalidText)
}
