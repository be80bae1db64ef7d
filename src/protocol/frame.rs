use crate::{FossilError, FossilResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Frames larger than this are rejected outright.
pub const MAX_MESSAGE_SIZE: u32 = 100 * 1024 * 1024;

const COMMAND_SIZE: usize = 8;

/// The command vocabulary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    Version,
    Use,
    List,
    Stats,
    Create,
    Append,
    Query,
    Ok,
    Err,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Self::Version => "VERSION",
            Self::Use => "USE",
            Self::List => "LIST",
            Self::Stats => "STATS",
            Self::Create => "CREATE",
            Self::Append => "APPEND",
            Self::Query => "QUERY",
            Self::Ok => "OK",
            Self::Err => "ERR",
        }
    }

    fn from_name(name: &str) -> FossilResult<Self> {
        Ok(match name {
            "VERSION" => Self::Version,
            "USE" => Self::Use,
            "LIST" => Self::List,
            "STATS" => Self::Stats,
            "CREATE" => Self::Create,
            "APPEND" => Self::Append,
            "QUERY" => Self::Query,
            "OK" => Self::Ok,
            "ERR" => Self::Err,
            other => {
                return Err(FossilError::UnknownCommand(other.to_string()));
            }
        })
    }

    // null-padded to exactly 8 bytes, uppercased
    fn to_wire(self) -> [u8; COMMAND_SIZE] {
        let mut wire = [0_u8; COMMAND_SIZE];
        wire[..self.name().len()].copy_from_slice(self.name().as_bytes());
        wire
    }

    fn from_wire(wire: &[u8]) -> FossilResult<Self> {
        let end = wire.iter().position(|&b| b == 0).unwrap_or(wire.len());
        let name = std::str::from_utf8(&wire[..end])
            .map_err(|_| FossilError::Frame("command is not ASCII".to_string()))?;
        Self::from_name(&name.to_ascii_uppercase())
    }
}

/// Writes one frame: length, command, payload.
#[allow(clippy::cast_possible_truncation)]
pub fn write_frame(w: &mut dyn Write, command: Command, payload: &[u8]) -> FossilResult<()> {
    let length = (COMMAND_SIZE + payload.len()) as u32;
    if length > MAX_MESSAGE_SIZE {
        return Err(FossilError::Frame(format!(
            "{length} byte message exceeds the {MAX_MESSAGE_SIZE} byte limit"
        )));
    }
    trace!("writing {command:?} frame, {length} bytes");
    w.write_u32::<BigEndian>(length)?; // UI4
    w.write_all(&command.to_wire())?; // B8
    w.write_all(payload)?;
    w.flush()?;
    Ok(())
}

/// Reads one frame, returning the command and its payload.
pub fn read_frame(r: &mut dyn Read) -> FossilResult<(Command, Vec<u8>)> {
    let length = r.read_u32::<BigEndian>()?; // UI4
    if length > MAX_MESSAGE_SIZE {
        return Err(FossilError::Frame(format!(
            "{length} byte message exceeds the {MAX_MESSAGE_SIZE} byte limit"
        )));
    }
    if (length as usize) < COMMAND_SIZE {
        return Err(FossilError::Frame(format!("{length} byte frame is too short")));
    }
    let mut wire = [0_u8; COMMAND_SIZE];
    r.read_exact(&mut wire)?; // B8
    let command = Command::from_wire(&wire)?;
    let mut payload = vec![0_u8; length as usize - COMMAND_SIZE];
    r.read_exact(&mut payload)?;
    trace!("read {command:?} frame, {length} bytes");
    Ok((command, payload))
}
