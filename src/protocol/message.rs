//! Request/response marshaling over the frame layer.
//!
//! Payload encodings are tagged per command; requests and responses share
//! the command vocabulary and the direction of travel disambiguates them.

use super::frame::{read_frame, write_frame, Command};
use crate::store::{Entries, Entry};
use crate::util::parse_rfc3339;
use crate::{FossilError, FossilResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// A client-to-server message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// The first frame of a connection advertises the client's version.
    Version { code: u32, version: String },
    /// Selects the database subsequent requests execute against.
    Use { database: String },
    /// Lists `databases` (the default), `topics` or `schemas`.
    List { selector: String },
    Stats,
    /// Creates a topic with a declared schema.
    Create { topic: String, schema: String },
    /// Appends raw data to a topic.
    Append { topic: String, data: Vec<u8> },
    /// Runs a query.
    Query { query: String },
}

impl Request {
    pub fn command(&self) -> Command {
        match self {
            Self::Version { .. } => Command::Version,
            Self::Use { .. } => Command::Use,
            Self::List { .. } => Command::List,
            Self::Stats => Command::Stats,
            Self::Create { .. } => Command::Create,
            Self::Append { .. } => Command::Append,
            Self::Query { .. } => Command::Query,
        }
    }

    pub fn marshal(&self) -> FossilResult<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Self::Version { code, version } => {
                out.write_u32::<BigEndian>(*code)?; // UI4
                out.extend_from_slice(version.as_bytes());
            }
            Self::Use { database } => out.extend_from_slice(database.as_bytes()),
            Self::List { selector } => out.extend_from_slice(selector.as_bytes()),
            Self::Stats => {}
            Self::Create { topic, schema } => {
                out.write_u32::<BigEndian>(topic.len() as u32)?; // UI4
                out.extend_from_slice(topic.as_bytes());
                out.extend_from_slice(schema.as_bytes());
            }
            Self::Append { topic, data } => {
                out.write_u32::<BigEndian>(topic.len() as u32)?; // UI4
                out.extend_from_slice(topic.as_bytes());
                out.extend_from_slice(data);
            }
            Self::Query { query } => out.extend_from_slice(query.as_bytes()),
        }
        Ok(out)
    }

    pub fn unmarshal(command: Command, payload: &[u8]) -> FossilResult<Self> {
        let mut rdr = Cursor::new(payload);
        Ok(match command {
            Command::Version => {
                let code = rdr.read_u32::<BigEndian>()?;
                Self::Version {
                    code,
                    version: rest_as_string(&mut rdr, payload)?,
                }
            }
            Command::Use => Self::Use {
                database: bytes_as_string(payload)?,
            },
            Command::List => {
                let selector = bytes_as_string(payload)?;
                Self::List {
                    selector: if selector.is_empty() {
                        "databases".to_string()
                    } else {
                        selector
                    },
                }
            }
            Command::Stats => Self::Stats,
            Command::Create => {
                let (topic, rest) = read_topic(payload)?;
                Self::Create {
                    topic,
                    schema: bytes_as_string(rest)?,
                }
            }
            Command::Append => {
                let (topic, rest) = read_topic(payload)?;
                Self::Append {
                    topic,
                    data: rest.to_vec(),
                }
            }
            Command::Query => Self::Query {
                query: bytes_as_string(payload)?,
            },
            other => {
                return Err(FossilError::Frame(format!(
                    "{} is not a request command",
                    other.name()
                )));
            }
        })
    }

    pub fn write_to(&self, w: &mut dyn Write) -> FossilResult<()> {
        write_frame(w, self.command(), &self.marshal()?)
    }

    pub fn read_from(r: &mut dyn Read) -> FossilResult<Self> {
        let (command, payload) = read_frame(r)?;
        Self::unmarshal(command, &payload).map_err(as_unmarshal_error)
    }
}

// A short read inside a complete frame is a payload problem, not a lost
// connection; keep io errors distinguishable for the read loops.
fn as_unmarshal_error(error: FossilError) -> FossilError {
    match error {
        FossilError::Io { source } => FossilError::Unmarshal(source.to_string()),
        FossilError::Frame(message) => FossilError::Unmarshal(message),
        other => other,
    }
}

/// Statistics reported by a server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Bytes of heap in use by the server process.
    pub alloc_heap: u64,
    /// Total memory of the machine.
    pub total_mem: u64,
    /// Segment count of the selected database.
    pub segments: u64,
    /// Topic count of the selected database.
    pub topics: u64,
    /// Server uptime as a textual duration.
    pub uptime: String,
}

/// A server-to-client message.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Version { code: u32, version: String },
    Ok { code: u32, message: String },
    Err { code: u32, message: String },
    List { items: Vec<String> },
    Stats(ServerStats),
    Query { entries: Entries },
}

impl Response {
    pub fn command(&self) -> Command {
        match self {
            Self::Version { .. } => Command::Version,
            Self::Ok { .. } => Command::Ok,
            Self::Err { .. } => Command::Err,
            Self::List { .. } => Command::List,
            Self::Stats(_) => Command::Stats,
            Self::Query { .. } => Command::Query,
        }
    }

    pub fn marshal(&self) -> FossilResult<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Self::Version { code, version } => {
                out.write_u32::<BigEndian>(*code)?; // UI4
                out.extend_from_slice(version.as_bytes());
            }
            Self::Ok { code, message } | Self::Err { code, message } => {
                out.write_u32::<BigEndian>(*code)?; // UI4
                out.extend_from_slice(message.as_bytes());
            }
            Self::List { items } => {
                out.write_u32::<BigEndian>(items.len() as u32)?; // UI4 count
                for item in items {
                    out.write_u32::<BigEndian>(item.len() as u32)?; // UI4
                    out.extend_from_slice(item.as_bytes());
                }
            }
            Self::Stats(stats) => {
                out.write_u64::<BigEndian>(stats.alloc_heap)?; // UI8
                out.write_u64::<BigEndian>(stats.total_mem)?; // UI8
                out.write_u64::<BigEndian>(stats.segments)?; // UI8
                out.write_u64::<BigEndian>(stats.topics)?; // UI8
                out.extend_from_slice(stats.uptime.as_bytes());
            }
            Self::Query { entries } => {
                out.write_u32::<BigEndian>(entries.len() as u32)?; // UI4 count
                for entry in entries {
                    let serialized = serialize_entry(entry)?;
                    out.write_u32::<BigEndian>(serialized.len() as u32)?; // UI4
                    out.extend_from_slice(serialized.as_bytes());
                }
            }
        }
        Ok(out)
    }

    pub fn unmarshal(command: Command, payload: &[u8]) -> FossilResult<Self> {
        let mut rdr = Cursor::new(payload);
        Ok(match command {
            Command::Version => {
                let code = rdr.read_u32::<BigEndian>()?;
                Self::Version {
                    code,
                    version: rest_as_string(&mut rdr, payload)?,
                }
            }
            Command::Ok => {
                let code = rdr.read_u32::<BigEndian>()?;
                Self::Ok {
                    code,
                    message: rest_as_string(&mut rdr, payload)?,
                }
            }
            Command::Err => {
                let code = rdr.read_u32::<BigEndian>()?;
                Self::Err {
                    code,
                    message: rest_as_string(&mut rdr, payload)?,
                }
            }
            Command::List => {
                let count = rdr.read_u32::<BigEndian>()?;
                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    items.push(bytes_as_string(&read_element(&mut rdr)?)?);
                }
                Self::List { items }
            }
            Command::Stats => Self::Stats(ServerStats {
                alloc_heap: rdr.read_u64::<BigEndian>()?,
                total_mem: rdr.read_u64::<BigEndian>()?,
                segments: rdr.read_u64::<BigEndian>()?,
                topics: rdr.read_u64::<BigEndian>()?,
                uptime: rest_as_string(&mut rdr, payload)?,
            }),
            Command::Query => {
                let count = rdr.read_u32::<BigEndian>()?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let element = read_element(&mut rdr)?;
                    entries.push(parse_entry(&bytes_as_string(&element)?)?);
                }
                Self::Query { entries }
            }
            other => {
                return Err(FossilError::Frame(format!(
                    "{} is not a response command",
                    other.name()
                )));
            }
        })
    }

    pub fn write_to(&self, w: &mut dyn Write) -> FossilResult<()> {
        write_frame(w, self.command(), &self.marshal()?)
    }

    pub fn read_from(r: &mut dyn Read) -> FossilResult<Self> {
        let (command, payload) = read_frame(r)?;
        Self::unmarshal(command, &payload).map_err(as_unmarshal_error)
    }
}

// Query entries travel as tab-separated fields with RFC3339-nano time and
// base64 data.
fn serialize_entry(entry: &Entry) -> FossilResult<String> {
    Ok(format!(
        "{}\t{}\t{}\t{}",
        entry.rfc3339_time()?,
        entry.topic,
        BASE64.encode(&entry.data),
        entry.schema
    ))
}

fn parse_entry(text: &str) -> FossilResult<Entry> {
    let mut fields = text.splitn(4, '\t');
    let (Some(time), Some(topic), Some(data), Some(schema)) = (
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
    ) else {
        return Err(FossilError::Frame(format!("malformed entry {text:?}")));
    };
    Ok(Entry {
        time: parse_rfc3339(time).map_err(|e| FossilError::Frame(e.to_string()))?,
        topic: topic.to_string(),
        schema: schema.to_string(),
        data: BASE64
            .decode(data)
            .map_err(|e| FossilError::Frame(format!("bad entry data: {e}")))?,
    })
}

// u32 BE topic length, topic bytes; an empty topic decodes as "/"
fn read_topic(payload: &[u8]) -> FossilResult<(String, &[u8])> {
    let mut rdr = Cursor::new(payload);
    let len = rdr.read_u32::<BigEndian>()? as usize;
    if 4 + len > payload.len() {
        return Err(FossilError::Frame("topic length exceeds payload".to_string()));
    }
    let topic = bytes_as_string(&payload[4..4 + len])?;
    let topic = if topic.is_empty() {
        "/".to_string()
    } else {
        topic
    };
    Ok((topic, &payload[4 + len..]))
}

fn read_element(rdr: &mut Cursor<&[u8]>) -> FossilResult<Vec<u8>> {
    let len = rdr.read_u32::<BigEndian>()? as usize;
    let mut buf = vec![0_u8; len];
    rdr.read_exact(&mut buf)?;
    Ok(buf)
}

fn bytes_as_string(bytes: &[u8]) -> FossilResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| FossilError::Frame("payload is not UTF-8".to_string()))
}

fn rest_as_string(rdr: &mut Cursor<&[u8]>, payload: &[u8]) -> FossilResult<String> {
    bytes_as_string(&payload[rdr.position() as usize..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::code;

    fn round_trip_request(request: Request) {
        let mut buf = Vec::new();
        request.write_to(&mut buf).unwrap();
        let parsed = Request::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, request);
    }

    fn round_trip_response(response: Response) {
        let mut buf = Vec::new();
        response.write_to(&mut buf).unwrap();
        let parsed = Response::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn every_request_round_trips() {
        round_trip_request(Request::Version {
            code: code::VERSION_OK,
            version: "0.4.0".to_string(),
        });
        round_trip_request(Request::Use {
            database: "metrics".to_string(),
        });
        round_trip_request(Request::List {
            selector: "topics".to_string(),
        });
        round_trip_request(Request::Stats);
        round_trip_request(Request::Create {
            topic: "/m".to_string(),
            schema: "{\"x\": int32,}".to_string(),
        });
        round_trip_request(Request::Append {
            topic: "/greetings".to_string(),
            data: b"hi".to_vec(),
        });
        round_trip_request(Request::Query {
            query: "all in /".to_string(),
        });
    }

    #[test]
    fn every_response_round_trips() {
        round_trip_response(Response::Version {
            code: code::VERSION_OK,
            version: "0.4.0".to_string(),
        });
        round_trip_response(Response::Ok {
            code: code::USING,
            message: "default".to_string(),
        });
        round_trip_response(Response::Err {
            code: code::UNKNOWN_DATABASE,
            message: "no database selected".to_string(),
        });
        round_trip_response(Response::List {
            items: vec!["default".to_string(), "metrics".to_string()],
        });
        round_trip_response(Response::Stats(ServerStats {
            alloc_heap: 1,
            total_mem: 2,
            segments: 3,
            topics: 4,
            uptime: "5m 3s".to_string(),
        }));
        round_trip_response(Response::Query {
            entries: vec![Entry {
                time: 1_136_239_445_000_000_000,
                topic: "/greetings".to_string(),
                schema: "string".to_string(),
                data: b"hi".to_vec(),
            }],
        });
    }

    #[test]
    fn empty_append_topic_decodes_as_root() {
        let request = Request::Append {
            topic: String::new(),
            data: b"x".to_vec(),
        };
        let payload = request.marshal().unwrap();
        let parsed = Request::unmarshal(Command::Append, &payload).unwrap();
        assert_eq!(
            parsed,
            Request::Append {
                topic: "/".to_string(),
                data: b"x".to_vec()
            }
        );
    }

    #[test]
    fn empty_list_selector_defaults_to_databases() {
        let parsed = Request::unmarshal(Command::List, b"").unwrap();
        assert_eq!(
            parsed,
            Request::List {
                selector: "databases".to_string()
            }
        );
    }
}
