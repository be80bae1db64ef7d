//! A synchronous client for remote fossil servers.

use crate::conn::{ConnectParams, IntoConnectParams};
use crate::protocol::{code, Request, Response, ServerStats};
use crate::store::Entries;
use crate::{FossilError, FossilResult, FOSSIL_VERSION};
use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::time::Duration;

// Connect backoff: 2^i second delays for i in 0..RECONNECT_ATTEMPTS, then
// give up.
const RECONNECT_ATTEMPTS: u32 = 3;

/// A buffered connection to a fossil server.
///
/// Connecting performs the `VERSION` handshake and selects the database
/// named in the connection string. A connection that breaks mid-command is
/// re-established once (with the same backoff schedule) and the command is
/// repeated; a second failure surfaces as
/// [`FossilError::ErrorAfterReconnect`].
#[derive(Debug)]
pub struct Client {
    params: ConnectParams,
    database: String,
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    /// Connects to the server named by `params`, e.g.
    /// `"fossil://localhost:8001/metrics"`.
    pub fn connect(params: impl IntoConnectParams) -> FossilResult<Self> {
        let params = params.into_connect_params()?;
        let stream = connect_with_backoff(&params.addr()?)?;
        let database = params.database().to_string();
        let mut client = Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
            params,
            database: database.clone(),
        };
        client.handshake()?;
        client.use_database(&database)?;
        Ok(client)
    }

    pub fn connect_params(&self) -> &ConnectParams {
        &self.params
    }

    /// The database this session currently executes against.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Switches the session to another database, creating it on the server
    /// if needed.
    pub fn use_database(&mut self, name: &str) -> FossilResult<()> {
        match self.roundtrip(&Request::Use {
            database: name.to_string(),
        })? {
            Response::Ok { .. } => {
                self.database = name.to_string();
                Ok(())
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Appends raw data to a topic.
    pub fn append(&mut self, topic: &str, data: &[u8]) -> FossilResult<()> {
        match self.roundtrip(&Request::Append {
            topic: topic.to_string(),
            data: data.to_vec(),
        })? {
            Response::Ok { .. } => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Creates a topic with a declared schema, returning its id.
    pub fn create_topic(&mut self, topic: &str, schema: &str) -> FossilResult<u32> {
        match self.roundtrip(&Request::Create {
            topic: topic.to_string(),
            schema: schema.to_string(),
        })? {
            Response::Ok { message, .. } => message
                .parse()
                .map_err(|_| FossilError::Frame(format!("bad topic id {message:?}"))),
            other => Err(unexpected(&other)),
        }
    }

    /// Runs a query, returning the collected entries.
    pub fn query(&mut self, query: &str) -> FossilResult<Entries> {
        match self.roundtrip(&Request::Query {
            query: query.to_string(),
        })? {
            Response::Query { entries } => Ok(entries),
            other => Err(unexpected(&other)),
        }
    }

    /// Lists `databases`, `topics` or `schemas`.
    pub fn list(&mut self, selector: &str) -> FossilResult<Vec<String>> {
        match self.roundtrip(&Request::List {
            selector: selector.to_string(),
        })? {
            Response::List { items } => Ok(items),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetches server statistics.
    pub fn stats(&mut self) -> FossilResult<ServerStats> {
        match self.roundtrip(&Request::Stats)? {
            Response::Stats(stats) => Ok(stats),
            other => Err(unexpected(&other)),
        }
    }

    // One exchange with one reconnect-and-repeat on a broken connection.
    fn roundtrip(&mut self, request: &Request) -> FossilResult<Response> {
        match self.try_roundtrip(request) {
            Err(FossilError::Io { source }) => {
                warn!("connection lost ({source}), reconnecting");
                match self
                    .reconnect()
                    .and_then(|()| self.try_roundtrip(request))
                {
                    Ok(response) => Ok(response),
                    Err(second) => Err(FossilError::ErrorAfterReconnect {
                        source,
                        second: Box::new(second),
                    }),
                }
            }
            other => other,
        }
    }

    // Server-reported errors surface as FossilError::Remote.
    fn try_roundtrip(&mut self, request: &Request) -> FossilResult<Response> {
        request.write_to(&mut self.writer)?;
        match Response::read_from(&mut self.reader)? {
            Response::Err { code, message } => Err(FossilError::Remote { code, message }),
            response => Ok(response),
        }
    }

    fn reconnect(&mut self) -> FossilResult<()> {
        let stream = connect_with_backoff(&self.params.addr()?)?;
        self.reader = BufReader::new(stream.try_clone()?);
        self.writer = BufWriter::new(stream);
        self.handshake()?;
        // restore the session's selected database
        let database = self.database.clone();
        match self.try_roundtrip(&Request::Use { database })? {
            Response::Ok { .. } => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn handshake(&mut self) -> FossilResult<()> {
        let response = self.try_roundtrip(&Request::Version {
            code: code::VERSION_OK,
            version: FOSSIL_VERSION.to_string(),
        })?;
        match response {
            Response::Version { code, version } => {
                debug!("connected to fossil {version} (code {code})");
                Ok(())
            }
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &Response) -> FossilError {
    FossilError::Frame(format!("unexpected response {:?}", response.command()))
}

fn connect_with_backoff(addr: &str) -> FossilResult<TcpStream> {
    let mut attempt = 0;
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                if attempt == RECONNECT_ATTEMPTS {
                    return Err(e.into());
                }
                let delay = Duration::from_secs(1 << attempt);
                warn!("connect to {addr} failed ({e}), retrying in {delay:?}");
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
