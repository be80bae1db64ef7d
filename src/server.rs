//! The TCP server: connection accept, per-connection session state, and
//! request dispatch.
//!
//! Each connection gets its own handler thread, read loop and response
//! writer. A session starts with no selected database; the first `USE`
//! selects one, and every other request before that is answered with
//! `ERR{505}`. Protocol errors are reported on the wire and never close
//! the connection; only I/O failures do.

use crate::plan::exec_query;
use crate::protocol::{code, Request, Response, ServerStats};
use crate::store::Database;
use crate::{FossilError, FossilResult, FOSSIL_VERSION};
use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// A fossil server over a base directory of databases.
///
/// The server owns the database map explicitly; exactly one in-memory
/// database is shared by all connections that select it via `USE`.
#[derive(Clone, Debug)]
pub struct Server {
    state: Arc<ServerState>,
}

#[derive(Debug)]
struct ServerState {
    base_dir: PathBuf,
    databases: RwLock<HashMap<String, Arc<Database>>>,
    started: Instant,
}

impl Server {
    /// A server whose databases live in subdirectories of `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            state: Arc::new(ServerState {
                base_dir: base_dir.as_ref().to_path_buf(),
                databases: RwLock::new(HashMap::new()),
                started: Instant::now(),
            }),
        }
    }

    /// Binds `addr` and serves until the listener fails.
    pub fn listen(&self, addr: &str) -> FossilResult<()> {
        self.serve(TcpListener::bind(addr)?)
    }

    /// Accepts connections from an existing listener, one handler thread
    /// per connection.
    pub fn serve(&self, listener: TcpListener) -> FossilResult<()> {
        info!("fossil {FOSSIL_VERSION} serving on {:?}", listener.local_addr()?);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let state = Arc::clone(&self.state);
                    std::thread::spawn(move || {
                        if let Err(e) = handle_connection(&state, stream) {
                            debug!("connection ended: {e}");
                        }
                    });
                }
                Err(e) => warn!("accept failed: {e}"),
            }
        }
        Ok(())
    }
}

impl ServerState {
    // USE opens the database on first selection and shares it afterwards.
    fn use_database(&self, name: &str) -> FossilResult<Arc<Database>> {
        if let Some(db) = self.databases.read()?.get(name) {
            return Ok(Arc::clone(db));
        }
        let mut databases = self.databases.write()?;
        if let Some(db) = databases.get(name) {
            return Ok(Arc::clone(db));
        }
        let db = Arc::new(Database::open(name, self.base_dir.join(name))?);
        databases.insert(name.to_string(), Arc::clone(&db));
        Ok(db)
    }

    fn database_names(&self) -> FossilResult<Vec<String>> {
        let mut names: Vec<String> = self.databases.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

// Per-connection state: the database selected by USE.
struct Session {
    selected: Option<Arc<Database>>,
}

fn handle_connection(state: &ServerState, stream: TcpStream) -> FossilResult<()> {
    let peer = stream.peer_addr()?;
    debug!("connection from {peer}");
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);
    let mut session = Session { selected: None };
    loop {
        let request = match Request::read_from(&mut reader) {
            Ok(request) => request,
            Err(FossilError::Io { source }) => {
                if source.kind() == std::io::ErrorKind::UnexpectedEof {
                    debug!("{peer} disconnected");
                    return Ok(());
                }
                return Err(FossilError::Io { source });
            }
            // protocol errors are reported; the connection stays open
            Err(e) => {
                Response::Err {
                    code: e.wire_code(),
                    message: e.to_string(),
                }
                .write_to(&mut writer)?;
                continue;
            }
        };
        trace!("{peer}: dispatching {:?}", request.command());
        dispatch(state, &mut session, request).write_to(&mut writer)?;
    }
}

fn dispatch(state: &ServerState, session: &mut Session, request: Request) -> Response {
    match request {
        Request::Version { code: _, version } => {
            debug!("client advertises version {version}");
            // the code field is reserved; no rejection policy is in place
            Response::Version {
                code: code::VERSION_OK,
                version: FOSSIL_VERSION.to_string(),
            }
        }
        Request::Use { database } => match state.use_database(&database) {
            Ok(db) => {
                session.selected = Some(db);
                Response::Ok {
                    code: code::USING,
                    message: database,
                }
            }
            Err(e) => Response::Err {
                code: code::UNKNOWN_DATABASE,
                message: e.to_string(),
            },
        },
        request => {
            let Some(db) = session.selected.clone() else {
                return Response::Err {
                    code: code::UNKNOWN_DATABASE,
                    message: "no database selected".to_string(),
                };
            };
            dispatch_selected(state, &db, request)
        }
    }
}

fn dispatch_selected(state: &ServerState, db: &Database, request: Request) -> Response {
    match request {
        Request::List { selector } => {
            let items = match selector.as_str() {
                "databases" => state.database_names(),
                "topics" => db.topic_names(),
                "schemas" => db.schema_listing(),
                other => {
                    return Response::Err {
                        code: code::UNMARSHAL,
                        message: format!("unknown list selector {other:?}"),
                    };
                }
            };
            match items {
                Ok(items) => Response::List { items },
                Err(e) => generic_error(&e),
            }
        }
        Request::Stats => stats(state, db),
        Request::Create { topic, schema } => match db.add_topic(&topic, &schema) {
            Ok(id) => Response::Ok {
                code: code::OK,
                message: id.to_string(),
            },
            Err(e) => generic_error(&e),
        },
        Request::Append { topic, data } => match db.append(&data, &topic) {
            Ok(()) => Response::Ok {
                code: code::OK,
                message: String::new(),
            },
            Err(e) => Response::Err {
                code: code::WRITE_FAILED,
                message: e.to_string(),
            },
        },
        Request::Query { query } => match exec_query(db, &query) {
            Ok(entries) => Response::Query { entries },
            Err(e) => Response::Err {
                code: code::QUERY_FAILED,
                message: e.to_string(),
            },
        },
        Request::Version { .. } | Request::Use { .. } => {
            unreachable!("handled before database selection")
        }
    }
}

fn generic_error(error: &FossilError) -> Response {
    Response::Err {
        code: error.wire_code(),
        message: error.to_string(),
    }
}

fn stats(state: &ServerState, db: &Database) -> Response {
    let mut sys = sysinfo::System::new_all();
    sys.refresh_memory();
    let alloc_heap = sysinfo::get_current_pid()
        .ok()
        .and_then(|pid| sys.process(pid).map(sysinfo::Process::memory))
        .unwrap_or(0);
    let (segments, topics) = match (db.segment_count(), db.topic_count()) {
        (Ok(segments), Ok(topics)) => (segments as u64, topics as u64),
        (Err(e), _) | (_, Err(e)) => return generic_error(&e),
    };
    let uptime = Duration::from_secs(state.started.elapsed().as_secs());
    Response::Stats(ServerStats {
        alloc_heap,
        total_mem: sys.total_memory(),
        segments,
        topics,
        uptime: humantime::format_duration(uptime).to_string(),
    })
}
