//! Connection parameters, parsed from connection strings.

use crate::url::{DEFAULT_DATABASE, DEFAULT_PORT, FILE, FOSSIL};
use crate::{FossilError, FossilResult};
use ::url::Url;
use std::path::PathBuf;

/// Where and how to reach a fossil database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectParams {
    /// Embedded access against a local directory.
    Local {
        /// Base directory holding the database files.
        path: PathBuf,
        /// Database name.
        database: String,
    },
    /// Remote access over the wire protocol.
    Remote {
        host: String,
        port: u16,
        /// Database selected with `USE` after the handshake.
        database: String,
    },
}

impl ConnectParams {
    /// The database the parameters select.
    pub fn database(&self) -> &str {
        match self {
            Self::Local { database, .. } | Self::Remote { database, .. } => database,
        }
    }

    /// `host:port` of a remote target.
    pub fn addr(&self) -> FossilResult<String> {
        match self {
            Self::Remote { host, port, .. } => Ok(format!("{host}:{port}")),
            Self::Local { .. } => Err(FossilError::Usage(
                "local connect parameters have no address",
            )),
        }
    }
}

impl std::fmt::Display for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Local { path, .. } => write!(f, "{FILE}://{}", path.display()),
            Self::Remote {
                host,
                port,
                database,
            } => write!(f, "{FOSSIL}://{host}:{port}/{database}"),
        }
    }
}

/// A trait implemented by everything that can be converted into
/// [`ConnectParams`], in particular connection strings.
pub trait IntoConnectParams {
    fn into_connect_params(self) -> FossilResult<ConnectParams>;
}

impl IntoConnectParams for ConnectParams {
    fn into_connect_params(self) -> FossilResult<ConnectParams> {
        Ok(self)
    }
}

impl IntoConnectParams for &str {
    fn into_connect_params(self) -> FossilResult<ConnectParams> {
        // a bare path is local access to the default database
        if !self.contains("://") {
            return Ok(ConnectParams::Local {
                path: PathBuf::from(self),
                database: DEFAULT_DATABASE.to_string(),
            });
        }
        let url = Url::parse(self).map_err(|e| FossilError::conn_params(Box::new(e)))?;
        match url.scheme() {
            FILE => Ok(ConnectParams::Local {
                path: PathBuf::from(format!(
                    "{}{}",
                    url.host_str().unwrap_or_default(),
                    url.path()
                )),
                database: DEFAULT_DATABASE.to_string(),
            }),
            FOSSIL => {
                let host = url
                    .host_str()
                    .ok_or(FossilError::Usage("fossil:// URLs require a host"))?
                    .to_string();
                let database = url.path().trim_matches('/');
                Ok(ConnectParams::Remote {
                    host,
                    port: url.port().unwrap_or(DEFAULT_PORT),
                    database: if database.is_empty() {
                        DEFAULT_DATABASE.to_string()
                    } else {
                        database.to_string()
                    },
                })
            }
            other => Err(FossilError::UsageDetailed(format!(
                "unrecognized scheme {other:?}"
            ))),
        }
    }
}

impl IntoConnectParams for String {
    fn into_connect_params(self) -> FossilResult<ConnectParams> {
        self.as_str().into_connect_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_paths_are_local_default() {
        let params = "./data".into_connect_params().unwrap();
        assert_eq!(
            params,
            ConnectParams::Local {
                path: PathBuf::from("./data"),
                database: "default".to_string()
            }
        );
    }

    #[test]
    fn file_urls_are_local() {
        let params = "file:///var/lib/fossil".into_connect_params().unwrap();
        match params {
            ConnectParams::Local { path, database } => {
                assert_eq!(path, PathBuf::from("/var/lib/fossil"));
                assert_eq!(database, "default");
            }
            other => panic!("unexpected params {other:?}"),
        }
    }

    #[test]
    fn fossil_urls_select_host_port_and_database() {
        let params = "fossil://host:9000/foo".into_connect_params().unwrap();
        assert_eq!(
            params,
            ConnectParams::Remote {
                host: "host".to_string(),
                port: 9000,
                database: "foo".to_string()
            }
        );
        let params = "fossil://host:9000".into_connect_params().unwrap();
        assert_eq!(params.database(), "default");
    }

    #[test]
    fn unknown_schemes_are_rejected() {
        assert!("http://host".into_connect_params().is_err());
    }
}
