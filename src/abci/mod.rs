//! ABCI: the boundary between a consensus engine and the application.
//!
//! # Data Flow
//! ```text
//! In-process:  LocalNode ──(direct calls)──▶ Application
//! Standalone:  remote engine ──socket / grpc──▶ server.rs ──dispatch──▶ Application
//! ```
//!
//! # Design Decisions
//! - One JSON message model (types.rs) shared by both transports
//! - `dispatch` is the only place that maps requests onto trait methods

pub mod server;
pub mod types;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::app::Application;

pub use server::AbciListener;
pub use types::*;

/// Wire transport of the standalone ABCI listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Newline-delimited JSON over a stream socket.
    Socket,
    /// gRPC-style JSON routes over HTTP/2.
    Grpc,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "socket" => Ok(Self::Socket),
            "grpc" => Ok(Self::Grpc),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Socket => "socket",
            Self::Grpc => "grpc",
        })
    }
}

/// Route a request to the matching application method.
pub fn dispatch(app: &dyn Application, request: Request) -> Response {
    match request {
        Request::Echo { message } => Response::Echo { message },
        Request::Flush => Response::Flush,
        Request::Info(req) => Response::Info(app.info(req)),
        Request::InitChain(req) => Response::InitChain(app.init_chain(req)),
        Request::CheckTx(req) => Response::CheckTx(app.check_tx(req)),
        Request::DeliverTx(req) => Response::DeliverTx(app.deliver_tx(req)),
        Request::Commit(req) => Response::Commit(app.commit(req)),
        Request::Query(req) => Response::Query(app.query(req)),
    }
}
