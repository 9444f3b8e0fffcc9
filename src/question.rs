use serde::Serialize;

use crate::record::RecordEntry;
use crate::status::Status;

/// One query as handed to the resolver. `name` is ASCII-lowercased with no
/// trailing dot before it reaches the cache or the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
    /// Opaque correlation id assigned by the caller, echoed in the response.
    pub id: u64,
    /// `host:port` of the server to ask. When absent: iterative mode picks a
    /// root server, external-recursive mode rejects the question.
    pub name_server: Option<String>,
}

impl Question {
    pub fn new(name: impl Into<String>, qtype: u16, qclass: u16, id: u64) -> Self {
        Question {
            name: normalize_name(&name.into()),
            qtype,
            qclass,
            id,
            name_server: None,
        }
    }

    pub fn with_name_server(mut self, name_server: impl Into<String>) -> Self {
        self.name_server = Some(name_server.into());
        self
    }
}

/// Lowercase and strip trailing dots.
pub fn normalize_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Header bits of a reply, flattened for output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DnsFlags {
    pub response: bool,
    pub opcode: i32,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub authenticated: bool,
    pub checking_disabled: bool,
    pub error_code: i32,
}

/// A parsed DNS message: the three record sections plus how and from where
/// the reply was obtained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub answers: Vec<RecordEntry>,
    pub additional: Vec<RecordEntry>,
    pub authorities: Vec<RecordEntry>,
    pub protocol: String,
    pub resolver: String,
    pub flags: DnsFlags,
}

/// One wire exchange (or cache hit) in an iterative walk.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceStep {
    pub result: RawResult,
    pub dns_type: u16,
    pub dns_class: u16,
    pub name: String,
    pub name_server: String,
    pub depth: usize,
    pub layer: String,
    pub cached: bool,
}

/// Final envelope handed back to the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub data: RawResult,
    pub status: Status,
    pub trace: Vec<TraceStep>,
    pub id: u64,
    pub error: Option<String>,
}

impl Response {
    pub fn empty(status: Status, id: u64, error: Option<String>) -> Self {
        Response {
            data: RawResult::default(),
            status,
            trace: Vec::new(),
            id,
            error,
        }
    }
}

/// Internal carrier threaded through the resolver: statuses are data here,
/// not `Err` values, because non-NOERROR outcomes are ordinary results for a
/// measurement run.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub raw: RawResult,
    pub status: Status,
    pub error: Option<String>,
}

impl Lookup {
    pub fn new(raw: RawResult, status: Status, error: Option<String>) -> Self {
        Lookup { raw, status, error }
    }

    pub fn failed(status: Status, error: Option<String>) -> Self {
        Lookup {
            raw: RawResult::default(),
            status,
            error,
        }
    }
}
