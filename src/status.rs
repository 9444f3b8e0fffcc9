use hickory_proto::op::ResponseCode;
use serde::{Deserialize, Serialize};

/// Outcome of a single lookup. Serialized names are part of the output
/// format and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "NOERROR")]
    NoError,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "TEMPORARY")]
    Temporary,
    #[serde(rename = "ITERATIVE_TIMEOUT")]
    IterTimeout,
    #[serde(rename = "SERVFAIL")]
    ServFail,
    #[serde(rename = "NXDOMAIN")]
    NxDomain,
    #[serde(rename = "FORMERR")]
    FormErr,
    #[serde(rename = "REFUSED")]
    Refused,
    #[serde(rename = "NOTIMP")]
    NotImp,
    #[serde(rename = "YXDOMAIN")]
    YxDomain,
    #[serde(rename = "YXRRSET")]
    YxRrSet,
    #[serde(rename = "NXRRSET")]
    NxRrSet,
    #[serde(rename = "NOTAUTH")]
    NotAuth,
    #[serde(rename = "NOTZONE")]
    NotZone,
    #[serde(rename = "TRUNCATED")]
    Truncated,
    #[serde(rename = "AUTHFAIL")]
    AuthFail,
    #[serde(rename = "NOAUTH")]
    NoAuth,
    #[serde(rename = "BLACKLIST")]
    Blacklist,
    #[serde(rename = "ILLEGAL_INPUT")]
    IllegalInput,
    #[serde(rename = "NO_OUTPUT")]
    NoOutput,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::NoError => "NOERROR",
            Status::Error => "ERROR",
            Status::Timeout => "TIMEOUT",
            Status::Temporary => "TEMPORARY",
            Status::IterTimeout => "ITERATIVE_TIMEOUT",
            Status::ServFail => "SERVFAIL",
            Status::NxDomain => "NXDOMAIN",
            Status::FormErr => "FORMERR",
            Status::Refused => "REFUSED",
            Status::NotImp => "NOTIMP",
            Status::YxDomain => "YXDOMAIN",
            Status::YxRrSet => "YXRRSET",
            Status::NxRrSet => "NXRRSET",
            Status::NotAuth => "NOTAUTH",
            Status::NotZone => "NOTZONE",
            Status::Truncated => "TRUNCATED",
            Status::AuthFail => "AUTHFAIL",
            Status::NoAuth => "NOAUTH",
            Status::Blacklist => "BLACKLIST",
            Status::IllegalInput => "ILLEGAL_INPUT",
            Status::NoOutput => "NO_OUTPUT",
        }
    }

    /// An authority that produced one of these counts as resolved: the
    /// iterative walk stops instead of trying the next candidate.
    pub fn is_answer(self) -> bool {
        matches!(self, Status::NoError | Status::NxDomain | Status::NoAuth)
    }

    /// Only these two ever re-enter the retry loop.
    pub fn is_retryable(self) -> bool {
        matches!(self, Status::Timeout | Status::Temporary)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier used while iterating authorities: statuses recognized here are
/// carried as the reported status when the last candidate fails, instead of
/// being overwritten with a generic error.
pub fn handle_status(status: Status) -> Option<Status> {
    match status {
        Status::Timeout
        | Status::Temporary
        | Status::ServFail
        | Status::NxDomain
        | Status::Refused => Some(status),
        _ => None,
    }
}

/// Map a reply's response code onto the status taxonomy.
pub fn translate_rcode(rcode: ResponseCode) -> Status {
    match rcode {
        ResponseCode::NoError => Status::NoError,
        ResponseCode::FormErr => Status::FormErr,
        ResponseCode::ServFail => Status::ServFail,
        ResponseCode::NXDomain => Status::NxDomain,
        ResponseCode::NotImp => Status::NotImp,
        ResponseCode::Refused => Status::Refused,
        ResponseCode::YXDomain => Status::YxDomain,
        ResponseCode::YXRRSet => Status::YxRrSet,
        ResponseCode::NXRRSet => Status::NxRrSet,
        ResponseCode::NotAuth => Status::NotAuth,
        ResponseCode::NotZone => Status::NotZone,
        ResponseCode::BADTRUNC => Status::Truncated,
        _ => Status::Error,
    }
}
