use data_encoding::HEXLOWER;
use hickory_proto::op::{Message, MessageType};
use hickory_proto::rr::{RData, Record};
use serde_json::{json, Value};

use crate::question::DnsFlags;

/// One resource record as it appears in an output record. The owner name is
/// kept in wire presentation form (trailing dot included).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    pub name: String,
    pub class: String,
    pub ttl: u32,
    /// Numeric RR type code, kept alongside the rendered form for cache
    /// keying.
    pub type_code: u16,
    /// Numeric class code, same reason.
    pub class_code: u16,
    pub data: RecordData,
}

/// Typed payload, one variant per RR type we render structurally. Decoded
/// types without a dedicated variant fall back to their presentation format;
/// types the codec does not know fall back to raw rdata hex.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    A { address: std::net::Ipv4Addr },
    Aaaa { address: std::net::Ipv6Addr },
    Ns { target: String },
    Cname { target: String },
    Ptr { target: String },
    Mx { preference: u16, exchange: String },
    Txt { text: String },
    Soa {
        mname: String,
        rname: String,
        serial: u32,
        refresh: i32,
        retry: i32,
        expire: i32,
        minimum: u32,
    },
    Srv { priority: u16, weight: u16, port: u16, target: String },
    Naptr {
        order: u16,
        preference: u16,
        flags: String,
        service: String,
        regexp: String,
        replacement: String,
    },
    Sshfp { algorithm: u8, fingerprint_type: u8, fingerprint: String },
    Tlsa { cert_usage: u8, selector: u8, matching: u8, certificate: String },
    Hinfo { cpu: String, os: String },
    /// Decoded by the codec but not structurally rendered here.
    Other { rtype: String, answer: String },
    /// Unknown to the codec; raw rdata as lowercase hex.
    Generic { type_code: u16, rdata: String },
}

impl RecordData {
    /// The value of the JSON `type` field for this record.
    pub fn type_name(&self) -> String {
        match self {
            RecordData::A { .. } => "A".to_string(),
            RecordData::Aaaa { .. } => "AAAA".to_string(),
            RecordData::Ns { .. } => "NS".to_string(),
            RecordData::Cname { .. } => "CNAME".to_string(),
            RecordData::Ptr { .. } => "PTR".to_string(),
            RecordData::Mx { .. } => "MX".to_string(),
            RecordData::Txt { .. } => "TXT".to_string(),
            RecordData::Soa { .. } => "SOA".to_string(),
            RecordData::Srv { .. } => "SRV".to_string(),
            RecordData::Naptr { .. } => "NAPTR".to_string(),
            RecordData::Sshfp { .. } => "SSHFP".to_string(),
            RecordData::Tlsa { .. } => "TLSA".to_string(),
            RecordData::Hinfo { .. } => "HINFO".to_string(),
            RecordData::Other { rtype, .. } => rtype.clone(),
            RecordData::Generic { type_code, .. } => format!("TYPE{type_code}"),
        }
    }

    /// The value of the JSON `answer` field for this record.
    pub fn answer_value(&self) -> Value {
        match self {
            RecordData::A { address } => json!(address.to_string()),
            RecordData::Aaaa { address } => json!(address.to_string()),
            RecordData::Ns { target }
            | RecordData::Cname { target }
            | RecordData::Ptr { target } => json!(target),
            RecordData::Mx { preference, exchange } => {
                json!({"preference": preference, "exchange": exchange})
            }
            RecordData::Txt { text } => json!(text),
            RecordData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => json!({
                "mname": mname,
                "rname": rname,
                "serial": serial,
                "refresh": refresh,
                "retry": retry,
                "expire": expire,
                "minimum": minimum,
            }),
            RecordData::Srv { priority, weight, port, target } => {
                json!({"priority": priority, "weight": weight, "port": port, "target": target})
            }
            RecordData::Naptr {
                order,
                preference,
                flags,
                service,
                regexp,
                replacement,
            } => json!({
                "order": order,
                "preference": preference,
                "flags": flags,
                "service": service,
                "regexp": regexp,
                "replacement": replacement,
            }),
            RecordData::Sshfp { algorithm, fingerprint_type, fingerprint } => json!({
                "algorithm": algorithm,
                "fingerprint_type": fingerprint_type,
                "fingerprint": fingerprint,
            }),
            RecordData::Tlsa { cert_usage, selector, matching, certificate } => json!({
                "cert_usage": cert_usage,
                "selector": selector,
                "matching": matching,
                "certificate": certificate,
            }),
            RecordData::Hinfo { cpu, os } => json!({"cpu": cpu, "os": os}),
            RecordData::Other { answer, .. } => json!(answer),
            RecordData::Generic { rdata, .. } => json!(rdata),
        }
    }

    /// String payload for the records the resolver itself consumes (NS
    /// targets during authority extraction, A addresses for glue).
    pub fn simple_answer(&self) -> Option<&str> {
        match self {
            RecordData::Ns { target }
            | RecordData::Cname { target }
            | RecordData::Ptr { target } => Some(target),
            RecordData::Txt { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_a(&self) -> bool {
        matches!(self, RecordData::A { .. })
    }

    pub fn is_ns(&self) -> bool {
        matches!(self, RecordData::Ns { .. })
    }
}

impl RecordEntry {
    pub fn type_name(&self) -> String {
        self.data.type_name()
    }
}

/// Convert a decoded record into an output entry. Records without rdata are
/// skipped.
pub fn parse_record(record: &Record) -> Option<RecordEntry> {
    let data = record.data()?;
    let payload = match data {
        RData::A(a) => RecordData::A { address: a.0 },
        RData::AAAA(aaaa) => RecordData::Aaaa { address: aaaa.0 },
        RData::NS(ns) => RecordData::Ns { target: ns.0.to_string() },
        RData::CNAME(cname) => RecordData::Cname { target: cname.0.to_string() },
        RData::PTR(ptr) => RecordData::Ptr { target: ptr.0.to_string() },
        RData::MX(mx) => RecordData::Mx {
            preference: mx.preference(),
            exchange: mx.exchange().to_string(),
        },
        RData::TXT(txt) => RecordData::Txt {
            text: txt
                .txt_data()
                .iter()
                .map(|segment| String::from_utf8_lossy(segment).into_owned())
                .collect::<Vec<_>>()
                .join(""),
        },
        RData::SOA(soa) => RecordData::Soa {
            mname: soa.mname().to_string(),
            rname: soa.rname().to_string(),
            serial: soa.serial(),
            refresh: soa.refresh(),
            retry: soa.retry(),
            expire: soa.expire(),
            minimum: soa.minimum(),
        },
        RData::SRV(srv) => RecordData::Srv {
            priority: srv.priority(),
            weight: srv.weight(),
            port: srv.port(),
            target: srv.target().to_string(),
        },
        RData::NAPTR(naptr) => RecordData::Naptr {
            order: naptr.order(),
            preference: naptr.preference(),
            flags: String::from_utf8_lossy(naptr.flags()).into_owned(),
            service: String::from_utf8_lossy(naptr.services()).into_owned(),
            regexp: String::from_utf8_lossy(naptr.regexp()).into_owned(),
            replacement: naptr.replacement().to_string(),
        },
        RData::SSHFP(sshfp) => RecordData::Sshfp {
            algorithm: u8::from(sshfp.algorithm()),
            fingerprint_type: u8::from(sshfp.fingerprint_type()),
            fingerprint: HEXLOWER.encode(sshfp.fingerprint()),
        },
        RData::TLSA(tlsa) => RecordData::Tlsa {
            cert_usage: u8::from(tlsa.cert_usage()),
            selector: u8::from(tlsa.selector()),
            matching: u8::from(tlsa.matching()),
            certificate: HEXLOWER.encode(tlsa.cert_data()),
        },
        RData::HINFO(hinfo) => RecordData::Hinfo {
            cpu: String::from_utf8_lossy(hinfo.cpu()).into_owned(),
            os: String::from_utf8_lossy(hinfo.os()).into_owned(),
        },
        RData::NULL(null) => RecordData::Generic {
            type_code: 10,
            rdata: HEXLOWER.encode(null.anything()),
        },
        RData::Unknown { code, rdata } => RecordData::Generic {
            type_code: u16::from(*code),
            rdata: HEXLOWER.encode(rdata.anything()),
        },
        other => RecordData::Other {
            rtype: record.record_type().to_string(),
            answer: other.to_string(),
        },
    };
    Some(RecordEntry {
        name: record.name().to_string(),
        class: record.dns_class().to_string(),
        ttl: record.ttl(),
        type_code: u16::from(record.record_type()),
        class_code: u16::from(record.dns_class()),
        data: payload,
    })
}

/// Flatten a reply's header bits.
pub fn flags_from_message(message: &Message) -> DnsFlags {
    let header = message.header();
    DnsFlags {
        response: header.message_type() == MessageType::Response,
        opcode: u8::from(header.op_code()) as i32,
        authoritative: header.authoritative(),
        truncated: header.truncated(),
        recursion_desired: header.recursion_desired(),
        recursion_available: header.recursion_available(),
        authenticated: header.authentic_data(),
        checking_disabled: header.checking_disabled(),
        error_code: u16::from(header.response_code()) as i32,
    }
}
