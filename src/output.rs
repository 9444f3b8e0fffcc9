use std::collections::HashMap;

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::GlobalConfig;
use crate::question::{RawResult, Response, TraceStep};
use crate::record::RecordEntry;

const GROUPS_SECTIONS: &[&str] = &["short", "normal", "long", "trace"];
const GROUPS_PROTOCOL: &[&str] = &["protocol", "normal", "long", "trace"];
const GROUPS_RESOLVER: &[&str] = &["resolver", "normal", "long", "trace"];
const GROUPS_FLAGS: &[&str] = &["flags", "long", "trace"];
const GROUPS_TTL: &[&str] = &["ttl", "normal", "long", "trace"];
const GROUPS_CLASS: &[&str] = &["class", "long", "trace"];

/// Everything the worker attaches around the resolver's response before it
/// is serialized.
pub struct OutputRecord<'a> {
    pub name: &'a str,
    pub altered_name: Option<&'a str>,
    pub class: &'a str,
    pub timestamp: &'a str,
    pub alexa_rank: Option<i64>,
    pub metadata: Option<&'a str>,
    pub response: &'a Response,
}

/// End-of-run summary written to `--metadata-file`.
#[derive(Debug, Serialize)]
pub struct RunMetadata {
    pub names: usize,
    pub statuses: HashMap<String, usize>,
    pub start_time: String,
    pub end_time: String,
    pub name_servers: Vec<String>,
    pub timeout: u64,
    pub retries: usize,
    pub conf: GlobalConfig,
}

pub fn timestamp_now(nanoseconds: bool) -> String {
    let now = chrono::Local::now();
    if nanoseconds {
        now.to_rfc3339_opts(SecondsFormat::Nanos, true)
    } else {
        now.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

fn in_groups(groups: &[String], tags: &[&str]) -> bool {
    groups.iter().any(|group| tags.contains(&group.as_str()))
}

/// One output line. Field visibility follows the configured groups; fields
/// outside every group are dropped, not nulled.
pub fn build_output_record(record: &OutputRecord, groups: &[String]) -> Value {
    let mut out = Map::new();
    if !record.name.is_empty() {
        out.insert("name".to_string(), json!(record.name));
    }
    if let Some(altered) = record.altered_name {
        out.insert("altered_name".to_string(), json!(altered));
    }
    if in_groups(groups, GROUPS_CLASS) {
        out.insert("class".to_string(), json!(record.class));
    }
    out.insert("timestamp".to_string(), json!(record.timestamp));
    out.insert("status".to_string(), json!(record.response.status.as_str()));
    out.insert("id".to_string(), json!(record.response.id));
    out.insert(
        "data".to_string(),
        raw_result_value(&record.response.data, groups),
    );
    if in_groups(groups, &["trace"]) && !record.response.trace.is_empty() {
        out.insert(
            "trace".to_string(),
            trace_value(&record.response.trace, groups),
        );
    }
    if let Some(rank) = record.alexa_rank {
        out.insert("alexa_rank".to_string(), json!(rank));
    }
    if let Some(metadata) = record.metadata {
        out.insert("metadata".to_string(), json!(metadata));
    }
    if let Some(error) = &record.response.error {
        out.insert("error".to_string(), json!(error));
    }
    Value::Object(out)
}

pub fn raw_result_value(raw: &RawResult, groups: &[String]) -> Value {
    let mut out = Map::new();
    if in_groups(groups, GROUPS_SECTIONS) {
        if !raw.answers.is_empty() {
            out.insert("answers".to_string(), records_value(&raw.answers, groups));
        }
        if !raw.additional.is_empty() {
            out.insert(
                "additionals".to_string(),
                records_value(&raw.additional, groups),
            );
        }
        if !raw.authorities.is_empty() {
            out.insert(
                "authorities".to_string(),
                records_value(&raw.authorities, groups),
            );
        }
    }
    if in_groups(groups, GROUPS_PROTOCOL) {
        out.insert("protocol".to_string(), json!(raw.protocol));
    }
    if in_groups(groups, GROUPS_RESOLVER) {
        out.insert("resolver".to_string(), json!(raw.resolver));
    }
    if in_groups(groups, GROUPS_FLAGS) {
        out.insert(
            "flags".to_string(),
            serde_json::to_value(&raw.flags).unwrap_or(Value::Null),
        );
    }
    Value::Object(out)
}

fn records_value(records: &[RecordEntry], groups: &[String]) -> Value {
    Value::Array(records.iter().map(|r| record_value(r, groups)).collect())
}

fn record_value(record: &RecordEntry, groups: &[String]) -> Value {
    let mut out = Map::new();
    out.insert("name".to_string(), json!(record.name));
    out.insert("type".to_string(), json!(record.type_name()));
    if in_groups(groups, GROUPS_CLASS) {
        out.insert("class".to_string(), json!(record.class));
    }
    if in_groups(groups, GROUPS_TTL) {
        out.insert("ttl".to_string(), json!(record.ttl));
    }
    out.insert("answer".to_string(), record.data.answer_value());
    Value::Object(out)
}

fn trace_value(trace: &[TraceStep], groups: &[String]) -> Value {
    Value::Array(
        trace
            .iter()
            .map(|step| {
                json!({
                    "results": raw_result_value(&step.result, groups),
                    "type": step.dns_type,
                    "class": step.dns_class,
                    "name": step.name,
                    "name_server": step.name_server,
                    "depth": step.depth,
                    "layer": step.layer,
                    "cached": step.cached,
                })
            })
            .collect(),
    )
}
