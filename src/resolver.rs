use async_recursion::async_recursion;
use async_trait::async_trait;
use hickory_proto::rr::Name;
use rand::seq::SliceRandom;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::blacklist::Blacklist;
use crate::cache::{CacheKey, RecursionCache};
use crate::config::ResolverConfig;
use crate::modules::LookupModule;
use crate::question::{normalize_name, Lookup, Question, RawResult, Response, TraceStep};
use crate::record::{RecordData, RecordEntry};
use crate::status::{handle_status, Status};
use crate::transport::{Exchanger, Transport};

const A_TYPE_CODE: u16 = 1;
const PTR_TYPE_CODE: u16 = 12;
const INET_CLASS_CODE: u16 = 1;

const ROOT_LAYER: &str = ".";

/// One resolver per worker. The cache, blacklist and exchanger are shared
/// across workers; the transport timeouts and the iterative deadline are
/// per-worker state.
#[derive(Debug)]
pub struct Resolver {
    config: ResolverConfig,
    transport: Transport,
    cache: Arc<RecursionCache>,
    blacklist: Option<Arc<Blacklist>>,
    iterative_stop: Instant,
}

impl Resolver {
    pub fn new(
        config: ResolverConfig,
        exchanger: Arc<dyn Exchanger>,
        cache: Arc<RecursionCache>,
        blacklist: Option<Arc<Blacklist>>,
    ) -> Self {
        let transport = Transport::new(exchanger, &config);
        Resolver {
            config,
            transport,
            cache,
            blacklist,
            iterative_stop: Instant::now(),
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The single entry point: validate, rewrite PTR questions, dispatch to
    /// the iterative walk or the external recursor.
    pub async fn do_lookup(&mut self, question: &Question) -> Response {
        if question.qtype == 0 {
            return Response::empty(
                Status::IllegalInput,
                question.id,
                Some("invalid config in field type: unset (set to 0)".to_string()),
            );
        }
        if question.qclass == 0 {
            return Response::empty(
                Status::IllegalInput,
                question.id,
                Some("invalid config in field class: unset (set to 0)".to_string()),
            );
        }

        let mut question = question.clone();
        if question.qtype == PTR_TYPE_CODE {
            match reverse_name(&question.name) {
                Ok(reversed) => question.name = reversed,
                Err(error) => {
                    return Response::empty(Status::IllegalInput, question.id, Some(error));
                }
            }
        }

        if self.config.iterative {
            debug!(name = %question.name, qtype = question.qtype, "iterative lookup start");
            self.iterative_stop = Instant::now() + self.config.iteration_timeout;
            let name_server = question
                .name_server
                .clone()
                .unwrap_or_else(|| self.random_name_server());
            let mut trace = Vec::new();
            let lookup = self
                .iterative_lookup(&question, &name_server, 1, ROOT_LAYER, &mut trace)
                .await;
            debug!(name = %question.name, status = %lookup.status, "iterative lookup done");
            Response {
                data: lookup.raw,
                status: lookup.status,
                trace,
                id: question.id,
                error: lookup.error,
            }
        } else {
            let Some(name_server) = question.name_server.clone() else {
                return Response::empty(
                    Status::IllegalInput,
                    question.id,
                    Some("invalid config in field name_server: unset".to_string()),
                );
            };
            self.traced_retrying_lookup(&question, &name_server).await
        }
    }

    /// External-recursive branch: one retried exchange with the recursor.
    async fn traced_retrying_lookup(&mut self, question: &Question, name_server: &str) -> Response {
        let mut lookup = self.retrying_lookup(question, name_server, true).await;
        strip_non_answer_sections(&mut lookup.raw);
        Response {
            data: lookup.raw,
            status: lookup.status,
            trace: Vec::new(),
            id: question.id,
            error: lookup.error,
        }
    }

    #[async_recursion]
    async fn iterative_lookup(
        &mut self,
        question: &Question,
        name_server: &str,
        depth: usize,
        layer: &str,
        trace: &mut Vec<TraceStep>,
    ) -> Lookup {
        debug!(name = %question.name, name_server, depth, layer, "iterating");
        if depth > self.config.max_depth {
            return Lookup::failed(Status::Error, Some("max recursion depth reached".to_string()));
        }

        let (mut lookup, was_cached) = self
            .cached_retrying_lookup(question, name_server, layer, depth)
            .await;
        if self.config.traced && lookup.status == Status::NoError {
            trace.push(TraceStep {
                result: lookup.raw.clone(),
                dns_type: question.qtype,
                dns_class: question.qclass,
                name: question.name.clone(),
                name_server: name_server.to_string(),
                depth,
                layer: layer.to_string(),
                cached: was_cached,
            });
        }

        if lookup.status != Status::NoError {
            return lookup;
        }
        if !lookup.raw.answers.is_empty() || lookup.raw.flags.authoritative {
            // The full sections survive in the trace only.
            strip_non_answer_sections(&mut lookup.raw);
            return lookup;
        }
        if !lookup.raw.authorities.is_empty() {
            return self
                .iterate_on_authorities(question, depth, lookup.raw, layer, trace)
                .await;
        }
        Lookup::failed(
            Status::Error,
            Some("NOERROR record without answers or authorities".to_string()),
        )
    }

    /// Follow a delegation: try each authority in order until one of them
    /// produces an answer-shaped status.
    async fn iterate_on_authorities(
        &mut self,
        question: &Question,
        depth: usize,
        parent: RawResult,
        layer: &str,
        trace: &mut Vec<TraceStep>,
    ) -> Lookup {
        if parent.authorities.is_empty() {
            return Lookup::failed(Status::NoAuth, None);
        }
        let total = parent.authorities.len();
        for (index, authority) in parent.authorities.iter().enumerate() {
            let last = index + 1 == total;
            let (name_server, ns_status, new_layer) = self
                .extract_authority(authority, layer, depth, &parent, trace)
                .await;
            if ns_status == Status::IterTimeout {
                return Lookup::failed(Status::IterTimeout, None);
            }
            if ns_status != Status::NoError {
                if !last {
                    continue;
                }
                return match handle_status(ns_status) {
                    Some(recognized) => Lookup::failed(recognized, None),
                    None => Lookup::failed(
                        ns_status,
                        Some(format!("could not extract authority {}", authority.name)),
                    ),
                };
            }
            let lookup = self
                .iterative_lookup(question, &name_server, depth + 1, &new_layer, trace)
                .await;
            if lookup.status == Status::IterTimeout || lookup.status.is_answer() || last {
                return lookup;
            }
        }
        unreachable!("authority iteration must return")
    }

    /// Turn one authority record into a queryable `host:port`: check the
    /// parent reply's glue first, fall back to a full address lookup from
    /// the root. Glue is taken at face value; following the authoritative
    /// answer's own glue is the measurement-correct behavior.
    async fn extract_authority(
        &mut self,
        authority: &RecordEntry,
        layer: &str,
        depth: usize,
        parent: &RawResult,
        trace: &mut Vec<TraceStep>,
    ) -> (String, Status, String) {
        let target = match &authority.data {
            RecordData::Ns { target } => normalize_name(target),
            _ => return (String::new(), Status::FormErr, layer.to_string()),
        };
        let Some(new_layer) = name_is_beneath(&authority.name, layer) else {
            return (String::new(), Status::AuthFail, layer.to_string());
        };

        if let Some(address) = check_glue(&target, parent) {
            return (format!("{address}:53"), Status::NoError, new_layer);
        }

        let sub_question = Question::new(target, A_TYPE_CODE, INET_CLASS_CODE, 0);
        let root = self.random_name_server();
        let lookup = self
            .iterative_lookup(&sub_question, &root, depth + 1, ROOT_LAYER, trace)
            .await;
        if lookup.status == Status::IterTimeout {
            return (String::new(), Status::IterTimeout, String::new());
        }
        if lookup.status == Status::NoError {
            for answer in &lookup.raw.answers {
                if let RecordData::A { address } = &answer.data {
                    return (format!("{address}:53"), Status::NoError, new_layer);
                }
            }
        }
        (String::new(), Status::ServFail, new_layer)
    }

    /// One step of the walk: global deadline, answer cache, blacklist,
    /// authority cache, then the wire; the wire result feeds the cache.
    async fn cached_retrying_lookup(
        &mut self,
        question: &Question,
        name_server: &str,
        layer: &str,
        depth: usize,
    ) -> (Lookup, bool) {
        if Instant::now() >= self.iterative_stop {
            return (Lookup::failed(Status::IterTimeout, None), false);
        }

        let answer_key = CacheKey::answer(&question.name, question.qtype, question.qclass);
        if let Some(result) = self.cache.get(&answer_key) {
            return (Lookup::new(result, Status::NoError, None), true);
        }

        if let Some(blacklist) = &self.blacklist {
            match host_of(name_server) {
                Ok(host) => {
                    if blacklist.is_listed(host) {
                        return (Lookup::failed(Status::Blacklist, None), false);
                    }
                }
                Err(error) => return (Lookup::failed(Status::Error, Some(error)), false),
            }
        }

        let layer_name = normalize_name(layer);
        let auth_name = next_authority(&question.name, layer);
        if question.name != layer_name
            && !auth_name.is_empty()
            && normalize_name(&auth_name) != layer_name
        {
            let auth_key = CacheKey::authority(&auth_name, INET_CLASS_CODE);
            if let Some(result) = self.cache.get(&auth_key) {
                return (Lookup::new(result, Status::NoError, None), true);
            }
        }

        let lookup = self.retrying_lookup(question, name_server, false).await;
        self.cache
            .put(layer, &lookup.raw, lookup.status, depth, question.id);
        (lookup, false)
    }

    /// One-shot wire lookup with retries. Transport deadlines double per
    /// retry and are restored on return, whatever the outcome.
    async fn retrying_lookup(
        &mut self,
        question: &Question,
        name_server: &str,
        recursive: bool,
    ) -> Lookup {
        debug!(name = %question.name, qtype = question.qtype, name_server, "wire lookup");
        let orig_udp = self.transport.udp_timeout();
        let orig_tcp = self.transport.tcp_timeout();
        for attempt in 0..=self.config.retries {
            let lookup = self.transport.lookup(question, name_server, recursive).await;
            if !lookup.status.is_retryable() || attempt == self.config.retries {
                self.transport.set_udp_timeout(orig_udp);
                self.transport.set_tcp_timeout(orig_tcp);
                return lookup;
            }
            self.transport.set_udp_timeout(self.transport.udp_timeout() * 2);
            self.transport.set_tcp_timeout(self.transport.tcp_timeout() * 2);
        }
        unreachable!("retry loop must return")
    }

    fn random_name_server(&self) -> String {
        self.config
            .name_servers
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| crate::config::ROOT_SERVERS[0].to_string())
    }
}

#[async_trait]
impl LookupModule for Resolver {
    async fn do_lookup(&mut self, question: &Question) -> Response {
        Resolver::do_lookup(self, question).await
    }
}

/// A result that carries answers keeps only them: the authority and
/// additional sections are dropped from the returned payload.
fn strip_non_answer_sections(raw: &mut RawResult) {
    if !raw.answers.is_empty() {
        raw.authorities.clear();
        raw.additional.clear();
    }
}

/// The host portion of a `host:port` nameserver spec.
fn host_of(name_server: &str) -> Result<IpAddr, String> {
    name_server
        .parse::<std::net::SocketAddr>()
        .map(|addr| addr.ip())
        .map_err(|_| format!("invalid name server address {name_server:?}"))
}

/// Glue scan: an A record in the parent's additional section whose owner
/// name matches the NS target.
fn check_glue(target: &str, parent: &RawResult) -> Option<std::net::Ipv4Addr> {
    parent.additional.iter().find_map(|add| match &add.data {
        RecordData::A { address } if normalize_name(&add.name) == target => Some(*address),
        _ => None,
    })
}

/// Is `name` at or beneath `layer`? On success the (normalized) owner name
/// becomes the new layer, trailing dot included.
fn name_is_beneath(name: &str, layer: &str) -> Option<String> {
    let owner = normalize_name(name);
    if layer == ROOT_LAYER {
        return Some(format!("{owner}."));
    }
    let layer = normalize_name(layer);
    if owner == layer || owner.ends_with(&format!(".{layer}")) {
        return Some(format!("{owner}."));
    }
    None
}

/// The label-extension of `layer` by one label toward `name`, in
/// trailing-dot form. Empty when the two do not share the expected suffix
/// relationship.
fn next_authority(name: &str, layer: &str) -> String {
    let name = normalize_name(name);
    if name.ends_with("in-addr.arpa") && layer == ROOT_LAYER {
        return "in-addr.arpa.".to_string();
    }
    let name_labels: Vec<&str> = if name.is_empty() {
        Vec::new()
    } else {
        name.split('.').collect()
    };
    let layer_name = normalize_name(layer);
    let layer_labels: Vec<&str> = if layer_name.is_empty() {
        Vec::new()
    } else {
        layer_name.split('.').collect()
    };
    if name_labels.len() <= layer_labels.len() || !name_labels.ends_with(&layer_labels) {
        return String::new();
    }
    let next = name_labels[name_labels.len() - layer_labels.len() - 1];
    if layer_labels.is_empty() {
        format!("{next}.")
    } else {
        format!("{next}.{layer_name}.")
    }
}

/// Rewrite an IP address into its reverse-lookup name, trailing dot
/// stripped.
fn reverse_name(name: &str) -> Result<String, String> {
    let addr: IpAddr = name
        .parse()
        .map_err(|_| format!("invalid IP address for PTR lookup: {name:?}"))?;
    Ok(normalize_name(&Name::from(addr).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_exchanger::FakeExchanger;
    use anyhow::Result;
    use hickory_proto::op::{Header, Message, MessageType, ResponseCode};
    use hickory_proto::rr::{rdata, RData, Record};
    use std::time::Duration;
    use tracing::Level;
    use tracing_subscriber::FmtSubscriber;

    use crate::{a, answer, ns, refer};

    #[ctor::ctor]
    fn init() {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn iterative_config(roots: &[&str]) -> ResolverConfig {
        ResolverConfig {
            iterative: true,
            traced: true,
            name_servers: roots.iter().map(|s| s.to_string()).collect(),
            ..ResolverConfig::default()
        }
    }

    fn resolver_with(
        exchanger: &Arc<FakeExchanger>,
        config: ResolverConfig,
        blacklist: Option<Arc<Blacklist>>,
    ) -> Resolver {
        Resolver::new(
            config,
            exchanger.clone() as Arc<dyn Exchanger>,
            Arc::new(RecursionCache::new(1024)),
            blacklist,
        )
    }

    /// A recursor-style reply: rd+ra set, the given answers attached.
    fn recursive_answer(records: Vec<Record>) -> Message {
        let mut message = Message::new();
        let mut header = Header::new();
        header.set_message_type(MessageType::Response);
        header.set_recursion_desired(true);
        header.set_recursion_available(true);
        message.set_header(header);
        message.insert_answers(records);
        message
    }

    #[tokio::test]
    async fn test_external_recursive_success() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        exchanger.add(
            "127.0.0.1:53",
            "example.com",
            1,
            recursive_answer(vec![a!("example.com.", "93.184.216.34")]),
        )?;
        let mut resolver = resolver_with(&exchanger, ResolverConfig::default(), None);

        let question =
            Question::new("example.com.", 1, 1, 42).with_name_server("127.0.0.1:53");
        let response = resolver.do_lookup(&question).await;

        assert_eq!(response.status, Status::NoError);
        assert_eq!(response.id, 42);
        assert_eq!(response.data.answers.len(), 1);
        assert_eq!(response.data.answers[0].name, "example.com.");
        assert_eq!(
            response.data.answers[0].data,
            RecordData::A { address: "93.184.216.34".parse()? }
        );
        assert_eq!(response.data.resolver, "127.0.0.1:53");
        assert_eq!(response.data.protocol, "udp");
        assert!(response.data.flags.recursion_available);
        Ok(())
    }

    #[tokio::test]
    async fn test_external_recursive_drops_non_answer_sections() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        let mut reply = recursive_answer(vec![a!("example.com.", "93.184.216.34")]);
        reply.insert_name_servers(vec![ns!("example.com.", "ns1.example.com.")]);
        reply.insert_additionals(vec![a!("ns1.example.com.", "192.0.2.10")]);
        exchanger.add("127.0.0.1:53", "example.com", 1, reply)?;
        let mut resolver = resolver_with(&exchanger, ResolverConfig::default(), None);

        let question = Question::new("example.com", 1, 1, 0).with_name_server("127.0.0.1:53");
        let response = resolver.do_lookup(&question).await;

        assert_eq!(response.status, Status::NoError);
        assert_eq!(response.data.answers.len(), 1);
        assert!(response.data.authorities.is_empty());
        assert!(response.data.additional.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_tcp_fallback_on_truncation() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        let mut truncated = recursive_answer(vec![]);
        let mut header = *truncated.header();
        header.set_truncated(true);
        truncated.set_header(header);
        exchanger.add("127.0.0.1:53", "example.com", 1, truncated)?;
        exchanger.add_tcp(
            "127.0.0.1:53",
            "example.com",
            1,
            recursive_answer(vec![
                a!("example.com.", "192.0.2.1"),
                a!("example.com.", "192.0.2.2"),
                a!("example.com.", "192.0.2.3"),
                a!("example.com.", "192.0.2.4"),
                a!("example.com.", "192.0.2.5"),
            ]),
        )?;
        let mut resolver = resolver_with(&exchanger, ResolverConfig::default(), None);

        let question = Question::new("example.com", 1, 1, 0).with_name_server("127.0.0.1:53");
        let response = resolver.do_lookup(&question).await;

        assert_eq!(response.status, Status::NoError);
        assert_eq!(response.data.protocol, "tcp");
        assert_eq!(response.data.answers.len(), 5);
        Ok(())
    }

    fn script_delegation(exchanger: &FakeExchanger) -> Result<()> {
        exchanger.add(
            "198.41.0.4:53",
            "www.example.com",
            1,
            refer!(ns!("com.", "a.gtld-servers.net."); a!("a.gtld-servers.net.", "192.5.6.30")),
        )?;
        exchanger.add(
            "192.5.6.30:53",
            "www.example.com",
            1,
            refer!(ns!("example.com.", "ns1.example.com."); a!("ns1.example.com.", "192.0.2.10")),
        )?;
        exchanger.add(
            "192.0.2.10:53",
            "www.example.com",
            1,
            answer!(a!("www.example.com.", "93.184.216.34")),
        )?;
        Ok(())
    }

    #[tokio::test]
    async fn test_iterative_walk() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        script_delegation(&exchanger)?;
        let mut resolver =
            resolver_with(&exchanger, iterative_config(&["198.41.0.4:53"]), None);

        let question = Question::new("www.example.com", 1, 1, 7);
        let response = resolver.do_lookup(&question).await;

        assert_eq!(response.status, Status::NoError);
        assert_eq!(response.id, 7);
        assert_eq!(response.trace.len(), 3);
        let layers: Vec<&str> = response.trace.iter().map(|t| t.layer.as_str()).collect();
        assert_eq!(layers, vec![".", "com.", "example.com."]);
        let depths: Vec<usize> = response.trace.iter().map(|t| t.depth).collect();
        assert_eq!(depths, vec![1, 2, 3]);
        assert_eq!(response.data.answers.len(), 1);
        assert_eq!(response.data.answers[0].name, "www.example.com.");
        assert!(response.data.authorities.is_empty());
        assert!(response.data.additional.is_empty());
        // The trace keeps the pre-clear sections of the intermediate steps.
        assert!(!response.trace[0].result.authorities.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_glue_preferred_over_sub_lookup() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        exchanger.add(
            "198.41.0.4:53",
            "www.example.com",
            1,
            refer!(
                ns!("com.", "a.gtld-servers.net."),
                ns!("com.", "b.gtld-servers.net.");
                a!("a.gtld-servers.net.", "192.5.6.30")
            ),
        )?;
        exchanger.add(
            "192.5.6.30:53",
            "www.example.com",
            1,
            refer!(ns!("example.com.", "ns1.example.com."); a!("ns1.example.com.", "192.0.2.10")),
        )?;
        exchanger.add(
            "192.0.2.10:53",
            "www.example.com",
            1,
            answer!(a!("www.example.com.", "93.184.216.34")),
        )?;
        let mut resolver =
            resolver_with(&exchanger, iterative_config(&["198.41.0.4:53"]), None);

        let response = resolver.do_lookup(&Question::new("www.example.com", 1, 1, 0)).await;

        assert_eq!(response.status, Status::NoError);
        // Root, gtld, authoritative server. No address lookup for the
        // glued nameserver was ever issued.
        let servers: Vec<String> = exchanger
            .exchanges()
            .iter()
            .map(|key| key.server.to_string())
            .collect();
        assert_eq!(servers, vec!["198.41.0.4:53", "192.5.6.30:53", "192.0.2.10:53"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_iterative_timeout() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        exchanger.add_delayed(
            "198.41.0.4:53",
            "www.example.com",
            1,
            refer!(
                ns!("com.", "a.gtld-servers.net."),
                ns!("com.", "b.gtld-servers.net.");
                a!("a.gtld-servers.net.", "192.5.6.30"),
                a!("b.gtld-servers.net.", "192.33.14.30")
            ),
            Duration::from_millis(50),
        )?;
        let config = ResolverConfig {
            iteration_timeout: Duration::from_millis(10),
            ..iterative_config(&["198.41.0.4:53"])
        };
        let mut resolver = resolver_with(&exchanger, config, None);

        let response = resolver.do_lookup(&Question::new("www.example.com", 1, 1, 0)).await;

        assert_eq!(response.status, Status::IterTimeout);
        // Only the root was ever contacted; the deadline fired before any
        // delegated authority was attempted.
        assert_eq!(exchanger.exchange_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_blacklisted_authority() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        exchanger.add(
            "198.41.0.4:53",
            "www.example.com",
            1,
            refer!(ns!("com.", "ns.bad.example."); a!("ns.bad.example.", "192.0.2.1")),
        )?;
        let blacklist = Arc::new(Blacklist::from_nets(vec!["192.0.2.1/32".parse()?]));
        let mut resolver = resolver_with(
            &exchanger,
            iterative_config(&["198.41.0.4:53"]),
            Some(blacklist),
        );

        let response = resolver.do_lookup(&Question::new("www.example.com", 1, 1, 0)).await;

        assert_eq!(response.status, Status::Blacklist);
        assert!(!exchanger.contacted("192.0.2.1:53"));
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_exhaustion_restores_timeouts() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        exchanger.add_timeout("127.0.0.1:53", "example.com", 1)?;
        let config = ResolverConfig {
            retries: 2,
            ..ResolverConfig::default()
        };
        let mut resolver = resolver_with(&exchanger, config, None);
        let orig_udp = resolver.transport().udp_timeout();
        let orig_tcp = resolver.transport().tcp_timeout();

        let question = Question::new("example.com", 1, 1, 0).with_name_server("127.0.0.1:53");
        let response = resolver.do_lookup(&question).await;

        assert_eq!(response.status, Status::Timeout);
        assert_eq!(exchanger.exchange_count(), 3);
        assert_eq!(resolver.transport().udp_timeout(), orig_udp);
        assert_eq!(resolver.transport().tcp_timeout(), orig_tcp);
        Ok(())
    }

    #[tokio::test]
    async fn test_temporary_failures_retry() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        exchanger.add_temporary("127.0.0.1:53", "example.com", 1)?;
        let config = ResolverConfig {
            retries: 1,
            ..ResolverConfig::default()
        };
        let mut resolver = resolver_with(&exchanger, config, None);

        let question = Question::new("example.com", 1, 1, 0).with_name_server("127.0.0.1:53");
        let response = resolver.do_lookup(&question).await;

        assert_eq!(response.status, Status::Temporary);
        assert!(response.error.is_some());
        assert_eq!(exchanger.exchange_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_servfail_is_not_retried() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        let mut servfail = Message::new();
        servfail.set_response_code(ResponseCode::ServFail);
        exchanger.add("127.0.0.1:53", "example.com", 1, servfail)?;
        let config = ResolverConfig {
            retries: 3,
            ..ResolverConfig::default()
        };
        let mut resolver = resolver_with(&exchanger, config, None);

        let question = Question::new("example.com", 1, 1, 0).with_name_server("127.0.0.1:53");
        let response = resolver.do_lookup(&question).await;

        assert_eq!(response.status, Status::ServFail);
        assert_eq!(exchanger.exchange_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unset_type_and_class_are_rejected() {
        let exchanger = Arc::new(FakeExchanger::new());
        let mut resolver = resolver_with(&exchanger, ResolverConfig::default(), None);

        let response = resolver
            .do_lookup(&Question::new("example.com", 0, 1, 1).with_name_server("127.0.0.1:53"))
            .await;
        assert_eq!(response.status, Status::IllegalInput);
        assert!(response.error.unwrap().contains("type"));

        let response = resolver
            .do_lookup(&Question::new("example.com", 1, 0, 2).with_name_server("127.0.0.1:53"))
            .await;
        assert_eq!(response.status, Status::IllegalInput);
        assert!(response.error.unwrap().contains("class"));

        // Neither invalid question touched the transport.
        assert_eq!(exchanger.exchange_count(), 0);
    }

    #[tokio::test]
    async fn test_ptr_rewrites_to_reverse_name() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        let mut reply = recursive_answer(vec![]);
        reply.insert_answers(vec![Record::from_rdata(
            "34.216.184.93.in-addr.arpa.".parse()?,
            300,
            RData::PTR(rdata::PTR("example.com.".parse()?)),
        )]);
        exchanger.add("127.0.0.1:53", "34.216.184.93.in-addr.arpa", 12, reply)?;
        let mut resolver = resolver_with(&exchanger, ResolverConfig::default(), None);

        let question =
            Question::new("93.184.216.34", 12, 1, 0).with_name_server("127.0.0.1:53");
        let response = resolver.do_lookup(&question).await;
        assert_eq!(response.status, Status::NoError);
        assert_eq!(response.data.answers.len(), 1);

        let bad = Question::new("not-an-ip", 12, 1, 0).with_name_server("127.0.0.1:53");
        let response = resolver.do_lookup(&bad).await;
        assert_eq!(response.status, Status::IllegalInput);
        Ok(())
    }

    #[tokio::test]
    async fn test_trace_stays_empty_when_not_traced() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        script_delegation(&exchanger)?;
        let config = ResolverConfig {
            traced: false,
            ..iterative_config(&["198.41.0.4:53"])
        };
        let mut resolver = resolver_with(&exchanger, config, None);

        let response = resolver.do_lookup(&Question::new("www.example.com", 1, 1, 0)).await;
        assert_eq!(response.status, Status::NoError);
        assert!(response.trace.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_lookup_is_cached() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        script_delegation(&exchanger)?;
        let mut resolver =
            resolver_with(&exchanger, iterative_config(&["198.41.0.4:53"]), None);

        let question = Question::new("www.example.com", 1, 1, 0);
        let first = resolver.do_lookup(&question).await;
        assert_eq!(first.status, Status::NoError);
        let wire_exchanges = exchanger.exchange_count();

        let second = resolver.do_lookup(&question).await;
        assert_eq!(second.status, Status::NoError);
        assert_eq!(second.data.answers, first.data.answers);
        // Served from the answer cache, no new wire traffic.
        assert_eq!(exchanger.exchange_count(), wire_exchanges);
        assert_eq!(second.trace.len(), 1);
        assert!(second.trace[0].cached);
        Ok(())
    }

    #[tokio::test]
    async fn test_noerror_without_answers_or_authorities() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        exchanger.add("198.41.0.4:53", "www.example.com", 1, Message::new())?;
        let mut resolver =
            resolver_with(&exchanger, iterative_config(&["198.41.0.4:53"]), None);

        let response = resolver.do_lookup(&Question::new("www.example.com", 1, 1, 0)).await;
        assert_eq!(response.status, Status::Error);
        assert!(response
            .error
            .unwrap()
            .contains("NOERROR record without answers or authorities"));
        Ok(())
    }

    #[tokio::test]
    async fn test_max_depth() -> Result<()> {
        let exchanger = Arc::new(FakeExchanger::new());
        // Root refers every query straight back to itself.
        exchanger.add(
            "198.41.0.4:53",
            "www.example.com",
            1,
            refer!(ns!("com.", "ns.com."); a!("ns.com.", "198.41.0.4")),
        )?;
        let config = ResolverConfig {
            max_depth: 3,
            ..iterative_config(&["198.41.0.4:53"])
        };
        let mut resolver = resolver_with(&exchanger, config, None);

        let response = resolver.do_lookup(&Question::new("www.example.com", 1, 1, 0)).await;
        assert_eq!(response.status, Status::Error);
        assert_eq!(response.error.as_deref(), Some("max recursion depth reached"));
        Ok(())
    }

    #[test]
    fn test_name_is_beneath() {
        assert_eq!(name_is_beneath("com.", "."), Some("com.".to_string()));
        assert_eq!(
            name_is_beneath("example.com.", "com."),
            Some("example.com.".to_string())
        );
        assert_eq!(
            name_is_beneath("EXAMPLE.com.", "example.com."),
            Some("example.com.".to_string())
        );
        assert_eq!(name_is_beneath("example.net.", "com."), None);
        assert_eq!(name_is_beneath("notcom.", "com."), None);
    }

    #[test]
    fn test_next_authority() {
        assert_eq!(next_authority("a.b.example.com", "example.com."), "b.example.com.");
        assert_eq!(next_authority("www.example.com", "."), "com.");
        assert_eq!(next_authority("example.com", "example.com."), "");
        assert_eq!(next_authority("example.net", "com."), "");
        assert_eq!(next_authority("4.3.2.1.in-addr.arpa", "."), "in-addr.arpa.");
    }

    #[test]
    fn test_reverse_name() {
        assert_eq!(
            reverse_name("93.184.216.34").unwrap(),
            "34.216.184.93.in-addr.arpa"
        );
        assert!(reverse_name("not-an-ip").is_err());
    }
}
