use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rand::seq::SliceRandom;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::blacklist::Blacklist;
use crate::cache::RecursionCache;
use crate::config::{class_name, GlobalConfig};
use crate::input::{
    add_default_port, make_name, parse_alexa_line, parse_metadata_line, parse_normal_line,
};
use crate::modules::LookupModule;
use crate::output::{build_output_record, timestamp_now, OutputRecord, RunMetadata};
use crate::question::Question;
use crate::resolver::Resolver;
use crate::status::Status;
use crate::transport::{Exchanger, NetExchanger};

#[derive(Debug, Default)]
struct WorkerMetadata {
    names: usize,
    statuses: HashMap<String, usize>,
}

/// Drive the whole run: feeder → worker pool → writer, then the metadata
/// summary.
pub async fn run_lookups(config: GlobalConfig) -> Result<()> {
    let start_time = timestamp_now(config.nanoseconds);

    let cache = Arc::new(RecursionCache::new(config.cache_size));
    let blacklist = if config.blacklist_file.is_empty() {
        None
    } else {
        let blacklist = Blacklist::from_file(&config.blacklist_file)?;
        info!(entries = blacklist.len(), "loaded nameserver blacklist");
        Some(Arc::new(blacklist))
    };

    let local_addr = *config
        .local_addrs
        .choose(&mut rand::thread_rng())
        .context("no local address available")?;
    let exchanger: Arc<dyn Exchanger> = if config.reuse_sockets {
        Arc::new(
            NetExchanger::with_shared_socket(local_addr)
                .await
                .context("unable to bind the shared local socket")?,
        )
    } else {
        Arc::new(NetExchanger::new_ephemeral(local_addr))
    };

    let (input_tx, input_rx) = mpsc::channel::<String>(config.threads);
    let (output_tx, output_rx) = mpsc::channel::<String>(config.threads);
    let input_rx = Arc::new(Mutex::new(input_rx));

    let feeder = tokio::spawn(feed_input(config.input_file.clone(), input_tx));
    let writer = tokio::spawn(write_output(config.output_file.clone(), output_rx));

    let config = Arc::new(config);
    let next_id = Arc::new(AtomicU64::new(0));
    let mut workers = Vec::with_capacity(config.threads);
    for _ in 0..config.threads {
        let resolver = Resolver::new(
            config.resolver_config(),
            exchanger.clone(),
            cache.clone(),
            blacklist.clone(),
        );
        workers.push(tokio::spawn(worker_loop(
            config.clone(),
            resolver,
            input_rx.clone(),
            output_tx.clone(),
            next_id.clone(),
        )));
    }
    drop(output_tx);

    let mut names = 0usize;
    let mut statuses: HashMap<String, usize> = HashMap::new();
    let mut first_error: Option<anyhow::Error> = None;
    for worker in workers {
        match worker.await {
            Ok(Ok(metadata)) => {
                names += metadata.names;
                for (status, count) in metadata.statuses {
                    *statuses.entry(status).or_insert(0) += count;
                }
            }
            Ok(Err(error)) => first_error = first_error.or(Some(error)),
            Err(error) => first_error = first_error.or(Some(error.into())),
        }
    }
    feeder.await??;
    writer.await??;
    if let Some(error) = first_error {
        return Err(error);
    }

    if !config.metadata_file.is_empty() {
        let metadata = RunMetadata {
            names,
            statuses,
            start_time,
            end_time: timestamp_now(config.nanoseconds),
            name_servers: config.name_servers.clone(),
            timeout: config.timeout.as_secs(),
            retries: config.retries,
            conf: (*config).clone(),
        };
        let json = serde_json::to_string(&metadata).context("unable to encode run metadata")?;
        if config.metadata_file == "-" {
            eprintln!("{json}");
        } else {
            std::fs::write(&config.metadata_file, json).with_context(|| {
                format!("unable to write metadata file {:?}", config.metadata_file)
            })?;
        }
    }
    Ok(())
}

/// One worker: pull lines, resolve, emit. Each processed input bumps
/// exactly one histogram bucket, whether or not a record was written.
async fn worker_loop(
    config: Arc<GlobalConfig>,
    mut resolver: impl LookupModule + Send,
    input: Arc<Mutex<mpsc::Receiver<String>>>,
    output: mpsc::Sender<String>,
    next_id: Arc<AtomicU64>,
) -> Result<WorkerMetadata> {
    let class_str = class_name(config.qclass);
    let mut metadata = WorkerMetadata::default();
    loop {
        let line = {
            let mut receiver = input.lock().await;
            receiver.recv().await
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut raw_name = String::new();
        let mut name_server = None;
        let mut alexa_rank = None;
        let mut entry_metadata = None;
        if config.alexa_format {
            let (name, rank) = match parse_alexa_line(line) {
                Ok(parsed) => parsed,
                Err(error) => bail!("malformed alexa input: {error}"),
            };
            raw_name = name;
            alexa_rank = Some(rank);
        } else if config.metadata_format {
            let (name, tag) = parse_metadata_line(line);
            raw_name = name;
            entry_metadata = Some(tag);
        } else if config.name_server_mode {
            name_server = Some(add_default_port(line));
        } else {
            let (name, server) = parse_normal_line(line);
            raw_name = name;
            name_server = server;
        }

        let (lookup_name, changed) = make_name(&raw_name, &config.prefix, &config.override_name);
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        let mut question = Question::new(lookup_name.clone(), config.qtype, config.qclass, id);
        question.name_server = name_server.or_else(|| {
            if config.iterative {
                // The resolver starts from a random root on its own.
                None
            } else {
                config
                    .name_servers
                    .choose(&mut rand::thread_rng())
                    .cloned()
            }
        });

        let response = resolver.do_lookup(&question).await;
        let timestamp = timestamp_now(config.nanoseconds);
        debug!(name = %raw_name, status = %response.status, "lookup finished");

        if response.status != Status::NoOutput {
            let record = OutputRecord {
                name: &raw_name,
                altered_name: changed.then_some(lookup_name.as_str()),
                class: &class_str,
                timestamp: &timestamp,
                alexa_rank,
                metadata: entry_metadata.as_deref(),
                response: &response,
            };
            let line = build_output_record(&record, &config.output_groups).to_string();
            if output.send(line).await.is_err() {
                break;
            }
        }
        metadata.names += 1;
        *metadata
            .statuses
            .entry(response.status.as_str().to_string())
            .or_insert(0) += 1;
    }
    Ok(metadata)
}

async fn feed_input(path: String, tx: mpsc::Sender<String>) -> Result<()> {
    let reader: Box<dyn AsyncRead + Send + Unpin> = if path == "-" {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(
            tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("unable to open input file {path:?}"))?,
        )
    };
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if tx.send(line).await.is_err() {
            break;
        }
    }
    Ok(())
}

async fn write_output(path: String, mut rx: mpsc::Receiver<String>) -> Result<()> {
    let mut writer: Box<dyn AsyncWrite + Send + Unpin> = if path == "-" {
        Box::new(tokio::io::stdout())
    } else {
        Box::new(
            tokio::fs::File::create(&path)
                .await
                .with_context(|| format!("unable to open output file {path:?}"))?,
        )
    };
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;
    Ok(())
}
