use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use tracing::debug;

use crate::question::{normalize_name, RawResult};
use crate::record::RecordEntry;
use crate::status::Status;

const NS_TYPE_CODE: u16 = 2;

/// Key for a prior result. `is_authority` keeps cached delegations apart
/// from cached final answers, so an NS entry for a zone never collides with
/// an A answer for the same name.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CacheKey {
    pub name: String,
    pub rtype: u16,
    pub qclass: u16,
    pub is_authority: bool,
}

impl CacheKey {
    pub fn answer(name: &str, rtype: u16, qclass: u16) -> Self {
        CacheKey {
            name: normalize_name(name),
            rtype,
            qclass,
            is_authority: false,
        }
    }

    pub fn authority(name: &str, qclass: u16) -> Self {
        CacheKey {
            name: normalize_name(name),
            rtype: NS_TYPE_CODE,
            qclass,
            is_authority: true,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedResult {
    result: RawResult,
    /// The delegation layer the result was obtained at.
    #[allow(dead_code)]
    layer: String,
}

/// LRU cache of prior lookup results, shared by all workers. Entries never
/// expire by TTL: the tool observes what was cached, it does not
/// re-validate. Eviction is capacity pressure only.
#[derive(Debug)]
pub struct RecursionCache {
    lru: Mutex<LruCache<CacheKey, CachedResult>>,
}

impl RecursionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        RecursionCache {
            lru: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<RawResult> {
        let mut guard = self.lru.lock().unwrap();
        let hit = guard.get(key).map(|cached| cached.result.clone());
        debug!(?key, hit = hit.is_some(), "cache get");
        hit
    }

    /// Split a result into cacheable entries: one per answer
    /// `(name, type, class)` group and one per authority owner name, with
    /// matching glue attached. Anything that is not a clean NOERROR result
    /// is refused.
    pub fn put(&self, layer: &str, result: &RawResult, status: Status, depth: usize, id: u64) {
        if status != Status::NoError {
            return;
        }
        let mut entries: Vec<(CacheKey, RawResult)> = Vec::new();

        let mut answer_groups: HashMap<CacheKey, Vec<RecordEntry>> = HashMap::new();
        for answer in &result.answers {
            let key = CacheKey::answer(&answer.name, answer.type_code, answer.class_code);
            answer_groups.entry(key).or_default().push(answer.clone());
        }
        for (key, answers) in answer_groups {
            let value = RawResult {
                answers,
                protocol: result.protocol.clone(),
                resolver: result.resolver.clone(),
                flags: result.flags.clone(),
                ..RawResult::default()
            };
            entries.push((key, value));
        }

        let mut authority_groups: HashMap<String, Vec<RecordEntry>> = HashMap::new();
        for authority in &result.authorities {
            if !authority.data.is_ns() {
                continue;
            }
            authority_groups
                .entry(normalize_name(&authority.name))
                .or_default()
                .push(authority.clone());
        }
        for (owner, authorities) in authority_groups {
            let targets: Vec<String> = authorities
                .iter()
                .filter_map(|ns| ns.data.simple_answer())
                .map(normalize_name)
                .collect();
            let glue: Vec<RecordEntry> = result
                .additional
                .iter()
                .filter(|add| add.data.is_a() && targets.contains(&normalize_name(&add.name)))
                .cloned()
                .collect();
            let qclass = authorities[0].class_code;
            let value = RawResult {
                authorities,
                additional: glue,
                protocol: result.protocol.clone(),
                resolver: result.resolver.clone(),
                flags: result.flags.clone(),
                ..RawResult::default()
            };
            entries.push((CacheKey::authority(&owner, qclass), value));
        }

        if entries.is_empty() {
            return;
        }
        debug!(layer, depth, id, count = entries.len(), "cache update");
        let mut guard = self.lru.lock().unwrap();
        for (key, value) in entries {
            guard.put(
                key,
                CachedResult {
                    result: value,
                    layer: layer.to_string(),
                },
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lru.lock().unwrap().len()
    }
}
