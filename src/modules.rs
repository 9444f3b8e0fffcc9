use std::collections::HashMap;

use async_trait::async_trait;
use tracing::warn;

use crate::question::{Question, Response};

/// The built-in record-type modules. The worker dispatcher resolves the
/// user's module selection against this table and stamps the resulting
/// 16-bit code onto every outgoing question; the resolver itself treats the
/// code as opaque.
const BUILTIN_MODULES: [(&str, u16); 66] = [
    ("A", 1),
    ("AAAA", 28),
    ("AFSDB", 18),
    ("ANY", 255),
    ("ATMA", 34),
    ("AVC", 258),
    ("CAA", 257),
    ("CDNSKEY", 60),
    ("CDS", 59),
    ("CERT", 37),
    ("CNAME", 5),
    ("CSYNC", 62),
    ("DHCID", 49),
    ("DNSKEY", 48),
    ("DS", 43),
    ("EID", 31),
    ("EUI48", 108),
    ("EUI64", 109),
    ("GID", 102),
    ("GPOS", 27),
    ("HINFO", 13),
    ("HIP", 55),
    ("HTTPS", 65),
    ("ISDN", 20),
    ("KEY", 25),
    ("KX", 36),
    ("L32", 105),
    ("L64", 106),
    ("LOC", 29),
    ("LP", 107),
    ("MB", 7),
    ("MD", 3),
    ("MF", 4),
    ("MG", 8),
    ("MR", 9),
    ("MX", 15),
    ("NAPTR", 35),
    ("NID", 104),
    ("NIMLOC", 32),
    ("NINFO", 56),
    ("NS", 2),
    ("NSAPPTR", 23),
    ("NSEC", 47),
    ("NSEC3", 50),
    ("NSEC3PARAM", 51),
    ("NULL", 10),
    ("NXT", 30),
    ("OPENPGPKEY", 61),
    ("PTR", 12),
    ("PX", 26),
    ("RP", 17),
    ("RRSIG", 46),
    ("RT", 21),
    ("SMIMEA", 53),
    ("SOA", 6),
    ("SPF", 99),
    ("SRV", 33),
    ("SSHFP", 44),
    ("SVCB", 64),
    ("TALINK", 58),
    ("TKEY", 249),
    ("TLSA", 52),
    ("TXT", 16),
    ("UID", 101),
    ("UINFO", 100),
    ("UNSPEC", 103),
];

/// Name → RR type code registry. Explicitly constructed and handed to the
/// dispatcher; tests build their own.
#[derive(Debug, Clone)]
pub struct ModuleSet {
    modules: HashMap<String, u16>,
}

impl ModuleSet {
    pub fn empty() -> Self {
        ModuleSet {
            modules: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut set = ModuleSet::empty();
        for (name, code) in BUILTIN_MODULES {
            set.register(name, code);
        }
        set
    }

    /// Register a module. Re-registering an existing name is allowed; the
    /// last write wins.
    pub fn register(&mut self, name: &str, code: u16) {
        let name = name.to_ascii_uppercase();
        if self.modules.contains_key(&name) {
            warn!(module = %name, "module already registered, overwriting");
        }
        self.modules.insert(name, code);
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.modules.get(&name.to_ascii_uppercase()).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(&name.to_ascii_uppercase())
    }

    pub fn valid_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ModuleSet {
    fn default() -> Self {
        ModuleSet::with_builtins()
    }
}

/// Extension seam for lookup behavior. All built-in record types share the
/// stock resolver; a module with its own post-processing implements this.
#[async_trait]
pub trait LookupModule {
    async fn do_lookup(&mut self, question: &Question) -> Response;
}
