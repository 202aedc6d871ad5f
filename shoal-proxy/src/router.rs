//! Command routing.
//!
//! Maps a parsed command to a target backend address. Key-carrying verbs
//! route on the hash slot of the first key argument; administrative,
//! transactional, pub/sub, and scripting verbs go to any live master.
//!
//! Transactions, subscriptions, and blocking commands need client-to-
//! backend affinity the proxy does not model; sending them to a single
//! arbitrary master keeps plain single-node semantics instead of silently
//! breaking them. Callers that need the full semantics must talk to the
//! cluster directly.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use shoal_cluster::ShardMap;
use shoal_resp::Command;

/// How a verb chooses its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Route on the slot of the first key argument.
    Keyed,
    /// Any live master will do.
    AnyNode,
    /// Verb not in the table; treated like `AnyNode` but logged.
    Unknown,
}

/// Verbs that carry their routing key in `args[1]`.
const KEYED_VERBS: &[&str] = &[
    // Strings.
    "GET", "SET", "GETSET", "SETNX", "SETEX", "PSETEX", "MGET", "MSET", "MSETNX", "INCR", "DECR",
    "INCRBY", "DECRBY", "INCRBYFLOAT", "APPEND", "STRLEN", "GETRANGE", "SETRANGE", "GETBIT",
    "SETBIT", "BITCOUNT", "BITOP",
    // Hashes.
    "HGET", "HSET", "HSETNX", "HMGET", "HMSET", "HGETALL", "HKEYS", "HVALS", "HLEN", "HEXISTS",
    "HDEL", "HINCRBY", "HINCRBYFLOAT", "HSCAN",
    // Lists.
    "LPUSH", "RPUSH", "LPOP", "RPOP", "LLEN", "LRANGE", "LTRIM", "LINDEX", "LSET", "LREM",
    "LINSERT", "BLPOP", "BRPOP", "BRPOPLPUSH", "RPOPLPUSH",
    // Sets.
    "SADD", "SREM", "SMEMBERS", "SCARD", "SISMEMBER", "SRANDMEMBER", "SPOP", "SMOVE", "SINTER",
    "SINTERSTORE", "SUNION", "SUNIONSTORE", "SDIFF", "SDIFFSTORE", "SSCAN",
    // Sorted sets.
    "ZADD", "ZREM", "ZSCORE", "ZINCRBY", "ZCARD", "ZCOUNT", "ZRANGE", "ZREVRANGE",
    "ZRANGEBYSCORE", "ZREVRANGEBYSCORE", "ZRANK", "ZREVRANK", "ZREMRANGEBYRANK",
    "ZREMRANGEBYSCORE", "ZUNIONSTORE", "ZINTERSTORE", "ZSCAN",
    // Generic key ops.
    "DEL", "EXISTS", "EXPIRE", "EXPIREAT", "TTL", "PTTL", "PERSIST", "TYPE", "RENAME", "RENAMENX",
    "MOVE", "DUMP", "RESTORE", "SORT", "TOUCH",
    // HyperLogLog.
    "PFADD", "PFCOUNT", "PFMERGE",
    // Bitfields.
    "BITFIELD",
    // Streams.
    "XADD", "XREAD", "XREADGROUP", "XPENDING", "XCLAIM", "XACK", "XGROUP", "XINFO", "XLEN",
    "XRANGE", "XREVRANGE", "XTRIM", "XDEL",
];

/// Verbs served by any master: admin and introspection, transactions,
/// pub/sub, and scripting.
const ANY_NODE_VERBS: &[&str] = &[
    "CLUSTER", "INFO", "PING", "TIME", "COMMAND", "CONFIG", "CLIENT", "MEMORY", "LATENCY",
    "SLOWLOG", "MONITOR", "DEBUG", "SHUTDOWN",
    "MULTI", "EXEC", "DISCARD", "WATCH", "UNWATCH",
    "PUBLISH", "SUBSCRIBE", "UNSUBSCRIBE", "PSUBSCRIBE", "PUNSUBSCRIBE", "PUBSUB",
    "EVAL", "EVALSHA", "SCRIPT",
];

/// Verbs that must reach the exact node the client targeted, so their
/// redirects are forwarded rather than chased.
const NO_REDIRECT_VERBS: &[&str] = &["CLUSTER", "INFO", "PING", "COMMAND"];

/// Returns the verb table, built once.
fn verb_classes() -> &'static HashMap<&'static str, RouteClass> {
    static TABLE: OnceLock<HashMap<&'static str, RouteClass>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = HashMap::with_capacity(KEYED_VERBS.len() + ANY_NODE_VERBS.len());
        for verb in KEYED_VERBS {
            table.insert(*verb, RouteClass::Keyed);
        }
        for verb in ANY_NODE_VERBS {
            table.insert(*verb, RouteClass::AnyNode);
        }
        table
    })
}

/// Classifies a verb. The lookup is case-insensitive; callers pass the
/// uppercased verb from [`Command::verb`].
#[must_use]
pub fn classify(verb: &str) -> RouteClass {
    verb_classes()
        .get(verb)
        .copied()
        .unwrap_or(RouteClass::Unknown)
}

/// Chooses a backend address per command.
pub struct Router {
    shard_map: Arc<ShardMap>,
    auto_redirect: bool,
}

impl Router {
    /// Creates a router over the given topology cache.
    #[must_use]
    pub fn new(shard_map: Arc<ShardMap>, auto_redirect: bool) -> Self {
        Self {
            shard_map,
            auto_redirect,
        }
    }

    /// Returns the backend address this command should be sent to first.
    #[must_use]
    pub fn target_for(&self, cmd: &Command) -> String {
        let Some(verb) = cmd.verb() else {
            return self.shard_map.any_master();
        };

        match classify(&verb) {
            RouteClass::Keyed => match cmd.key() {
                Some(key) => {
                    let addr = self.shard_map.addr_for_key(key);
                    debug!(verb = %verb, addr = %addr, "routed by key");
                    addr
                }
                // A key-routed verb without its key argument; last resort.
                None => self.shard_map.first_seed(),
            },
            RouteClass::AnyNode => self.shard_map.any_master(),
            RouteClass::Unknown => {
                warn!(verb = %verb, "unknown verb routed to arbitrary master");
                self.shard_map.any_master()
            }
        }
    }

    /// Returns true when a redirect reply for this command should be chased
    /// instead of forwarded to the client.
    #[must_use]
    pub fn auto_redirect(&self, cmd: &Command) -> bool {
        if !self.auto_redirect {
            return false;
        }
        match cmd.verb() {
            Some(verb) => !NO_REDIRECT_VERBS.contains(&verb.as_str()),
            None => true,
        }
    }
}
