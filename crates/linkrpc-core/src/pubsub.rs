use std::collections::{HashMap, HashSet};
use std::sync::Weak;

use facet::Facet;
use linkrpc_wire::Codec;
use parking_lot::RwLock;

use crate::handle::ConnectionHandle;

struct Subscription {
    connection: Weak<ConnectionHandle>,
    token: Option<String>,
}

/// Registry of `(topic, token) -> subscriber` entries, shared by the server
/// (fan-out on publish) and the per-connection read loop (insertion on
/// `sub_pub` frames).
///
/// Connections are held by id in the server's connection map; this registry
/// only ever holds a [`Weak`] handle, so a closed connection's entries
/// become unreachable on their own rather than needing active notification —
/// the owned copy lives in exactly one place, per the "map is the single
/// source of truth for connection liveness" design note.
#[derive(Default)]
pub struct SubscriptionRegistry {
    by_topic: RwLock<HashMap<String, Vec<Subscription>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: String, token: Option<String>, connection: Weak<ConnectionHandle>) {
        self.by_topic
            .write()
            .entry(topic)
            .or_default()
            .push(Subscription { connection, token });
    }

    /// Fan out `value` to every live subscriber of `topic`. The wire body is
    /// `(OK, topic, packed_value)`: the inner `packed_value` bytes are
    /// opaque here and decoded by the subscriber against its own expected
    /// type, the same way a response body is decoded against the caller's
    /// expected return type.
    pub fn publish<T: Facet<'static>>(&self, topic: &str, value: &T) {
        let inner = Codec::pack(value);
        let body = Codec::pack_ok(&(topic.to_string(), inner));
        self.fanout(topic, |_sub_token| true, body);
    }

    /// As [`Self::publish`], but delivered only to subscribers that
    /// registered with the matching `token`.
    pub fn publish_by_token<T: Facet<'static>>(&self, topic: &str, token: &str, value: &T) {
        let inner = Codec::pack(value);
        let body = Codec::pack_ok(&(topic.to_string(), inner));
        self.fanout(topic, |sub_token| sub_token == Some(token), body);
    }

    fn fanout(&self, topic: &str, matches: impl Fn(Option<&str>) -> bool, body: Vec<u8>) {
        let guard = self.by_topic.read();
        let Some(subs) = guard.get(topic) else {
            return;
        };
        for sub in subs {
            if !matches(sub.token.as_deref()) {
                continue;
            }
            if let Some(conn) = sub.connection.upgrade() {
                conn.publish(body.clone());
            }
        }
    }

    /// Drop entries whose connection is no longer reachable. Called
    /// periodically by the server's subscription sweep task.
    pub fn sweep(&self) {
        self.by_topic.write().retain(|_topic, subs| {
            subs.retain(|s| s.connection.strong_count() > 0);
            !subs.is_empty()
        });
    }

    /// The live set of distinct subscription tokens, for diagnostics.
    pub fn subscribed_tokens(&self) -> HashSet<String> {
        self.by_topic
            .read()
            .values()
            .flatten()
            .filter_map(|s| s.token.clone())
            .collect()
    }
}
