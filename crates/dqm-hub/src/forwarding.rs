//! The per-service forwarding table: ABSENT → ACTIVE(subs≥1) → ABSENT.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dqm_core::Connection;
use dqm_transport::ClientEndpoint;

/// One active service's upstream leg plus its current downstream
/// subscribers. Entries only exist while `subscribers` is non-empty; an
/// empty entry is removed in the same operation that would have emptied it
/// (an invariant of the forwarding state).
pub(crate) struct ForwardingEntry {
    /// `None` while the upstream connect is still in flight or being
    /// retried after a drop; subscribers queued in the meantime still get
    /// whatever arrives once it completes.
    pub(crate) upstream: Option<Arc<ClientEndpoint>>,
    pub(crate) subscribers: HashSet<Connection>,
}

impl ForwardingEntry {
    fn with_first_subscriber(conn: Connection) -> Self {
        let mut subscribers = HashSet::new();
        subscribers.insert(conn);
        Self {
            upstream: None,
            subscribers,
        }
    }
}

/// Guards the `service name -> ForwardingEntry` map. Mutations happen under
/// one lock, matching the single-critical-section requirement
/// ("when it becomes empty the upstream subscription is released in the
/// same critical section").
#[derive(Default)]
pub(crate) struct ForwardingTable {
    entries: parking_lot::Mutex<HashMap<String, ForwardingEntry>>,
}

/// Outcome of [`ForwardingTable::subscribe`]: whether the caller is now
/// responsible for establishing the upstream connection.
pub(crate) enum SubscribeOutcome {
    /// The entry already existed (or was already being established);
    /// the caller only needed to add itself to the subscriber set.
    Joined,
    /// The entry was just created — the caller must open the upstream
    /// subscription.
    Created,
}

impl ForwardingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&self, name: &str, conn: &Connection) -> SubscribeOutcome {
        let mut entries = self.entries.lock();
        match entries.get_mut(name) {
            Some(entry) => {
                entry.subscribers.insert(conn.clone());
                SubscribeOutcome::Joined
            }
            None => {
                entries.insert(
                    name.to_string(),
                    ForwardingEntry::with_first_subscriber(conn.clone()),
                );
                SubscribeOutcome::Created
            }
        }
    }

    /// Removes `conn` from `name`'s subscriber set. Returns the upstream
    /// handle to tear down if the set just became empty (entry deleted).
    pub(crate) fn unsubscribe(&self, name: &str, conn: &Connection) -> Option<Arc<ClientEndpoint>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(name)?;
        entry.subscribers.remove(conn);
        if entry.subscribers.is_empty() {
            entries.remove(name).and_then(|e| e.upstream)
        } else {
            None
        }
    }

    /// Removes `conn` from every entry it subscribed to (peer disconnect,
    /// connection close). Returns the upstream handles of every entry that
    /// became empty as a result.
    pub(crate) fn drop_connection(&self, conn: &Connection) -> Vec<Arc<ClientEndpoint>> {
        let mut released = Vec::new();
        let mut entries = self.entries.lock();
        entries.retain(|_name, entry| {
            entry.subscribers.remove(conn);
            if entry.subscribers.is_empty() {
                if let Some(upstream) = entry.upstream.take() {
                    released.push(upstream);
                }
                false
            } else {
                true
            }
        });
        released
    }

    /// Installs the just-established upstream handle for `name`. If every
    /// subscriber left while the connect was in flight, the entry is gone
    /// and the fresh connection is handed back to the caller to close.
    pub(crate) fn install_upstream(
        &self,
        name: &str,
        upstream: Arc<ClientEndpoint>,
    ) -> Option<Arc<ClientEndpoint>> {
        let mut entries = self.entries.lock();
        match entries.get_mut(name) {
            Some(entry) if !entry.subscribers.is_empty() => {
                entry.upstream = Some(upstream);
                None
            }
            _ => Some(upstream),
        }
    }

    /// Marks `name`'s upstream as gone (dropped unexpectedly) and reports
    /// whether subscribers remain and a resubscribe attempt is warranted.
    pub(crate) fn clear_upstream_for_retry(&self, name: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(name) {
            Some(entry) => {
                entry.upstream = None;
                !entry.subscribers.is_empty()
            }
            None => false,
        }
    }

    pub(crate) fn subscribers_of(&self, name: &str) -> Vec<Connection> {
        self.entries
            .lock()
            .get(name)
            .map(|entry| entry.subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn active_service_count(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: u64) -> Connection {
        Connection::new(id, "/service")
    }

    #[test]
    fn first_subscriber_creates_the_entry() {
        let table = ForwardingTable::new();
        assert!(matches!(
            table.subscribe("/svc", &conn(1)),
            SubscribeOutcome::Created
        ));
        assert!(matches!(
            table.subscribe("/svc", &conn(2)),
            SubscribeOutcome::Joined
        ));
        assert_eq!(table.active_service_count(), 1);
        assert_eq!(table.subscribers_of("/svc").len(), 2);
    }

    #[test]
    fn last_unsubscribe_drops_the_entry() {
        let table = ForwardingTable::new();
        table.subscribe("/svc", &conn(1));
        table.subscribe("/svc", &conn(2));
        assert!(table.unsubscribe("/svc", &conn(1)).is_none());
        assert_eq!(table.active_service_count(), 1);
        assert!(table.unsubscribe("/svc", &conn(2)).is_none());
        assert_eq!(table.active_service_count(), 0);
    }

    #[test]
    fn connection_close_drops_every_entry_it_joined() {
        let table = ForwardingTable::new();
        table.subscribe("/a", &conn(1));
        table.subscribe("/b", &conn(1));
        table.subscribe("/b", &conn(2));
        // Neither entry has a real upstream installed in this unit test (no
        // event loop to build a `ClientEndpoint` against), so nothing comes
        // back to close — only the table bookkeeping is under test here.
        assert!(table.drop_connection(&conn(1)).is_empty());
        assert_eq!(table.active_service_count(), 1); // only /a became empty
        assert_eq!(table.subscribers_of("/b"), vec![conn(2)]);
    }
}
