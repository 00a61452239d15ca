//! Run-scoped record of contacted addresses.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug)]
enum ClaimState {
    /// A send is in flight. The receiver closes once the claim is committed or released.
    Pending(watch::Receiver<()>),
    Sent,
}

/// Outcome of [`DedupLedger::claim`].
#[derive(Debug)]
pub enum Claim<'a> {
    /// The caller owns the address until it commits or drops the ticket.
    Acquired(ClaimTicket<'a>),
    /// The address was already delivered in this run.
    AlreadySent,
}

/// Addresses successfully contacted during one run, plus the sends in flight.
///
/// Claiming is an atomic test-and-set, so two senders racing on the same address never both
/// send. A sender that meets an address another sender is still working on waits for that
/// attempt to finish: a delivered address is then a duplicate, a failed one is claimed again.
/// Either way the outcome matches a sequential run over the same input.
#[derive(Debug, Default)]
pub struct DedupLedger {
    entries: DashMap<String, ClaimState>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `address` for a send attempt, waiting out any attempt in flight.
    pub async fn claim(&self, address: &str) -> Claim<'_> {
        loop {
            let mut pending = match self.entries.entry(address.to_string()) {
                Entry::Vacant(slot) => {
                    let (done, waiters) = watch::channel(());
                    slot.insert(ClaimState::Pending(waiters));
                    return Claim::Acquired(ClaimTicket {
                        ledger: self,
                        address: address.to_string(),
                        done: Some(done),
                    });
                }
                Entry::Occupied(slot) => match slot.get() {
                    ClaimState::Sent => return Claim::AlreadySent,
                    ClaimState::Pending(waiters) => waiters.clone(),
                },
            };

            debug!(to = %address, "Waiting for in-flight send to the same address");
            // Only ever errors: the sender side is dropped, never written to.
            let _ = pending.changed().await;
        }
    }

    /// Whether `address` was successfully sent to in this run.
    pub fn contains(&self, address: &str) -> bool {
        self.entries
            .get(address)
            .is_some_and(|entry| matches!(*entry, ClaimState::Sent))
    }

    /// Number of addresses successfully sent to.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.value(), ClaimState::Sent))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive right to send to one address.
///
/// Dropping the ticket without [`ClaimTicket::commit`] releases the address, so a failed or
/// abandoned attempt never marks it as sent.
#[derive(Debug)]
pub struct ClaimTicket<'a> {
    ledger: &'a DedupLedger,
    address: String,
    done: Option<watch::Sender<()>>,
}

impl ClaimTicket<'_> {
    /// Record the address as delivered.
    pub fn commit(mut self) {
        self.ledger
            .entries
            .insert(self.address.clone(), ClaimState::Sent);
        // Waiters wake up after the state change and see `Sent`.
        self.done.take();
    }
}

impl Drop for ClaimTicket<'_> {
    fn drop(&mut self) {
        if self.done.is_some() {
            self.ledger
                .entries
                .remove_if(&self.address, |_, state| matches!(state, ClaimState::Pending(_)));
            self.done.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    async fn acquire<'a>(ledger: &'a DedupLedger, address: &str) -> ClaimTicket<'a> {
        match ledger.claim(address).await {
            Claim::Acquired(ticket) => ticket,
            Claim::AlreadySent => panic!("{address} unexpectedly already sent"),
        }
    }

    #[tokio::test]
    async fn test_commit_blocks_later_claims() {
        let ledger = DedupLedger::new();
        acquire(&ledger, "x@y.com").await.commit();

        assert!(ledger.contains("x@y.com"));
        assert!(matches!(ledger.claim("x@y.com").await, Claim::AlreadySent));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_ticket_frees_address() {
        let ledger = DedupLedger::new();
        drop(acquire(&ledger, "x@y.com").await);

        assert!(!ledger.contains("x@y.com"));
        assert!(matches!(ledger.claim("x@y.com").await, Claim::Acquired(_)));
    }

    #[tokio::test]
    async fn test_pending_claim_is_not_contained() {
        let ledger = DedupLedger::new();
        let _ticket = acquire(&ledger, "x@y.com").await;
        assert!(!ledger.contains("x@y.com"));
        assert!(ledger.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_sees_commit_as_duplicate() {
        let ledger = Arc::new(DedupLedger::new());

        let holder = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                let ticket = acquire(&ledger, "x@y.com").await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                ticket.commit();
            })
        };
        tokio::task::yield_now().await;

        assert!(matches!(ledger.claim("x@y.com").await, Claim::AlreadySent));
        holder.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_takes_over_after_release() {
        let ledger = Arc::new(DedupLedger::new());

        let holder = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                let ticket = acquire(&ledger, "x@y.com").await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                drop(ticket);
            })
        };
        tokio::task::yield_now().await;

        let ticket = acquire(&ledger, "x@y.com").await;
        ticket.commit();
        assert!(ledger.contains("x@y.com"));
        holder.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_deliver_once() {
        let ledger = Arc::new(DedupLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move {
                    match ledger.claim("race@example.com").await {
                        Claim::Acquired(ticket) => {
                            ticket.commit();
                            true
                        }
                        Claim::AlreadySent => false,
                    }
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
