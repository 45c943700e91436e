//! Rendezvous coordinator.
//!
//! Owns one waiting queue per listening side. Every newly accepted
//! connection is either matched with the oldest connection waiting on the
//! opposite side or parked at the back of its own side's queue.
//!
//! ```text
//!   service (P1) ──► [c1, c2, c3]      public (P2) ──► [ ]
//!
//!   enqueue(Public, p1)  ──►  Pair { service: c1, public: p1 }
//!   service queue        ──►  [c2, c3]
//! ```
//!
//! The coordinator is generic over the connection type.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

/// Which listening port a connection arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// First listener (internal service port, 5432 by default)
    Service,
    /// Second listener (public port, 443 by default)
    Public,
}

impl Side {
    /// The side a connection from this side is matched against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Service => Side::Public,
            Side::Public => Side::Service,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Service => f.write_str("service"),
            Side::Public => f.write_str("public"),
        }
    }
}

/// Two matched connections, one from each side.
#[derive(Debug, PartialEq, Eq)]
pub struct Pair<C> {
    /// Connection accepted on the service side
    pub service: C,
    /// Connection accepted on the public side
    pub public: C,
}

#[derive(Debug)]
struct Queues<C> {
    service: VecDeque<C>,
    public: VecDeque<C>,
    pairs_formed: u64,
}

impl<C> Queues<C> {
    fn side_mut(&mut self, side: Side) -> &mut VecDeque<C> {
        match side {
            Side::Service => &mut self.service,
            Side::Public => &mut self.public,
        }
    }

    fn side(&self, side: Side) -> &VecDeque<C> {
        match side {
            Side::Service => &self.service,
            Side::Public => &self.public,
        }
    }
}

/// Pairing state for both listening sides.
///
/// The check of the opposite queue and the mutation of either queue happen
/// under a single lock, so concurrent arrivals on both sides can never leave
/// a connection unmatched while a peer is waiting, nor match one twice.
pub struct Rendezvous<C> {
    queues: Mutex<Queues<C>>,
}

impl<C> Rendezvous<C> {
    /// Create a coordinator with both queues empty.
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(Queues {
                service: VecDeque::new(),
                public: VecDeque::new(),
                pairs_formed: 0,
            }),
        }
    }

    /// Offer a newly accepted connection.
    ///
    /// Returns the formed pair when a connection was waiting on the opposite
    /// side; otherwise the connection is queued and `None` is returned.
    pub fn enqueue(&self, side: Side, conn: C) -> Option<Pair<C>> {
        let mut queues = self.queues.lock();

        match queues.side_mut(side.opposite()).pop_front() {
            Some(waiting) => {
                queues.pairs_formed += 1;
                Some(match side {
                    Side::Service => Pair {
                        service: conn,
                        public: waiting,
                    },
                    Side::Public => Pair {
                        service: waiting,
                        public: conn,
                    },
                })
            }
            None => {
                queues.side_mut(side).push_back(conn);
                None
            }
        }
    }

    /// Number of connections waiting on a side.
    pub fn waiting(&self, side: Side) -> usize {
        self.queues.lock().side(side).len()
    }

    /// Total number of pairs formed so far.
    pub fn pairs_formed(&self) -> u64 {
        self.queues.lock().pairs_formed
    }

    /// Remove every waiting connection from both queues.
    ///
    /// Used on shutdown so unmatched sockets are released.
    pub fn drain(&self) -> Vec<(Side, C)> {
        let mut queues = self.queues.lock();
        let mut out: Vec<(Side, C)> = queues
            .service
            .drain(..)
            .map(|c| (Side::Service, c))
            .collect();
        out.extend(queues.public.drain(..).map(|c| (Side::Public, c)));
        out
    }
}

impl<C> Default for Rendezvous<C> {
    fn default() -> Self {
        Self::new()
    }
}
