use parking_lot::Mutex;
use std::fmt;

use super::semaphore::Semaphore;
use crate::errors::{LookupError, QueueError, Result};

/// Fixed-capacity circular FIFO of text items shared by any number of
/// producer and consumer threads.
///
/// Every slot owns a text buffer allocated once at construction. `put` copies
/// the caller's item into a slot and `get` copies a slot out into a buffer the
/// caller owns, so no reference to slot storage ever leaves the queue.
///
/// # Synchronization
///
/// One mutex guards `head`, `tail`, `count` and the slot contents. Two
/// counting semaphores track free and filled slots. Both `put` and `get` pass
/// their semaphore before taking the mutex and never hold the mutex while
/// waiting, which rules out lock-order deadlocks between the three.
///
/// ```text
/// put: free.acquire  -> lock -> copy into slots[tail] -> unlock -> filled.release
/// get: filled.acquire -> lock -> copy out of slots[head] -> unlock -> free.release
/// ```
pub struct BoundedQueue {
    name: String,
    ring: Mutex<Ring>,
    free: Semaphore,
    filled: Semaphore,
    capacity: usize,
    slot_len: usize,
}

struct Ring {
    slots: Box<[String]>,
    head: usize,
    tail: usize,
    count: usize,
    closed: bool,
    destroyed: bool,
}

impl BoundedQueue {
    /// Allocate `capacity` slots of `slot_len` bytes each.
    ///
    /// One byte of every slot is reserved as terminator space, so the longest
    /// item accepted is `slot_len - 1` bytes.
    pub fn new(name: impl Into<String>, capacity: usize, slot_len: usize) -> Result<Self> {
        let name = name.into();
        if capacity == 0 {
            return Err(LookupError::config(
                format!("{name}.capacity"),
                "queue capacity must be at least 1",
            ));
        }
        if slot_len < 2 {
            return Err(LookupError::config(
                format!("{name}.slot_len"),
                "slots must hold at least one byte plus terminator",
            ));
        }

        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|e| {
            LookupError::Resource(format!("failed to allocate {capacity} slots for {name}: {e}"))
        })?;
        for _ in 0..capacity {
            let mut slot = String::new();
            slot.try_reserve_exact(slot_len).map_err(|e| {
                LookupError::Resource(format!(
                    "failed to allocate {slot_len}-byte slot for {name}: {e}"
                ))
            })?;
            slots.push(slot);
        }

        tracing::debug!(queue = %name, capacity, slot_len, "queue initialized");

        Ok(Self {
            name,
            ring: Mutex::new(Ring {
                slots: slots.into_boxed_slice(),
                head: 0,
                tail: 0,
                count: 0,
                closed: false,
                destroyed: false,
            }),
            free: Semaphore::new(capacity),
            filled: Semaphore::new(0),
            capacity,
            slot_len,
        })
    }

    /// Insert a copy of `item`, blocking while the queue is full.
    ///
    /// Oversized items are rejected before any slot is claimed.
    pub fn put(&self, item: &str) -> std::result::Result<(), QueueError> {
        let max = self.max_item_len();
        if item.len() > max {
            return Err(QueueError::ItemTooLarge {
                len: item.len(),
                max,
            });
        }

        self.free.acquire()?;
        {
            let mut ring = self.ring.lock();
            if ring.closed {
                return Err(QueueError::Destroyed);
            }
            debug_assert!(ring.count < self.capacity);

            let tail = (ring.head + ring.count) % self.capacity;
            let slot = &mut ring.slots[tail];
            slot.clear();
            slot.push_str(item);
            ring.count += 1;
            ring.tail = (ring.head + ring.count) % self.capacity;
        }
        self.filled.release();
        Ok(())
    }

    /// Remove the oldest item, copying it into `out` (previous contents are
    /// discarded). Blocks while the queue is empty.
    pub fn get(&self, out: &mut String) -> std::result::Result<(), QueueError> {
        self.filled.acquire()?;
        {
            let mut ring = self.ring.lock();
            if ring.closed {
                return Err(QueueError::Destroyed);
            }
            debug_assert!(ring.count > 0);

            let head = ring.head;
            let slot = &mut ring.slots[head];
            out.clear();
            out.push_str(slot.as_str());
            slot.clear();
            ring.head = (head + 1) % self.capacity;
            ring.count -= 1;
        }
        self.free.release();
        Ok(())
    }

    /// Current number of items. The value may be stale as soon as it returns.
    pub fn try_get_count(&self) -> usize {
        self.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.try_get_count() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Longest item (in bytes) a slot accepts.
    pub fn max_item_len(&self) -> usize {
        self.slot_len - 1
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.ring.lock().closed
    }

    pub fn is_destroyed(&self) -> bool {
        self.ring.lock().destroyed
    }

    /// Refuse every further `put` and `get` and wake all blocked callers with
    /// [`QueueError::Destroyed`]. Slot storage stays allocated until
    /// [`destroy`](Self::destroy). Returns `false` if already closed.
    pub fn close(&self) -> bool {
        {
            let mut ring = self.ring.lock();
            if ring.closed {
                return false;
            }
            ring.closed = true;
        }
        self.free.close();
        self.filled.close();
        tracing::debug!(queue = %self.name, "queue closed");
        true
    }

    /// Close the queue if still open and release slot storage. A second call
    /// returns [`QueueError::AlreadyDestroyed`] and changes nothing.
    pub fn destroy(&self) -> std::result::Result<(), QueueError> {
        self.close();
        let leftover = {
            let mut ring = self.ring.lock();
            if ring.destroyed {
                return Err(QueueError::AlreadyDestroyed);
            }
            ring.destroyed = true;
            ring.slots = Box::default();
            std::mem::take(&mut ring.count)
        };

        if leftover > 0 {
            tracing::warn!(queue = %self.name, leftover, "queue destroyed with unconsumed items");
        } else {
            tracing::debug!(queue = %self.name, "queue destroyed");
        }
        Ok(())
    }
}

impl fmt::Debug for BoundedQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.ring.lock();
        f.debug_struct("BoundedQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("slot_len", &self.slot_len)
            .field("head", &ring.head)
            .field("tail", &ring.tail)
            .field("count", &ring.count)
            .field("closed", &ring.closed)
            .field("destroyed", &ring.destroyed)
            .field("free_permits", &self.free.permits())
            .field("filled_permits", &self.filled.permits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn queue(capacity: usize) -> BoundedQueue {
        BoundedQueue::new("test", capacity, 16).unwrap()
    }

    #[test]
    fn test_fifo_single_thread() {
        let q = queue(4);
        for name in ["a.com", "b.com", "c.com"] {
            q.put(name).unwrap();
        }
        assert_eq!(q.try_get_count(), 3);

        let mut out = String::new();
        q.get(&mut out).unwrap();
        assert_eq!(out, "a.com");
        q.get(&mut out).unwrap();
        assert_eq!(out, "b.com");
        q.get(&mut out).unwrap();
        assert_eq!(out, "c.com");
        assert!(q.is_empty());
    }

    #[test]
    fn test_wraps_around_capacity() {
        let q = queue(3);
        let mut out = String::new();
        for round in 0..5 {
            for i in 0..3 {
                q.put(&format!("{round}-{i}")).unwrap();
            }
            for i in 0..3 {
                q.get(&mut out).unwrap();
                assert_eq!(out, format!("{round}-{i}"));
            }
        }
        assert_eq!(q.try_get_count(), 0);
    }

    #[test]
    fn test_item_at_slot_boundary() {
        let q = BoundedQueue::new("boundary", 2, 8).unwrap();
        assert_eq!(q.max_item_len(), 7);

        // slot_len - 1 bytes fit together with the terminator
        q.put("1234567").unwrap();

        // slot_len bytes do not
        let err = q.put("12345678").unwrap_err();
        assert_eq!(err, QueueError::ItemTooLarge { len: 8, max: 7 });
        assert_eq!(q.try_get_count(), 1);

        let mut out = String::new();
        q.get(&mut out).unwrap();
        assert_eq!(out, "1234567");
    }

    #[test]
    fn test_rejects_invalid_geometry() {
        assert!(matches!(
            BoundedQueue::new("zero", 0, 16),
            Err(LookupError::Config { .. })
        ));
        assert!(matches!(
            BoundedQueue::new("tiny", 4, 1),
            Err(LookupError::Config { .. })
        ));
    }

    #[test]
    fn test_put_blocks_when_full_until_get() {
        let q = Arc::new(queue(1));
        q.put("first").unwrap();

        let producer = {
            let q = q.clone();
            std::thread::spawn(move || q.put("second"))
        };
        std::thread::sleep(Duration::from_millis(30));
        assert!(!producer.is_finished());
        assert_eq!(q.try_get_count(), 1);

        let mut out = String::new();
        q.get(&mut out).unwrap();
        assert_eq!(out, "first");
        producer.join().unwrap().unwrap();

        q.get(&mut out).unwrap();
        assert_eq!(out, "second");
    }

    #[test]
    fn test_get_blocks_when_empty_until_put() {
        let q = Arc::new(queue(2));
        let consumer = {
            let q = q.clone();
            std::thread::spawn(move || {
                let mut out = String::new();
                q.get(&mut out).map(|_| out)
            })
        };
        std::thread::sleep(Duration::from_millis(30));
        assert!(!consumer.is_finished());

        q.put("late.example").unwrap();
        assert_eq!(consumer.join().unwrap().unwrap(), "late.example");
    }

    #[test]
    fn test_destroy_is_idempotent_and_loud() {
        let q = queue(2);
        q.put("x").unwrap();
        q.destroy().unwrap();
        assert!(q.is_destroyed());
        assert_eq!(q.destroy(), Err(QueueError::AlreadyDestroyed));

        let mut out = String::new();
        assert_eq!(q.put("y"), Err(QueueError::Destroyed));
        assert_eq!(q.get(&mut out), Err(QueueError::Destroyed));
    }

    #[test]
    fn test_close_wakes_blocked_producer_and_allows_destroy() {
        let q = Arc::new(queue(1));
        q.put("first").unwrap();
        let producer = {
            let q = q.clone();
            std::thread::spawn(move || q.put("second"))
        };
        std::thread::sleep(Duration::from_millis(30));
        assert!(!producer.is_finished());

        assert!(q.close());
        assert!(!q.close());
        assert_eq!(producer.join().unwrap(), Err(QueueError::Destroyed));
        assert!(q.is_closed());
        assert!(!q.is_destroyed());

        let mut out = String::new();
        assert_eq!(q.get(&mut out), Err(QueueError::Destroyed));

        // Closing first does not count as the one destroy
        q.destroy().unwrap();
        assert_eq!(q.destroy(), Err(QueueError::AlreadyDestroyed));
    }

    #[test]
    fn test_concurrent_takes_follow_global_put_order() {
        use parking_lot::Mutex;

        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 3;
        const PER_PRODUCER: usize = 200;
        const TOTAL: usize = PRODUCERS * PER_PRODUCER;

        let q = queue(3);
        // Tickets are issued in the same critical section as the put, and
        // takes are stamped in the same critical section as the get.
        let issued = Mutex::new(0usize);
        let taken = Mutex::new(Vec::with_capacity(TOTAL));

        crossbeam::thread::scope(|s| {
            for _ in 0..PRODUCERS {
                let (q, issued) = (&q, &issued);
                s.spawn(move |_| {
                    for _ in 0..PER_PRODUCER {
                        let mut next = issued.lock();
                        q.put(&next.to_string()).unwrap();
                        *next += 1;
                    }
                });
            }
            for c in 0..CONSUMERS {
                let (q, taken) = (&q, &taken);
                let share = TOTAL / CONSUMERS + usize::from(c < TOTAL % CONSUMERS);
                s.spawn(move |_| {
                    let mut out = String::new();
                    for _ in 0..share {
                        let mut log = taken.lock();
                        q.get(&mut out).unwrap();
                        log.push(out.parse::<usize>().unwrap());
                    }
                });
            }
        })
        .unwrap();

        let taken = taken.into_inner();
        assert_eq!(taken, (0..TOTAL).collect::<Vec<_>>());
    }

    #[test]
    fn test_destroy_wakes_blocked_consumers() {
        let q = Arc::new(queue(2));
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let q = q.clone();
                std::thread::spawn(move || {
                    let mut out = String::new();
                    q.get(&mut out)
                })
            })
            .collect();
        std::thread::sleep(Duration::from_millis(30));
        q.destroy().unwrap();
        for consumer in consumers {
            assert_eq!(consumer.join().unwrap(), Err(QueueError::Destroyed));
        }
    }

    #[test]
    fn test_many_producers_many_consumers_exactly_once() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 3;
        const PER_PRODUCER: usize = 250;

        let q = queue(5);
        let received = crossbeam::thread::scope(|s| {
            for p in 0..PRODUCERS {
                let q = &q;
                s.spawn(move |_| {
                    for i in 0..PER_PRODUCER {
                        q.put(&format!("{p}:{i}")).unwrap();
                    }
                });
            }

            let consumers: Vec<_> = (0..CONSUMERS)
                .map(|c| {
                    let q = &q;
                    let share = PRODUCERS * PER_PRODUCER / CONSUMERS
                        + usize::from(c < PRODUCERS * PER_PRODUCER % CONSUMERS);
                    s.spawn(move |_| {
                        let mut out = String::new();
                        let mut seen = Vec::with_capacity(share);
                        for _ in 0..share {
                            q.get(&mut out).unwrap();
                            assert!(q.try_get_count() <= q.capacity());
                            seen.push(out.clone());
                        }
                        seen
                    })
                })
                .collect();

            consumers
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        })
        .unwrap();

        // Each consumer sees every producer's items in production order
        for seen in &received {
            let mut last = vec![None; PRODUCERS];
            for item in seen {
                let (p, i) = item.split_once(':').unwrap();
                let (p, i): (usize, usize) = (p.parse().unwrap(), i.parse().unwrap());
                assert!(last[p].is_none_or(|prev| prev < i), "out of order: {item}");
                last[p] = Some(i);
            }
        }

        let all: HashSet<_> = received.into_iter().flatten().collect();
        assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
        assert!(q.is_empty());
    }
}
