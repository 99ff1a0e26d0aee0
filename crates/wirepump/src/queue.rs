//! The cross-thread event pump.
//!
//! Lock-free event passing: a singly-linked list hands records from
//! the reader thread to the consumer. The only synchronization on the
//! list itself is one atomic publish of the tail pointer. The reader
//! never touches nodes at or before the consumer's flushed tail, and
//! the consumer never follows `next` past it, so the two sides always
//! work on disjoint regions of the list.
//!
//! Memory management: a healthy client buffers no more than a few
//! batches of records at a time, so nodes come from a fixed pool that
//! is taken and restored in ring order. The consumer publishes how many
//! nodes it has released through an atomic counter; the reader drains
//! that counter when its local supply runs out. If the consumer blocks
//! long enough to exhaust the pool, nodes fall back to the heap and are
//! individually freed as the list drains — visible only as a
//! diagnostic counter.

use std::cell::UnsafeCell;
use std::collections::{HashMap, VecDeque};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use wirepump_proto::EventRecord;

use crate::error::PumpError;
use crate::transport::Transport;

/// Number of preallocated nodes. Roughly 4 kB; enough that a responsive
/// consumer never touches the heap.
pub const POOL_SIZE: usize = 100;

/// Callback invoked by the reader after each enqueue batch so the
/// application's control loop can schedule a drain.
pub type WakeupHook = Arc<dyn Fn() + Send + Sync>;

/// Selects which records a drain may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Return records of every kind, deferred user input first.
    All,
    /// Divert user-input records to a side buffer; they are returned,
    /// in arrival order, by the next `All` drain.
    ExcludeUserInput,
}

/// What happens to a record matched by a peek scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeekMode {
    /// Leave the match pending and return a copy of it.
    Retain,
    /// Take the match out of the queue and return it.
    Remove,
    /// Take every match out of the queue, dropping each after the
    /// predicate has seen it. The scan always runs to the end.
    RemoveContinue,
}

/// Handle to a registered peeker cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeekerId(i32);

struct EventNode {
    record: UnsafeCell<Option<EventRecord>>,
    next: AtomicPtr<EventNode>,
    from_heap: bool,
}

impl EventNode {
    fn pooled() -> Self {
        Self {
            record: UnsafeCell::new(None),
            next: AtomicPtr::new(ptr::null_mut()),
            from_heap: false,
        }
    }
}

/// Owning handle to an unlinked node. Not `Copy`: whoever holds one
/// must link it into the list or release it, exactly once.
struct NodeRef(NonNull<EventNode>);

/// State shared between the reader thread and the consumer.
struct Shared {
    /// Fixed node arena. Boxed so addresses are stable for the life of
    /// the queue; nodes link to each other by pointer.
    pool: Box<[EventNode]>,
    /// Last node of the list, published by the reader.
    tail: AtomicPtr<EventNode>,
    /// Pool nodes the consumer has released since the reader last
    /// looked. Incremented by the consumer, drained (exchanged to
    /// zero) by the reader; neither side ever reads it for a backlog
    /// estimate.
    restored: AtomicU32,
    stop: AtomicBool,
    broken: AtomicBool,
    /// Running count of heap fallbacks, for diagnostics only.
    heap_nodes: AtomicU64,
    /// Wake primitive for `wait_for_new_events`; deliberately separate
    /// from the lock-free list path.
    wake_lock: Mutex<()>,
    wake_cond: Condvar,
}

// SAFETY: the list is single-producer/single-consumer. The reader only
// writes record slots of nodes it has not yet published through `tail`
// (or has re-acquired through the `restored` handshake), and the
// consumer only reads slots at or before its own `flushed_tail`
// snapshot of `tail`. The release/acquire pairs on `tail` and
// `restored` order those accesses.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    fn new_seeded() -> (Arc<Shared>, NonNull<EventNode>) {
        let pool: Box<[EventNode]> = (0..POOL_SIZE).map(|_| EventNode::pooled()).collect();
        let shared = Arc::new(Shared {
            pool,
            tail: AtomicPtr::new(ptr::null_mut()),
            restored: AtomicU32::new(0),
            stop: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            heap_nodes: AtomicU64::new(0),
            wake_lock: Mutex::new(()),
            wake_cond: Condvar::new(),
        });
        // Seed the list with one empty node so head is never null and
        // the empty/deferred cases need no special-casing.
        let seed = NonNull::from(&shared.pool[0]);
        shared.tail.store(seed.as_ptr(), Ordering::Release);
        (shared, seed)
    }
}

/// The reader-side half: appends nodes and publishes the tail.
pub(crate) struct Producer {
    shared: Arc<Shared>,
    /// True end of the list; only this thread reads or writes it.
    tail: NonNull<EventNode>,
    pool_index: usize,
    free_nodes: usize,
}

// SAFETY: Producer is moved into the reader thread once and never
// shared; the raw pointers it holds target the pool inside `shared`,
// which the Arc keeps alive.
unsafe impl Send for Producer {}

impl Producer {
    fn acquire(&mut self, record: EventRecord) -> NodeRef {
        if self.free_nodes == 0 {
            // Out of nodes; check whether the consumer has released any.
            self.free_nodes = self.shared.restored.swap(0, Ordering::Acquire) as usize;
        }
        if self.free_nodes > 0 {
            self.free_nodes -= 1;
            if self.pool_index == POOL_SIZE {
                // Wrap back to the beginning; nodes are taken and
                // restored strictly in order.
                self.pool_index = 0;
            }
            let index = self.pool_index;
            self.pool_index += 1;
            let node = &self.shared.pool[index];
            // SAFETY: the restored handshake (release fetch_add by the
            // consumer, acquire swap above) makes the consumer's last
            // use of this slot happen-before this write.
            unsafe { *node.record.get() = Some(record) };
            node.next.store(ptr::null_mut(), Ordering::Relaxed);
            NodeRef(NonNull::from(node))
        } else {
            // The consumer is not draining; fall back to the heap.
            let node = Box::new(EventNode {
                record: UnsafeCell::new(Some(record)),
                next: AtomicPtr::new(ptr::null_mut()),
                from_heap: true,
            });
            let on_heap = self.shared.heap_nodes.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(heap_nodes = on_heap, "node pool exhausted, allocating from heap");
            // SAFETY: Box::into_raw never returns null.
            NodeRef(unsafe { NonNull::new_unchecked(Box::into_raw(node)) })
        }
    }

    /// Link a record after the current tail and publish the new tail.
    /// The single release store of `tail` is the only synchronization
    /// with the consumer.
    pub(crate) fn enqueue(&mut self, record: EventRecord) {
        let node = self.acquire(record);
        // SAFETY: the true tail is owned by this thread; the consumer
        // never follows `next` past its flushed_tail snapshot.
        unsafe { self.tail.as_ref() }
            .next
            .store(node.0.as_ptr(), Ordering::Release);
        self.tail = node.0;
        self.shared.tail.store(node.0.as_ptr(), Ordering::Release);
    }
}

fn mark_broken(shared: &Shared, error: &PumpError) {
    shared.broken.store(true, Ordering::Release);
    tracing::warn!(%error, "display connection broke; event pumping stopped");
}

/// Reader-thread body: block on the transport, append batches, signal
/// the consumer.
fn run_reader(mut producer: Producer, transport: Arc<dyn Transport>, wake_hook: Option<WakeupHook>) {
    tracing::debug!("event reader started");
    let shared = Arc::clone(&producer.shared);
    loop {
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        match transport.wait_for_record() {
            Ok(record) => {
                let guard = shared.wake_lock.lock().unwrap_or_else(PoisonError::into_inner);
                if shared.stop.load(Ordering::Acquire) {
                    // Stop observed after the read returned: the record
                    // is dropped, never delivered.
                    drop(guard);
                    break;
                }
                producer.enqueue(record);
                loop {
                    if shared.stop.load(Ordering::Acquire) {
                        break;
                    }
                    match transport.poll_for_queued_record() {
                        Ok(Some(record)) => producer.enqueue(record),
                        Ok(None) => break,
                        Err(error) => {
                            if !shared.stop.load(Ordering::Acquire) {
                                mark_broken(&shared, &error);
                            }
                            break;
                        }
                    }
                }
                shared.wake_cond.notify_all();
                drop(guard);
                if let Some(hook) = &wake_hook {
                    hook();
                }
                if shared.broken.load(Ordering::Acquire) || shared.stop.load(Ordering::Acquire) {
                    break;
                }
            }
            Err(error) => {
                if !shared.stop.load(Ordering::Acquire) {
                    mark_broken(&shared, &error);
                }
                break;
            }
        }
    }
    // Final wake so a consumer blocked in wait_for_new_events observes
    // shutdown or breakage promptly.
    {
        let _guard = shared.wake_lock.lock().unwrap_or_else(PoisonError::into_inner);
        shared.wake_cond.notify_all();
    }
    if let Some(hook) = &wake_hook {
        hook();
    }
    tracing::debug!(
        heap_nodes = shared.heap_nodes.load(Ordering::Relaxed),
        "event reader stopped"
    );
}

/// Consumer-side handle to the pump.
///
/// Owns the head of the list, the peeker cursors, and the reader
/// thread. Exactly one consumer exists per connection; the type is
/// `Send` but deliberately not `Sync`.
pub struct EventQueue {
    shared: Arc<Shared>,
    transport: Option<Arc<dyn Transport>>,
    /// First node of the list; owned by the consumer.
    head: NonNull<EventNode>,
    /// Last node the consumer may visit; refreshed from the published
    /// tail by `flush_buffered`.
    flushed_tail: NonNull<EventNode>,
    /// User-input records set aside by `DrainMode::ExcludeUserInput`.
    input_backlog: VecDeque<EventRecord>,
    peekers: HashMap<PeekerId, Option<NonNull<EventNode>>>,
    peeker_id_source: i32,
    peeker_cache_dirty: bool,
    reader: Option<JoinHandle<()>>,
}

// SAFETY: all raw pointers target nodes kept alive by `shared`; the
// consumer role may migrate between threads as long as only one thread
// uses it at a time, which `&mut self` methods already enforce.
unsafe impl Send for EventQueue {}

impl EventQueue {
    /// Spawn the reader thread against `transport` and return the
    /// consumer handle.
    ///
    /// # Errors
    ///
    /// Returns `PumpError::ReaderSpawnFailed` if the OS refuses the
    /// thread.
    pub fn start(
        transport: Arc<dyn Transport>,
        wake_hook: Option<WakeupHook>,
    ) -> Result<Self, PumpError> {
        let (shared, seed) = Shared::new_seeded();
        let producer = Producer {
            shared: Arc::clone(&shared),
            tail: seed,
            pool_index: 1,
            free_nodes: POOL_SIZE - 1,
        };
        let reader_transport = Arc::clone(&transport);
        let reader = std::thread::Builder::new()
            .name("wirepump-reader".into())
            .spawn(move || run_reader(producer, reader_transport, wake_hook))
            .map_err(PumpError::ReaderSpawnFailed)?;
        Ok(Self {
            shared,
            transport: Some(transport),
            head: seed,
            flushed_tail: seed,
            input_backlog: VecDeque::new(),
            peekers: HashMap::new(),
            peeker_id_source: 0,
            peeker_cache_dirty: false,
            reader: Some(reader),
        })
    }

    /// Queue with no reader thread attached; tests drive the producer
    /// half directly.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, Producer) {
        let (shared, seed) = Shared::new_seeded();
        let producer = Producer {
            shared: Arc::clone(&shared),
            tail: seed,
            pool_index: 1,
            free_nodes: POOL_SIZE - 1,
        };
        let queue = Self {
            shared,
            transport: None,
            head: seed,
            flushed_tail: seed,
            input_backlog: VecDeque::new(),
            peekers: HashMap::new(),
            peeker_id_source: 0,
            peeker_cache_dirty: false,
            reader: None,
        };
        (queue, producer)
    }

    pub fn is_empty(&self) -> bool {
        // SAFETY: head is within the consumer's partition of the list.
        self.head == self.flushed_tail
            && unsafe { &*self.head.as_ref().record.get() }.is_none()
    }

    /// Re-read the published tail, widening the window the consumer may
    /// visit. Establishes the upper bound for every subsequent take or
    /// peek until called again.
    pub fn flush_buffered(&mut self) {
        let tail = self.shared.tail.load(Ordering::Acquire);
        // SAFETY: tail is seeded non-null before the reader starts.
        self.flushed_tail = unsafe { NonNull::new_unchecked(tail) };
    }

    /// Pop the first pending record within the flushed window.
    ///
    /// `DrainMode::ExcludeUserInput` sidetracks input records into a
    /// holding buffer instead of returning them; a later `All` take
    /// returns those first.
    pub fn take_first(&mut self, mode: DrainMode) -> Option<EventRecord> {
        match mode {
            DrainMode::ExcludeUserInput => {
                while let Some(record) = self.take_any() {
                    if record.is_user_input() {
                        self.input_backlog.push_back(record);
                        continue;
                    }
                    return Some(record);
                }
                None
            }
            DrainMode::All => {
                if let Some(record) = self.input_backlog.pop_front() {
                    return Some(record);
                }
                self.take_any()
            }
        }
    }

    fn take_any(&mut self) -> Option<EventRecord> {
        if self.is_empty() {
            return None;
        }
        let record = loop {
            // SAFETY: head is within the consumer's partition.
            let taken = unsafe { (*self.head.as_ref().record.get()).take() };
            if self.head == self.flushed_tail {
                // The boundary node must stay linked until the next
                // flush takes a wider tail snapshot; its record was
                // cleared in place above.
                break taken;
            }
            self.dequeue_node();
            if taken.is_some() {
                break taken;
            }
            // Node was emptied by a peeker; keep looking.
            if self.is_empty() {
                break None;
            }
        };
        self.peeker_cache_dirty = true;
        record
    }

    fn dequeue_node(&mut self) {
        let node = self.head;
        // SAFETY: head != flushed_tail, so this node's `next` was
        // written before the tail publish that made flushed_tail
        // visible.
        let next = unsafe { node.as_ref() }.next.load(Ordering::Acquire);
        debug_assert!(!next.is_null());
        self.head = unsafe { NonNull::new_unchecked(next) };
        self.release_node(NodeRef(node));
    }

    fn release_node(&mut self, node: NodeRef) {
        // SAFETY: the handle guarantees this node is unlinked and
        // released exactly once. Heap nodes come from Box::into_raw in
        // Producer::acquire.
        if unsafe { node.0.as_ref() }.from_heap {
            drop(unsafe { Box::from_raw(node.0.as_ptr()) });
        } else {
            self.shared.restored.fetch_add(1, Ordering::Release);
        }
    }

    /// Scan pending records without disturbing non-matching ones.
    ///
    /// Flushes first, then visits records from the head to the flushed
    /// tail in order. What happens on a match depends on `mode`; see
    /// [`PeekMode`]. Returns the matched record (a copy in `Retain`
    /// mode), or `None` if nothing matched — always `None` in
    /// `RemoveContinue` mode.
    pub fn peek<F>(&mut self, mode: PeekMode, mut predicate: F) -> Option<EventRecord>
    where
        F: FnMut(&EventRecord) -> bool,
    {
        self.flush_buffered();
        if self.is_empty() {
            return None;
        }
        let (result, _) = self.scan_from(self.head, mode, &mut predicate);
        result
    }

    /// Like [`peek`](Self::peek) in `Retain` mode, but only reports
    /// whether a match exists. Used on hot paths (coalescing) where the
    /// record itself is not needed.
    pub fn peek_match<F>(&mut self, mut predicate: F) -> bool
    where
        F: FnMut(&EventRecord) -> bool,
    {
        self.flush_buffered();
        if self.is_empty() {
            return false;
        }
        let mut node = self.head;
        loop {
            // SAFETY: the scan never follows `next` past flushed_tail.
            if let Some(record) = unsafe { &*node.as_ref().record.get() } {
                if predicate(record) {
                    return true;
                }
            }
            if node == self.flushed_tail {
                return false;
            }
            node = unsafe {
                NonNull::new_unchecked(node.as_ref().next.load(Ordering::Acquire))
            };
        }
    }

    /// Register a peeker cursor. Each cursor remembers how far it has
    /// scanned, so repeated peeks resume instead of rescanning from the
    /// head.
    pub fn generate_peeker_id(&mut self) -> PeekerId {
        let id = PeekerId(self.peeker_id_source);
        self.peeker_id_source += 1;
        self.peekers.insert(id, None);
        id
    }

    /// Unregister a cursor. Returns false (and warns) for an unknown
    /// id. Once the last cursor is gone, id allocation restarts from
    /// zero.
    pub fn remove_peeker_id(&mut self, id: PeekerId) -> bool {
        if self.peekers.remove(&id).is_none() {
            tracing::warn!(peeker = id.0, "failed to remove unknown peeker id");
            return false;
        }
        if self.peekers.is_empty() {
            self.peeker_id_source = 0;
            self.peeker_cache_dirty = false;
        }
        true
    }

    /// Scan from a cursor's cached position.
    ///
    /// Returns `None` without scanning when the cursor has already
    /// visited everything currently flushed. An unknown id warns and
    /// matches nothing.
    pub fn peek_from<F>(&mut self, id: PeekerId, mode: PeekMode, mut predicate: F) -> Option<EventRecord>
    where
        F: FnMut(&EventRecord) -> bool,
    {
        if !self.peekers.contains_key(&id) {
            tracing::warn!(peeker = id.0, "peek with unknown peeker id");
            return None;
        }
        if self.peeker_cache_dirty {
            // A take has unlinked nodes since the last scan; every
            // cached position may dangle, so restart all cursors.
            for cached in self.peekers.values_mut() {
                *cached = None;
            }
            self.peeker_cache_dirty = false;
        }
        self.flush_buffered();
        if self.is_empty() {
            return None;
        }
        let start = match self.peekers.get(&id).copied().flatten() {
            None => self.head,
            Some(cached) if cached == self.flushed_tail => return None, // nothing new
            // SAFETY: the cached node is at or before the previous
            // flushed tail and was not unlinked (the dirty flag above
            // catches that), so `next` is published and non-null.
            Some(cached) => unsafe {
                NonNull::new_unchecked(cached.as_ref().next.load(Ordering::Acquire))
            },
        };
        let (result, stopped_at) = self.scan_from(start, mode, &mut predicate);
        if let Some(slot) = self.peekers.get_mut(&id) {
            *slot = Some(stopped_at);
        }
        result
    }

    /// Walk `[start, flushed_tail]`, applying `mode` to matches.
    /// Returns the scan result and the node the scan stopped at.
    fn scan_from<F>(
        &mut self,
        start: NonNull<EventNode>,
        mode: PeekMode,
        predicate: &mut F,
    ) -> (Option<EventRecord>, NonNull<EventNode>)
    where
        F: FnMut(&EventRecord) -> bool,
    {
        let mut node = start;
        loop {
            // SAFETY: the scan stays within the consumer's partition;
            // record slots in it are only touched by this thread.
            let matched = match unsafe { &*node.as_ref().record.get() } {
                Some(record) => predicate(record),
                None => false,
            };
            if matched {
                let slot = unsafe { &mut *node.as_ref().record.get() };
                match mode {
                    PeekMode::Retain => return (slot.clone(), node),
                    PeekMode::Remove => return (slot.take(), node),
                    PeekMode::RemoveContinue => {
                        // Emptied in place; the node itself is unlinked
                        // by a later take.
                        let _ = slot.take();
                    }
                }
            }
            if node == self.flushed_tail {
                return (None, node);
            }
            node = unsafe {
                NonNull::new_unchecked(node.as_ref().next.load(Ordering::Acquire))
            };
        }
    }

    /// Block until the reader signals a new enqueue batch or `timeout`
    /// elapses. Returns whether new records became visible.
    ///
    /// Used by synchronous protocols (e.g. a selection transfer
    /// awaiting its reply) that must not run the full dispatch loop
    /// while they wait.
    pub fn wait_for_new_events(&mut self, timeout: Duration) -> bool {
        let shared = Arc::clone(&self.shared);
        let guard = shared.wake_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let before = self.flushed_tail;
        self.flush_buffered();
        if before != self.flushed_tail {
            // An append already happened since the last flush.
            return true;
        }
        let (_guard, _timed_out) = shared
            .wake_cond
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        self.flush_buffered();
        before != self.flushed_tail
    }

    /// Whether the reader observed a transport failure. Checked by the
    /// dispatcher at the top of each drain cycle; queue operations
    /// themselves never report it.
    pub fn connection_broken(&self) -> bool {
        self.shared.broken.load(Ordering::Acquire)
    }

    /// Number of times the pool fell back to the heap. Diagnostic only.
    pub fn heap_nodes(&self) -> u64 {
        self.shared.heap_nodes.load(Ordering::Relaxed)
    }

    /// Stop the reader thread and wait for it to exit. Safe to call
    /// more than once; `Drop` calls it as well.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.reader.take() {
            self.shared.stop.store(true, Ordering::Release);
            if let Some(transport) = &self.transport {
                transport.interrupt();
            }
            if handle.join().is_err() {
                tracing::warn!("event reader panicked during shutdown");
            }
        }
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        // The reader must be fully stopped before queue memory goes
        // away; it holds raw pointers into the pool.
        self.shutdown();
        self.flush_buffered();
        // Undelivered records are freed, not dispatched.
        while self.take_first(DrainMode::All).is_some() {}
        // One empty node always stays linked as the deferred boundary.
        // Pool nodes die with the arena; a heap boundary node is freed
        // here.
        if unsafe { self.head.as_ref() }.from_heap {
            // SAFETY: the deferred node is unlinked from everything
            // else and cannot be reached again.
            drop(unsafe { Box::from_raw(self.head.as_ptr()) });
        }
        tracing::debug!(heap_nodes = self.heap_nodes(), "event queue dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirepump_proto::{records, PropertyEvent, RecordKind};

    fn drain_all(queue: &mut EventQueue) -> Vec<EventRecord> {
        queue.flush_buffered();
        let mut out = Vec::new();
        while let Some(record) = queue.take_first(DrainMode::All) {
            out.push(record);
        }
        out
    }

    #[test]
    fn records_come_out_in_arrival_order() {
        let (mut queue, mut producer) = EventQueue::detached();
        for atom in 0..10u32 {
            producer.enqueue(records::property_notify(1, atom, 1, 0));
        }
        let drained = drain_all(&mut queue);
        let atoms: Vec<u32> = drained
            .iter()
            .map(|r| PropertyEvent::from_record(r).expect("property").atom)
            .collect();
        assert_eq!(atoms, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn take_on_an_empty_queue_is_none() {
        let (mut queue, _producer) = EventQueue::detached();
        queue.flush_buffered();
        assert!(queue.is_empty());
        assert!(queue.take_first(DrainMode::All).is_none());
    }

    #[test]
    fn boundary_node_is_cleared_in_place_and_reused() {
        let (mut queue, mut producer) = EventQueue::detached();
        producer.enqueue(records::expose(1, 0, 0, 8, 8, 0));
        queue.flush_buffered();

        // Single record: head == flushed_tail, so the take must clear
        // in place rather than unlink.
        assert!(queue.take_first(DrainMode::All).is_some());
        assert!(queue.is_empty());
        assert_eq!(queue.head, queue.flushed_tail);

        // The deferred node is dequeued once the window widens again.
        producer.enqueue(records::expose(2, 0, 0, 8, 8, 0));
        queue.flush_buffered();
        let record = queue.take_first(DrainMode::All).expect("second record");
        assert_eq!(record.window(), Some(2));
    }

    #[test]
    fn pool_covers_bursts_up_to_capacity() {
        let (mut queue, mut producer) = EventQueue::detached();
        // One pool node is spent seeding the list.
        for _ in 0..POOL_SIZE - 1 {
            producer.enqueue(records::motion(1, 0, 0, 1));
        }
        assert_eq!(queue.heap_nodes(), 0);

        producer.enqueue(records::motion(1, 0, 0, 1));
        assert_eq!(queue.heap_nodes(), 1);

        // Draining restores the pool; the next burst of full capacity
        // stays off the heap.
        assert_eq!(drain_all(&mut queue).len(), POOL_SIZE);
        for _ in 0..POOL_SIZE {
            producer.enqueue(records::motion(1, 0, 0, 1));
        }
        assert_eq!(queue.heap_nodes(), 1);
        assert_eq!(drain_all(&mut queue).len(), POOL_SIZE);
    }

    #[test]
    fn retain_peek_is_non_destructive() {
        let (mut queue, mut producer) = EventQueue::detached();
        producer.enqueue(records::expose(1, 0, 0, 8, 8, 0));
        producer.enqueue(records::property_notify(2, 40, 1, 0));
        producer.enqueue(records::expose(3, 0, 0, 8, 8, 0));

        for _ in 0..3 {
            let found = queue.peek(PeekMode::Retain, |r| {
                r.kind() == RecordKind::PropertyNotify
            });
            assert_eq!(found.expect("match").window(), Some(2));
        }
        // Everything still arrives, in order.
        let windows: Vec<_> = drain_all(&mut queue)
            .iter()
            .map(|r| r.window())
            .collect();
        assert_eq!(windows, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn remove_peek_extracts_a_single_record() {
        let (mut queue, mut producer) = EventQueue::detached();
        producer.enqueue(records::expose(1, 0, 0, 8, 8, 0));
        producer.enqueue(records::property_notify(2, 40, 1, 0));

        let removed = queue.peek(PeekMode::Remove, |r| {
            r.kind() == RecordKind::PropertyNotify
        });
        assert_eq!(removed.expect("match").window(), Some(2));

        let leftover: Vec<_> = drain_all(&mut queue).iter().map(|r| r.window()).collect();
        assert_eq!(leftover, vec![Some(1)]);
    }

    #[test]
    fn remove_continue_sweeps_every_match() {
        let (mut queue, mut producer) = EventQueue::detached();
        producer.enqueue(records::motion(1, 0, 0, 1));
        producer.enqueue(records::expose(1, 0, 0, 8, 8, 0));
        producer.enqueue(records::motion(1, 5, 5, 2));
        producer.enqueue(records::motion(1, 9, 9, 3));

        let mut seen = 0;
        let result = queue.peek(PeekMode::RemoveContinue, |r| {
            let matched = r.kind() == RecordKind::Motion;
            if matched {
                seen += 1;
            }
            matched
        });
        assert!(result.is_none());
        assert_eq!(seen, 3);

        let kinds: Vec<_> = drain_all(&mut queue).iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec![RecordKind::Expose]);
    }

    #[test]
    fn cached_cursor_agrees_with_a_fresh_scan() {
        let (mut queue, mut producer) = EventQueue::detached();
        producer.enqueue(records::expose(1, 0, 0, 8, 8, 0));
        producer.enqueue(records::property_notify(2, 40, 1, 0));
        producer.enqueue(records::expose(3, 0, 0, 8, 8, 0));

        let cursor = queue.generate_peeker_id();
        let is_property = |r: &EventRecord| r.kind() == RecordKind::PropertyNotify;

        let cached = queue.peek_from(cursor, PeekMode::Retain, is_property);
        let fresh = queue.peek(PeekMode::Retain, is_property);
        assert_eq!(cached, fresh);
        assert_eq!(cached.expect("match").window(), Some(2));

        // The cursor resumed past the match: nothing new to report.
        assert!(queue.peek_from(cursor, PeekMode::Retain, is_property).is_none());

        // After a take invalidates the cache the cursor rescans from
        // the head and finds the record again.
        queue.flush_buffered();
        let first = queue.take_first(DrainMode::All).expect("expose 1");
        assert_eq!(first.window(), Some(1));
        let rescan = queue.peek_from(cursor, PeekMode::Retain, is_property);
        assert_eq!(rescan.expect("match").window(), Some(2));

        assert!(queue.remove_peeker_id(cursor));
    }

    #[test]
    fn two_cursors_and_a_removal() {
        let (mut queue, mut producer) = EventQueue::detached();
        producer.enqueue(records::property_notify(9, 40, 1, 0));

        let a = queue.generate_peeker_id();
        let b = queue.generate_peeker_id();
        let is_property = |r: &EventRecord| r.kind() == RecordKind::PropertyNotify;

        assert!(queue.peek_from(a, PeekMode::Retain, is_property).is_some());
        assert!(queue.peek_from(b, PeekMode::Retain, is_property).is_some());

        // A removes the record through an uncached scan; B sees nothing
        // afterwards, with no flush in between.
        assert!(queue.peek(PeekMode::Remove, is_property).is_some());
        assert!(queue.peek_from(b, PeekMode::Retain, is_property).is_none());
        assert!(queue.peek(PeekMode::Retain, is_property).is_none());
    }

    #[test]
    fn peeker_ids_restart_once_all_are_removed() {
        let (mut queue, _producer) = EventQueue::detached();
        let first = queue.generate_peeker_id();
        let second = queue.generate_peeker_id();
        assert_ne!(first, second);

        assert!(queue.remove_peeker_id(first));
        assert!(queue.remove_peeker_id(second));
        // Unknown id: refused.
        assert!(!queue.remove_peeker_id(second));

        let reused = queue.generate_peeker_id();
        assert_eq!(reused, first);
    }

    #[test]
    fn excluded_user_input_is_returned_later_in_order() {
        let (mut queue, mut producer) = EventQueue::detached();
        producer.enqueue(records::motion(1, 0, 0, 1));
        producer.enqueue(records::expose(2, 0, 0, 8, 8, 0));
        producer.enqueue(records::key_press(3, 38, 2));
        queue.flush_buffered();

        let record = queue
            .take_first(DrainMode::ExcludeUserInput)
            .expect("non-input record");
        assert_eq!(record.kind(), RecordKind::Expose);
        assert!(queue.take_first(DrainMode::ExcludeUserInput).is_none());

        // Diverted input records come back first, in arrival order.
        let kinds: Vec<_> = drain_all(&mut queue).iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec![RecordKind::Motion, RecordKind::KeyPress]);
    }

    #[test]
    fn wait_returns_immediately_when_appends_are_pending() {
        let (mut queue, mut producer) = EventQueue::detached();
        producer.enqueue(records::expose(1, 0, 0, 8, 8, 0));
        assert!(queue.wait_for_new_events(Duration::from_millis(1)));
    }

    #[test]
    fn wait_times_out_on_a_silent_queue() {
        let (mut queue, _producer) = EventQueue::detached();
        assert!(!queue.wait_for_new_events(Duration::from_millis(20)));
    }

    #[test]
    fn wait_wakes_on_the_producer_signal() {
        let (mut queue, producer) = EventQueue::detached();
        let handle = std::thread::spawn(move || {
            let mut producer = producer;
            std::thread::sleep(Duration::from_millis(30));
            let shared = Arc::clone(&producer.shared);
            let _guard = shared.wake_lock.lock().unwrap();
            producer.enqueue(records::expose(1, 0, 0, 8, 8, 0));
            shared.wake_cond.notify_all();
        });
        assert!(queue.wait_for_new_events(Duration::from_secs(5)));
        handle.join().expect("producer thread");
        assert!(queue.take_first(DrainMode::All).is_some());
    }

    #[test]
    fn cross_thread_handoff_preserves_order() {
        let (mut queue, producer) = EventQueue::detached();
        const COUNT: u32 = 5_000;
        let handle = std::thread::spawn(move || {
            let mut producer = producer;
            for atom in 0..COUNT {
                producer.enqueue(records::property_notify(7, atom, 1, 0));
                if atom % 256 == 0 {
                    std::thread::yield_now();
                }
            }
        });

        let mut expected = 0u32;
        while expected < COUNT {
            queue.flush_buffered();
            match queue.take_first(DrainMode::All) {
                Some(record) => {
                    let atom = PropertyEvent::from_record(&record).expect("property").atom;
                    assert_eq!(atom, expected);
                    expected += 1;
                }
                None => std::thread::yield_now(),
            }
        }
        handle.join().expect("producer thread");
    }
}
