use parking_lot::Mutex;
use std::collections::HashMap;
use tierq_core::metrics::TRACKER_EVICTIONS;
use tierq_core::{CoreError, CoreResult};

/// Slot in the recency list. Links are slab indices.
#[derive(Debug)]
struct Node {
    name: String,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly linked recency list stored in a slab, head = least recently used.
#[derive(Debug)]
struct RecencyList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl RecencyList {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity + 1),
            free: Vec::new(),
            index: HashMap::with_capacity(capacity + 1),
            head: None,
            tail: None,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn alloc(&mut self, name: String) -> usize {
        let node = Node {
            name,
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[slot].prev = None;
        self.nodes[slot].next = None;
    }

    fn push_back(&mut self, slot: usize) {
        self.nodes[slot].prev = self.tail;
        self.nodes[slot].next = None;
        match self.tail {
            Some(t) => self.nodes[t].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }

    /// Moves `name` to the most-recent end, inserting it if absent.
    fn touch(&mut self, name: &str) {
        if let Some(&slot) = self.index.get(name) {
            if self.tail != Some(slot) {
                self.unlink(slot);
                self.push_back(slot);
            }
            return;
        }

        let slot = self.alloc(name.to_string());
        self.push_back(slot);
        self.index.insert(name.to_string(), slot);
    }

    fn pop_front(&mut self) -> Option<String> {
        let slot = self.head?;
        self.unlink(slot);
        let name = std::mem::take(&mut self.nodes[slot].name);
        self.index.remove(&name);
        self.free.push(slot);
        Some(name)
    }

    fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let slot = cursor?;
            cursor = self.nodes[slot].next;
            Some(self.nodes[slot].name.as_str())
        })
    }
}

/// Bounded recency tracker of table names (strict LRU).
///
/// Membership is the promotion candidate set. Eviction only drops hotness
/// tracking; it never touches the registry or table data.
#[derive(Debug)]
pub struct UsageTracker {
    capacity: usize,
    list: Mutex<RecencyList>,
}

impl UsageTracker {
    /// Create an empty tracker holding at most `capacity` names.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if `capacity` is zero.
    pub fn new(capacity: usize) -> CoreResult<Self> {
        if capacity == 0 {
            return Err(CoreError::Validation(
                "usage tracker capacity must be > 0".to_string(),
            ));
        }

        Ok(Self {
            capacity,
            list: Mutex::new(RecencyList::with_capacity(capacity)),
        })
    }

    /// Marks `name` as most recently used and returns the evicted name, if any.
    pub fn touch(&self, name: &str) -> Option<String> {
        let evicted = {
            let mut list = self.list.lock();
            list.touch(name);
            if list.len() > self.capacity {
                list.pop_front()
            } else {
                None
            }
        };

        if let Some(evicted) = &evicted {
            TRACKER_EVICTIONS.inc();
            tracing::debug!(table = %evicted, "Evicted from usage tracker");
        }
        evicted
    }

    /// Membership probe; does not change recency order.
    pub fn contains(&self, name: &str) -> bool {
        self.list.lock().index.contains_key(name)
    }

    /// Current members ordered from least to most recently used.
    pub fn hot_set(&self) -> Vec<String> {
        self.list.lock().iter().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.list.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
