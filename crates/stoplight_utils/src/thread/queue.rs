use std::sync::{Arc, Condvar, Mutex};

struct State<T> {
  items: Vec<T>,
  closed: bool,
}

/// Unbounded thread-safe mailbox with blocking receive.
///
/// Delivery is newest-first: `recv` pops the most recently sent item. With a
/// single producer and consumers that drain promptly this is indistinguishable
/// from arrival order.
pub struct BlockingQueue<T> {
  state: Arc<(Mutex<State<T>>, Condvar)>,
}

impl<T> BlockingQueue<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends `item` and wakes one waiting receiver. Never blocks beyond lock
  /// contention. Sends into a closed queue are discarded.
  pub fn send(&self, item: T) {
    let (lock, cvar) = &*self.state;
    let mut state = lock.lock().unwrap();
    if state.closed {
      return;
    }
    state.items.push(item);
    cvar.notify_one();
  }

  /// Blocks until an item is available and returns the newest one. Returns
  /// `None` once the queue is closed and drained.
  pub fn recv(&self) -> Option<T> {
    let (lock, cvar) = &*self.state;
    let state = lock.lock().unwrap();
    let mut state = cvar
      .wait_while(state, |state| state.items.is_empty() && !state.closed)
      .unwrap();
    state.items.pop()
  }

  /// Closes the queue and wakes every waiting receiver. Items already sent
  /// stay receivable. Idempotent.
  pub fn close(&self) {
    let (lock, cvar) = &*self.state;
    lock.lock().unwrap().closed = true;
    cvar.notify_all();
  }

  pub fn is_closed(&self) -> bool {
    let (lock, _) = &*self.state;
    lock.lock().unwrap().closed
  }

  pub fn len(&self) -> usize {
    let (lock, _) = &*self.state;
    lock.lock().unwrap().items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clone_inner(queue: &BlockingQueue<T>) -> BlockingQueue<T> {
    BlockingQueue {
      state: Arc::clone(&queue.state),
    }
  }
}

impl<T> Default for BlockingQueue<T> {
  fn default() -> Self {
    Self {
      state: Arc::new((
        Mutex::new(State {
          items: Vec::new(),
          closed: false,
        }),
        Condvar::new(),
      )),
    }
  }
}

impl<T> Clone for BlockingQueue<T> {
  fn clone(&self) -> Self {
    Self::clone_inner(self)
  }
}
