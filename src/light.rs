use std::{
  sync::{
    atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
    Arc, Mutex,
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use log::{debug, trace, warn};
use rand::Rng;
use stoplight_utils::thread::BlockingQueue;

use crate::{config::CycleConfig, error::LightError};

/// Upper bound on how long the timer loop sleeps before re-checking the stop
/// flag while waiting out a cycle.
const STOP_POLL: Duration = Duration::from_millis(10);

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
  Red = 0,
  Green = 1,
}

impl Phase {
  pub fn toggle(self) -> Self {
    match self {
      Phase::Red => Phase::Green,
      Phase::Green => Phase::Red,
    }
  }

  fn from_u8(value: u8) -> Self {
    match value {
      0 => Phase::Red,
      _ => Phase::Green,
    }
  }
}

struct Shared {
  phase: AtomicU8,
  stop: AtomicBool,
  next_waiter: AtomicU64,
  waiters: Mutex<Vec<(u64, BlockingQueue<Phase>)>>,
}

impl Shared {
  fn phase(&self) -> Phase {
    Phase::from_u8(self.phase.load(Ordering::Relaxed))
  }

  // The stop flag is only ever set while the waiter lock is held, so a
  // mailbox registered here is guaranteed to be closed during teardown.
  fn register(&self, mailbox: BlockingQueue<Phase>) -> Result<u64, LightError> {
    let mut waiters = self.waiters.lock().unwrap();
    if self.stop.load(Ordering::Relaxed) {
      return Err(LightError::Stopped);
    }

    let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
    waiters.push((id, mailbox));
    Ok(id)
  }

  fn deregister(&self, id: u64) {
    let mut waiters = self.waiters.lock().unwrap();
    waiters.retain(|(waiter, _)| *waiter != id);
  }

  fn publish(&self, phase: Phase) {
    let waiters = self.waiters.lock().unwrap();
    for (_, mailbox) in waiters.iter() {
      mailbox.send(phase);
    }
  }
}

/// A two-phase traffic light that flips between red and green on a randomized
/// interval drawn from its [`CycleConfig`].
///
/// The light starts out red and idle. [`TrafficLight::start`] spawns the timer
/// loop; [`TrafficLight::stop`] (also run on drop) tears it down and releases
/// every pending waiter.
pub struct TrafficLight {
  shared: Arc<Shared>,
  config: CycleConfig,
  timer: Mutex<Option<JoinHandle<()>>>,
}

impl TrafficLight {
  pub fn new() -> Self {
    Self::with_config(CycleConfig::default())
  }

  pub fn with_config(config: CycleConfig) -> Self {
    Self {
      shared: Arc::new(Shared {
        phase: AtomicU8::new(Phase::Red as u8),
        stop: AtomicBool::new(false),
        next_waiter: AtomicU64::new(0),
        waiters: Mutex::new(Vec::new()),
      }),
      config,
      timer: Mutex::new(None),
    }
  }

  /// Snapshot of the current phase. Never blocks and never observes a torn
  /// value.
  pub fn current_phase(&self) -> Phase {
    self.shared.phase()
  }

  /// Spawns the timer loop. Fails with [`LightError::AlreadyRunning`] if the
  /// loop is already live and [`LightError::Stopped`] after teardown.
  pub fn start(&self) -> Result<(), LightError> {
    let mut timer = self.timer.lock().unwrap();
    if timer.is_some() {
      return Err(LightError::AlreadyRunning);
    }
    if self.shared.stop.load(Ordering::Relaxed) {
      return Err(LightError::Stopped);
    }

    debug!("Starting traffic light cycle");
    let shared = self.shared.clone();
    let config = self.config.clone();
    *timer = Some(thread::spawn(move || cycle(&shared, &config)));
    Ok(())
  }

  /// Blocks until the light flips to green.
  ///
  /// The wait is edge-triggered: a call made while the light is already green
  /// still blocks until the next red-to-green transition. Returns
  /// [`LightError::Stopped`] if the light is torn down while waiting.
  pub fn wait_for_green(&self) -> Result<(), LightError> {
    let mailbox = BlockingQueue::new();
    let id = self
      .shared
      .register(BlockingQueue::clone_inner(&mailbox))?;

    loop {
      match mailbox.recv() {
        Some(Phase::Green) => {
          self.shared.deregister(id);
          return Ok(());
        }
        Some(Phase::Red) => continue,
        None => {
          self.shared.deregister(id);
          return Err(LightError::Stopped);
        }
      }
    }
  }

  /// Tears the light down: stops the timer loop, releases every pending
  /// waiter with [`LightError::Stopped`] and joins the timer thread.
  /// Idempotent; a stopped light cannot be restarted.
  pub fn stop(&self) {
    {
      let mut waiters = self.shared.waiters.lock().unwrap();
      self.shared.stop.store(true, Ordering::Relaxed);
      for (_, mailbox) in waiters.drain(..) {
        mailbox.close();
      }
    }

    if let Some(timer) = self.timer.lock().unwrap().take() {
      debug!("Stopping traffic light cycle");
      if timer.join().is_err() {
        warn!("Traffic light timer thread panicked");
      }
    }
  }
}

impl Default for TrafficLight {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for TrafficLight {
  fn drop(&mut self) {
    self.stop();
  }
}

fn cycle(shared: &Shared, config: &CycleConfig) {
  debug_assert!(config.min < config.max);

  let mut rng = rand::rng();
  let min = config.min.as_millis() as u64;
  let max = config.max.as_millis() as u64;

  let mut duration = Duration::from_millis(rng.random_range(min..max));
  let mut last_flip = Instant::now();

  loop {
    if shared.stop.load(Ordering::Relaxed) {
      break;
    }

    let elapsed = last_flip.elapsed();
    if elapsed < duration {
      thread::sleep(STOP_POLL.min(duration - elapsed));
      continue;
    }

    let phase = shared.phase().toggle();
    shared.phase.store(phase as u8, Ordering::Relaxed);
    shared.publish(phase);
    trace!("Phase flipped to {:?} after {:?}", phase, elapsed);

    last_flip = Instant::now();
    duration = Duration::from_millis(rng.random_range(min..max));
  }
}

#[cfg(test)]
mod test {
  use std::sync::atomic::Ordering;
  use std::sync::Arc;
  use std::thread;
  use std::time::{Duration, Instant};

  use stoplight_utils::thread::BlockingQueue;

  use super::{Phase, TrafficLight};
  use crate::config::CycleConfig;
  use crate::error::LightError;

  fn fast_config() -> CycleConfig {
    CycleConfig {
      min: Duration::from_millis(30),
      max: Duration::from_millis(60),
    }
  }

  #[test]
  fn starts_red_and_idle() {
    let light = TrafficLight::new();
    assert_eq!(light.current_phase(), Phase::Red);
  }

  #[test]
  fn toggle_alternates() {
    assert_eq!(Phase::Red.toggle(), Phase::Green);
    assert_eq!(Phase::Green.toggle(), Phase::Red);
  }

  #[test]
  fn double_start_fails() {
    let light = TrafficLight::with_config(fast_config());
    light.start().unwrap();
    assert_eq!(light.start(), Err(LightError::AlreadyRunning));
  }

  #[test]
  fn start_after_stop_fails() {
    let light = TrafficLight::with_config(fast_config());
    light.start().unwrap();
    light.stop();
    assert_eq!(light.start(), Err(LightError::Stopped));
  }

  #[test]
  fn wait_for_green_observes_green_phase() {
    let light = TrafficLight::with_config(fast_config());
    light.start().unwrap();

    light.wait_for_green().unwrap();
    assert_eq!(light.current_phase(), Phase::Green);
  }

  #[test]
  fn all_waiters_release_on_one_green() {
    let light = Arc::new(TrafficLight::with_config(fast_config()));
    light.start().unwrap();

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..3 {
      let light = light.clone();
      handles.push(thread::spawn(move || {
        light.wait_for_green().unwrap();
        light.current_phase()
      }));
    }

    for handle in handles {
      assert_eq!(handle.join().unwrap(), Phase::Green);
    }
    assert!(start.elapsed() < Duration::from_millis(500));
  }

  #[test]
  fn wait_for_green_is_edge_triggered() {
    let light = TrafficLight::with_config(fast_config());
    light.shared.phase.store(Phase::Green as u8, Ordering::Relaxed);

    // already green at call time: the wait must span the full
    // green -> red -> green sequence instead of returning on the current state
    let start = Instant::now();
    light.start().unwrap();
    light.wait_for_green().unwrap();
    assert!(start.elapsed() >= Duration::from_millis(60));
    assert_eq!(light.current_phase(), Phase::Green);
  }

  #[test]
  fn published_phases_alternate() {
    let light = TrafficLight::with_config(fast_config());
    let mailbox = BlockingQueue::new();
    light
      .shared
      .register(BlockingQueue::clone_inner(&mailbox))
      .unwrap();
    light.start().unwrap();

    let seen: Vec<Phase> = (0..6).map(|_| mailbox.recv().unwrap()).collect();
    assert_eq!(seen[0], Phase::Green);
    for pair in seen.windows(2) {
      assert_ne!(pair[0], pair[1]);
    }
  }

  #[test]
  fn cycle_durations_stay_in_range() {
    let light = TrafficLight::with_config(CycleConfig {
      min: Duration::from_millis(40),
      max: Duration::from_millis(80),
    });
    let mailbox = BlockingQueue::new();
    light
      .shared
      .register(BlockingQueue::clone_inner(&mailbox))
      .unwrap();

    let mut last = Instant::now();
    light.start().unwrap();

    for _ in 0..5 {
      mailbox.recv().unwrap();
      let gap = last.elapsed();
      last = Instant::now();
      assert!(gap >= Duration::from_millis(40), "cycle was {:?}", gap);
      // upper bound plus scheduling slack
      assert!(gap < Duration::from_millis(200), "cycle was {:?}", gap);
    }
  }

  #[test]
  fn stop_releases_pending_waiter() {
    // cycles far longer than the test so no green can sneak in before stop
    let light = Arc::new(TrafficLight::with_config(CycleConfig {
      min: Duration::from_secs(5),
      max: Duration::from_secs(10),
    }));
    light.start().unwrap();

    let waiter = light.clone();
    let handle = thread::spawn(move || waiter.wait_for_green());

    thread::sleep(Duration::from_millis(10));
    light.stop();
    assert_eq!(handle.join().unwrap(), Err(LightError::Stopped));
  }

  #[test]
  fn stop_is_idempotent() {
    let light = TrafficLight::with_config(fast_config());
    light.start().unwrap();
    light.stop();
    light.stop();
  }

  #[test]
  fn drop_joins_timer_thread() {
    let light = TrafficLight::with_config(fast_config());
    light.start().unwrap();
    drop(light);
  }
}
