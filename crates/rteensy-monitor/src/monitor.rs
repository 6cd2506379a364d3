//! Monitor driver
//!
//! Reconciles asynchronous USB hotplug events into a stable view of
//! logical boards. Device notifications can be missed or arrive out of
//! order, so board identity is checked heuristically on every add; a
//! board whose interfaces all disappear is kept for a grace period
//! before it is dropped for good.

use std::collections::{HashMap, VecDeque};
use std::ops::ControlFlow;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bitflags::bitflags;

use rteensy_core::{Capabilities, Capability};

use crate::board::{lock, Board, BoardStatus, Event};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::iface::Interface;
use crate::platform::{adjust_timeout, DescriptorSet, DeviceStatus, Platform, Timer, UsbDevice};

/// Grace period before a missing board is dropped
const DROP_BOARD_DELAY_MS: i32 = 15_000;

bitflags! {
    /// Monitor behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MonitorFlags: u32 {
        /// Wait on the refresh condvar instead of polling; for callers
        /// that run `refresh` on a dedicated thread
        const PARALLEL_WAIT = 1 << 0;
    }
}

/// What a callback wants done with its registration after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Keep receiving events
    Keep,
    /// Remove this callback before dispatch continues
    Unregister,
}

type BoardCallback<P> =
    Box<dyn FnMut(&Arc<Board<P>>, Event) -> Result<CallbackAction> + 'static>;

struct CallbackSlot<P: Platform> {
    id: i32,
    func: BoardCallback<P>,
}

struct SignalState {
    generation: Mutex<u64>,
    cond: Condvar,
}

/// Cloneable handle to the monitor's refresh condvar.
///
/// Consumer threads in parallel mode wait on this with their own
/// predicates while a producer thread keeps calling
/// [`Monitor::refresh`]; every successful refresh wakes all waiters.
#[derive(Clone)]
pub struct RefreshSignal {
    shared: Arc<SignalState>,
}

impl RefreshSignal {
    fn new() -> Self {
        Self {
            shared: Arc::new(SignalState {
                generation: Mutex::new(0),
                cond: Condvar::new(),
            }),
        }
    }

    pub(crate) fn notify(&self) {
        let mut generation = lock(&self.shared.generation);
        *generation = generation.wrapping_add(1);
        self.shared.cond.notify_all();
    }

    /// Block until `predicate` returns true or `timeout_ms` elapses
    /// (negative means wait forever). The predicate is re-evaluated
    /// after every refresh broadcast.
    pub fn wait_until(
        &self,
        mut predicate: impl FnMut() -> Result<bool>,
        timeout_ms: i32,
    ) -> Result<bool> {
        let start = Instant::now();
        let mut generation = lock(&self.shared.generation);

        loop {
            if predicate()? {
                return Ok(true);
            }

            if timeout_ms < 0 {
                generation = self
                    .shared
                    .cond
                    .wait(generation)
                    .unwrap_or_else(PoisonError::into_inner);
            } else {
                let elapsed = start.elapsed().as_millis().min(i32::MAX as u128) as i32;
                let remaining = timeout_ms - elapsed;
                if remaining <= 0 {
                    return Ok(false);
                }
                let (guard, _) = self
                    .shared
                    .cond
                    .wait_timeout(generation, Duration::from_millis(remaining as u64))
                    .unwrap_or_else(PoisonError::into_inner);
                generation = guard;
            }
        }
    }
}

struct MonitorState<P: Platform> {
    timer: P::Timer,
    flags: MonitorFlags,
    config: Arc<MonitorConfig>,
    enumerated: bool,
    boards: Vec<Arc<Board<P>>>,
    missing: VecDeque<Arc<Board<P>>>,
    interfaces: HashMap<String, Arc<Board<P>>>,
    callbacks: Vec<CallbackSlot<P>>,
    next_callback_id: i32,
    callback_err: Option<MonitorError>,
    signal: RefreshSignal,
}

/// Tracks boards as their USB interfaces come and go
pub struct Monitor<P: Platform> {
    platform: P,
    state: MonitorState<P>,
}

impl<P: Platform> Monitor<P> {
    /// Create a monitor over `platform`, reading configuration from
    /// the environment
    pub fn new(platform: P, flags: MonitorFlags) -> Result<Self> {
        Self::with_config(platform, flags, MonitorConfig::from_env())
    }

    /// Create a monitor with an explicit configuration record
    pub fn with_config(
        mut platform: P,
        flags: MonitorFlags,
        config: MonitorConfig,
    ) -> Result<Self> {
        let timer = platform.new_timer()?;

        Ok(Self {
            platform,
            state: MonitorState {
                timer,
                flags,
                config: Arc::new(config),
                enumerated: false,
                boards: Vec::new(),
                missing: VecDeque::new(),
                interfaces: HashMap::with_capacity(64),
                callbacks: Vec::new(),
                next_callback_id: 0,
                callback_err: None,
                signal: RefreshSignal::new(),
            },
        })
    }

    /// The underlying platform
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Configuration captured at construction
    pub fn config(&self) -> &MonitorConfig {
        &self.state.config
    }

    /// Handle for parallel waiters
    pub fn refresh_signal(&self) -> RefreshSignal {
        self.state.signal.clone()
    }

    /// Register an event callback; returns its id.
    ///
    /// Callbacks may unregister themselves through their return value;
    /// an error return aborts dispatch and surfaces from the driving
    /// `refresh` call.
    pub fn register_callback<F>(&mut self, func: F) -> i32
    where
        F: FnMut(&Arc<Board<P>>, Event) -> Result<CallbackAction> + 'static,
    {
        let id = self.state.next_callback_id;
        self.state.next_callback_id += 1;
        self.state.callbacks.push(CallbackSlot {
            id,
            func: Box::new(func),
        });
        id
    }

    /// Remove the callback registered under `id`, if still present
    pub fn deregister_callback(&mut self, id: i32) {
        if let Some(pos) = self.state.callbacks.iter().position(|c| c.id == id) {
            self.state.callbacks.remove(pos);
        }
    }

    /// Add the monitor's readiness descriptors to `set`, labeled `tag`
    pub fn get_descriptors(&self, set: &mut DescriptorSet, tag: i32) {
        set.add(self.platform.descriptor(), tag);
        set.add(self.state.timer.descriptor(), tag);
    }

    /// Snapshot of all tracked boards, in insertion order
    pub fn boards(&self) -> Vec<Arc<Board<P>>> {
        self.state.boards.clone()
    }

    /// Find a board by its USB location
    pub fn find_board(&self, location: &str) -> Option<Arc<Board<P>>> {
        self.state.find_board(location)
    }

    /// Find a board by its tag
    pub fn board_by_tag(&self, tag: &str) -> Option<Arc<Board<P>>> {
        self.state
            .boards
            .iter()
            .find(|b| b.tag() == tag)
            .cloned()
    }

    /// Invoke `func(board, Added)` for every online board, in
    /// insertion order
    pub fn list(&self, mut func: impl FnMut(&Arc<Board<P>>, Event) -> ControlFlow<()>) {
        for board in &self.state.boards {
            if board.status() == BoardStatus::Online {
                if let ControlFlow::Break(()) = func(board, Event::Added) {
                    break;
                }
            }
        }
    }

    /// Process pending device notifications and expired grace periods.
    ///
    /// The first call performs a full enumeration; later calls apply
    /// incremental changes. Parallel waiters are woken afterwards.
    pub fn refresh(&mut self) -> Result<()> {
        let now = self.platform.now_ms();

        if self.state.timer.rearm() {
            self.state.expire_missing(now)?;
        }

        let state = &mut self.state;
        let result = if !state.enumerated {
            state.enumerated = true;
            self.platform
                .list(&mut |dev, status| state.handle_device(dev, status, now))
        } else {
            self.platform
                .refresh(&mut |dev, status| state.handle_device(dev, status, now))
        };

        // Surface the callback's own error instead of the platform's
        // translation of "iteration was stopped".
        if let Some(err) = self.state.callback_err.take() {
            return Err(err);
        }
        result?;

        self.state.signal.notify();
        Ok(())
    }

    /// Refresh and poll until `predicate` returns true or the timeout
    /// elapses. Returns whether the predicate was satisfied.
    ///
    /// With [`MonitorFlags::PARALLEL_WAIT`] the poll loop is replaced
    /// by waiting on the refresh condvar; in that mode another thread
    /// is expected to drive [`Monitor::refresh`], typically through a
    /// cloned [`RefreshSignal`] on the consumer side.
    pub fn wait(
        &mut self,
        mut predicate: impl FnMut(&Monitor<P>) -> Result<bool>,
        timeout_ms: i32,
    ) -> Result<bool> {
        let start = self.platform.now_ms();

        if self.state.flags.contains(MonitorFlags::PARALLEL_WAIT) {
            let signal = self.state.signal.clone();
            let this: &Self = self;
            return signal.wait_until(|| predicate(this), timeout_ms);
        }

        let mut set = DescriptorSet::new();
        self.get_descriptors(&mut set, 1);

        loop {
            self.refresh()?;

            if predicate(self)? {
                return Ok(true);
            }

            let remaining = adjust_timeout(timeout_ms, start, self.platform.now_ms());
            let readable = self.platform.poll(&set, remaining)?;
            if readable == 0 {
                return Ok(false);
            }
        }
    }

    /// Wait until `board` exposes `capability`.
    ///
    /// Fails with [`MonitorError::BoardGone`] if the board is dropped
    /// while waiting.
    pub fn wait_for_board(
        &mut self,
        board: &Arc<Board<P>>,
        capability: Capability,
        timeout_ms: i32,
    ) -> Result<bool> {
        self.wait(
            |_| {
                if board.status() == BoardStatus::Dropped {
                    return Err(MonitorError::BoardGone(board.tag().to_string()));
                }
                Ok(board.has_capability(capability))
            },
            timeout_ms,
        )
    }
}

impl<P: Platform> MonitorState<P> {
    fn find_board(&self, location: &str) -> Option<Arc<Board<P>>> {
        self.boards
            .iter()
            .find(|b| b.location() == location)
            .cloned()
    }

    fn handle_device(&mut self, dev: &P::Device, status: DeviceStatus, now: u64) -> bool {
        let result = match status {
            DeviceStatus::Online => self.add_interface(dev),
            DeviceStatus::Disconnected => self.remove_interface(dev, now),
        };

        match result {
            Ok(()) => false,
            Err(err) => {
                self.callback_err = Some(err);
                true
            }
        }
    }

    fn trigger_callbacks(&mut self, board: &Arc<Board<P>>, event: Event) -> Result<()> {
        let mut i = 0;
        while i < self.callbacks.len() {
            match (self.callbacks[i].func)(board, event)? {
                CallbackAction::Keep => i += 1,
                CallbackAction::Unregister => {
                    self.callbacks.remove(i);
                }
            }
        }
        Ok(())
    }

    fn interface_is_compatible(iface: &Interface<P>, board: &Board<P>) -> bool {
        let state = board.state();

        if iface.model().is_real() && state.model.is_real() && iface.model() != state.model {
            return false;
        }
        // A serial exactly 10x the stored one is the same board running
        // pre-workaround firmware, handled during the merge.
        if iface.serial() != 0
            && state.serial != 0
            && iface.serial() != state.serial
            && iface.serial() != 10 * state.serial
        {
            return false;
        }

        true
    }

    fn merge_interface(board: &Arc<Board<P>>, iface: &Interface<P>, dev: &P::Device) {
        let mut state = board.state();
        let family = board.family();

        if iface.model().is_real() {
            state.model = iface.model();

            if state.description.is_empty() {
                state.description = format!("{} ({})", family.name(), iface.name());
            }
        } else {
            state.description = dev.product().unwrap_or(family.name()).to_string();
        }

        if iface.serial() != 0 {
            if state.serial == 0 {
                state.serial = iface.serial();
            } else if iface.serial() == 10 * state.serial {
                log::warn!(
                    "Upgrade board '{}' to use a recent Teensyduino version",
                    board.tag()
                );
            }
        }
    }

    /// Device-online event: classify, find or create the board at the
    /// device's location, merge, and rebuild the capability map.
    fn add_interface(&mut self, dev: &P::Device) -> Result<()> {
        let Some(iface) = Interface::<P>::probe(dev) else {
            return Ok(());
        };

        let mut board = self.find_board(dev.location());

        // Notifications can arrive reordered, and removals are
        // sometimes never delivered at all; a board that no longer
        // matches what sits at its location has to be replaced.
        if let Some(b) = board.clone() {
            if !Self::interface_is_compatible(&iface, &b) {
                log::debug!(
                    "Interface at '{}' is incompatible with board '{}', replacing it",
                    dev.location(),
                    b.tag()
                );
                if b.status() == BoardStatus::Online {
                    self.close_board(&b)?;
                }
                self.drop_board(&b)?;
                board = None;
            }
        }

        let (board, event) = match board {
            Some(board) => {
                if board.vid() != dev.vid() || board.pid() != dev.pid() {
                    if board.status() == BoardStatus::Online {
                        self.close_board(&board)?;
                    }
                    let mut state = board.state();
                    state.vid = dev.vid();
                    state.pid = dev.pid();
                }

                Self::merge_interface(&board, &iface, dev);
                (board, Event::Changed)
            }
            None => {
                let board = Arc::new(Board::new(dev, &iface, self.config.clone()));
                Self::merge_interface(&board, &iface, dev);
                self.boards.push(board.clone());

                log::debug!("Board '{}' added at '{}'", board.tag(), board.location());
                (board, Event::Added)
            }
        };

        let node = iface.node().to_string();
        let capabilities = iface.capabilities();
        {
            let mut guard = board.state();
            let state = &mut *guard;
            let index = state.interfaces.len();

            for cap in Capability::ALL {
                if capabilities.contains(cap.mask()) {
                    state.cap2iface[cap.index()] = Some(index);
                }
            }
            state.capabilities |= capabilities;
            state.interfaces.push(Arc::new(Mutex::new(iface)));
            state.status = BoardStatus::Online;
        }

        self.interfaces.insert(node, board.clone());
        self.missing.retain(|b| !Arc::ptr_eq(b, &board));

        self.trigger_callbacks(&board, event)
    }

    /// Device-disconnected event: detach the interface and rebuild the
    /// capability map from what remains.
    fn remove_interface(&mut self, dev: &P::Device, now: u64) -> Result<()> {
        let Some(board) = self.interfaces.remove(dev.node()) else {
            return Ok(());
        };

        let empty = {
            let mut guard = board.state();
            let state = &mut *guard;

            state.interfaces.retain(|i| lock(i).node() != dev.node());

            state.cap2iface = [None; Capability::COUNT];
            state.capabilities = Capabilities::empty();
            for (index, iface) in state.interfaces.iter().enumerate() {
                let capabilities = lock(iface).capabilities();
                for cap in Capability::ALL {
                    if capabilities.contains(cap.mask()) {
                        state.cap2iface[cap.index()] = Some(index);
                    }
                }
                state.capabilities |= capabilities;
            }

            state.interfaces.is_empty()
        };

        if empty {
            self.close_board(&board)?;
            self.add_missing(&board, now)
        } else {
            self.trigger_callbacks(&board, Event::Changed)
        }
    }

    /// Empty the board and announce its disappearance; the board stays
    /// tracked until its grace period runs out.
    fn close_board(&mut self, board: &Arc<Board<P>>) -> Result<()> {
        let removed = {
            let mut guard = board.state();
            let state = &mut *guard;
            state.cap2iface = [None; Capability::COUNT];
            state.capabilities = Capabilities::empty();
            state.status = BoardStatus::Missing;
            std::mem::take(&mut state.interfaces)
        };

        for iface in &removed {
            let node = lock(iface).node().to_string();
            self.interfaces.remove(&node);
        }

        self.trigger_callbacks(board, Event::Disappeared)
    }

    /// Final removal of a board, after grace expiry or an identity
    /// conflict.
    fn drop_board(&mut self, board: &Arc<Board<P>>) -> Result<()> {
        self.missing.retain(|b| !Arc::ptr_eq(b, board));
        board.state().status = BoardStatus::Dropped;
        self.boards.retain(|b| !Arc::ptr_eq(b, board));

        log::debug!("Board '{}' dropped", board.tag());
        self.trigger_callbacks(board, Event::Dropped)
    }

    /// Queue a freshly missing board and arm the drop timer for the
    /// queue head.
    fn add_missing(&mut self, board: &Arc<Board<P>>, now: u64) -> Result<()> {
        board.state().missing_since = now;

        self.missing.retain(|b| !Arc::ptr_eq(b, board));
        self.missing.push_back(board.clone());

        // Other boards may be ahead in line; the timer always targets
        // the earliest deadline.
        if let Some(head) = self.missing.front() {
            let timeout = adjust_timeout(DROP_BOARD_DELAY_MS, head.state().missing_since, now);
            self.timer.set(Some(timeout.max(0) as u64))?;
        }
        Ok(())
    }

    /// Walk the missing queue, dropping every board whose deadline has
    /// passed and re-arming the timer for the first one still pending.
    fn expire_missing(&mut self, now: u64) -> Result<()> {
        while let Some(board) = self.missing.front().cloned() {
            let missing_since = board.state().missing_since;

            let timeout = adjust_timeout(DROP_BOARD_DELAY_MS, missing_since, now);
            if timeout != 0 {
                self.timer.set(Some(timeout as u64))?;
                break;
            }

            self.missing.pop_front();
            self.drop_board(&board)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockPlatform, MockRemote};
    use std::sync::atomic::{AtomicBool, Ordering};

    type Events = Arc<Mutex<Vec<(String, Event)>>>;

    fn monitor_with(
        initial: Vec<MockDevice>,
    ) -> (Monitor<MockPlatform>, MockRemote, Events) {
        let (platform, remote) = MockPlatform::with_initial(initial);
        let mut monitor =
            Monitor::with_config(platform, MonitorFlags::empty(), MonitorConfig::default())
                .unwrap();

        let events: Events = Arc::default();
        let sink = events.clone();
        monitor.register_callback(move |board, event| {
            lock(&sink).push((board.id().to_string(), event));
            Ok(CallbackAction::Keep)
        });

        (monitor, remote, events)
    }

    fn drain(events: &Events) -> Vec<(String, Event)> {
        std::mem::take(&mut *lock(events))
    }

    fn teensy30(node: &str, location: &str) -> MockDevice {
        MockDevice::bootloader(node, location, 0x1D, Some("00000C81"))
    }

    #[test]
    fn test_bootloader_device_creates_board() {
        let (mut monitor, _remote, events) = monitor_with(vec![teensy30("hid0", "usb-1-2")]);
        monitor.refresh().unwrap();

        let boards = monitor.boards();
        assert_eq!(boards.len(), 1);

        let board = &boards[0];
        assert_eq!(board.id(), "32010-Teensy");
        assert_eq!(board.tag(), board.id());
        assert_eq!(board.location(), "usb-1-2");
        assert_eq!(board.model().name, "Teensy 3.0");
        assert_eq!(board.serial(), 32_010);
        assert_eq!(board.status(), BoardStatus::Online);
        assert_eq!(
            board.capabilities(),
            Capabilities::UPLOAD | Capabilities::RESET | Capabilities::UNIQUE
        );
        assert_eq!(board.description(), "Teensy (HalfKay)");

        assert_eq!(drain(&events), vec![("32010-Teensy".to_string(), Event::Added)]);
    }

    #[test]
    fn test_second_interface_merges_into_board() {
        let (mut monitor, remote, events) = monitor_with(vec![teensy30("hid0", "usb-1-2")]);
        monitor.refresh().unwrap();
        drain(&events);

        // Same board seen from its CDC side: runtime serial parses to
        // 320100 = 10x the stored serial, accepted with a warning.
        let cdc = MockDevice::serial_cdc("tty0", "usb-1-2", Some("32010"));
        remote.push(&cdc, DeviceStatus::Online);
        monitor.refresh().unwrap();

        let boards = monitor.boards();
        assert_eq!(boards.len(), 1);

        let board = &boards[0];
        assert_eq!(board.id(), "32010-Teensy");
        assert_eq!(board.serial(), 32_010);
        assert_eq!(board.capabilities(), Capabilities::all());
        assert_eq!(board.interfaces().len(), 2);

        assert_eq!(drain(&events), vec![("32010-Teensy".to_string(), Event::Changed)]);
    }

    #[test]
    fn test_missing_board_drops_after_grace_period() {
        let hid = teensy30("hid0", "usb-1-2");
        let cdc = MockDevice::serial_cdc("tty0", "usb-1-2", Some("32010"));
        let (mut monitor, remote, events) = monitor_with(vec![hid.clone(), cdc.clone()]);
        monitor.refresh().unwrap();
        drain(&events);

        let board = monitor.boards().remove(0);

        remote.push(&hid, DeviceStatus::Disconnected);
        remote.push(&cdc, DeviceStatus::Disconnected);
        monitor.refresh().unwrap();

        assert_eq!(
            drain(&events),
            vec![
                ("32010-Teensy".to_string(), Event::Changed),
                ("32010-Teensy".to_string(), Event::Disappeared),
            ]
        );
        assert_eq!(board.status(), BoardStatus::Missing);
        assert!(board.capabilities().is_empty());
        assert!(board.interfaces().is_empty());
        assert_eq!(monitor.boards().len(), 1);
        assert_eq!(remote.last_timer_set(), Some(Some(15_000)));

        remote.advance(15_000);
        remote.fire_timer();
        monitor.refresh().unwrap();

        assert_eq!(drain(&events), vec![("32010-Teensy".to_string(), Event::Dropped)]);
        assert_eq!(board.status(), BoardStatus::Dropped);
        assert!(monitor.boards().is_empty());
    }

    #[test]
    fn test_board_returning_within_grace_emits_changed() {
        let hid = teensy30("hid0", "usb-1-2");
        let (mut monitor, remote, events) = monitor_with(vec![hid.clone()]);
        monitor.refresh().unwrap();
        drain(&events);

        remote.push(&hid, DeviceStatus::Disconnected);
        monitor.refresh().unwrap();
        assert_eq!(drain(&events), vec![("32010-Teensy".to_string(), Event::Disappeared)]);

        remote.advance(5_000);
        remote.push(&hid, DeviceStatus::Online);
        monitor.refresh().unwrap();

        assert_eq!(drain(&events), vec![("32010-Teensy".to_string(), Event::Changed)]);
        let board = monitor.boards().remove(0);
        assert_eq!(board.status(), BoardStatus::Online);

        // the grace timer may still fire; the board must not drop
        remote.advance(10_000);
        remote.fire_timer();
        monitor.refresh().unwrap();
        assert!(drain(&events).is_empty());
        assert_eq!(board.status(), BoardStatus::Online);
    }

    #[test]
    fn test_conflicting_serial_replaces_board() {
        let (mut monitor, remote, events) = monitor_with(vec![teensy30("hid0", "usb-1-2")]);
        monitor.refresh().unwrap();
        drain(&events);

        // A different physical board shows up at the same location
        // without a removal notification in between.
        let other = MockDevice::bootloader("hid1", "usb-1-2", 0x1D, Some("00001000"));
        remote.push(&other, DeviceStatus::Online);
        monitor.refresh().unwrap();

        assert_eq!(
            drain(&events),
            vec![
                ("32010-Teensy".to_string(), Event::Disappeared),
                ("32010-Teensy".to_string(), Event::Dropped),
                ("40960-Teensy".to_string(), Event::Added),
            ]
        );

        let boards = monitor.boards();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].id(), "40960-Teensy");
    }

    #[test]
    fn test_vid_pid_change_closes_board_first() {
        let (mut monitor, remote, events) = monitor_with(vec![teensy30("hid0", "usb-1-2")]);
        monitor.refresh().unwrap();
        drain(&events);

        let mut cdc = MockDevice::serial_cdc("tty0", "usb-1-2", Some("32010"));
        cdc.pid = 0x487;
        remote.push(&cdc, DeviceStatus::Online);
        monitor.refresh().unwrap();

        assert_eq!(
            drain(&events),
            vec![
                ("32010-Teensy".to_string(), Event::Disappeared),
                ("32010-Teensy".to_string(), Event::Changed),
            ]
        );

        let board = monitor.boards().remove(0);
        assert_eq!(board.pid(), 0x487);
        assert_eq!(board.interfaces().len(), 1);
        // model identified earlier is carried over
        assert_eq!(board.model().name, "Teensy 3.0");
    }

    #[test]
    fn test_capability_map_recomputed_on_interface_removal() {
        let hid = teensy30("hid0", "usb-1-2");
        let cdc = MockDevice::serial_cdc("tty0", "usb-1-2", Some("32010"));
        let (mut monitor, remote, events) = monitor_with(vec![hid.clone(), cdc]);
        monitor.refresh().unwrap();
        drain(&events);

        remote.push(&hid, DeviceStatus::Disconnected);
        monitor.refresh().unwrap();

        assert_eq!(drain(&events), vec![("32010-Teensy".to_string(), Event::Changed)]);

        let board = monitor.boards().remove(0);
        assert_eq!(
            board.capabilities(),
            Capabilities::RUN | Capabilities::SERIAL | Capabilities::REBOOT | Capabilities::UNIQUE
        );
        assert!(board.capability_interface(Capability::Upload).is_none());

        // every remaining capability has a provider carrying that bit
        for cap in Capability::ALL {
            if board.has_capability(cap) {
                let iface = board.capability_interface(cap).unwrap();
                assert!(lock(&iface).capabilities().contains(cap.mask()));
            }
        }
    }

    #[test]
    fn test_drop_timer_tracks_queue_head() {
        let a = teensy30("hid0", "usb-1-1");
        let b = MockDevice::bootloader("hid1", "usb-1-2", 0x1E, Some("00002000"));
        let (mut monitor, remote, events) = monitor_with(vec![a.clone(), b.clone()]);
        monitor.refresh().unwrap();
        drain(&events);

        remote.push(&a, DeviceStatus::Disconnected);
        monitor.refresh().unwrap();
        assert_eq!(remote.last_timer_set(), Some(Some(15_000)));

        remote.advance(5_000);
        remote.push(&b, DeviceStatus::Disconnected);
        monitor.refresh().unwrap();
        // still armed for the head of the queue (board a)
        assert_eq!(remote.last_timer_set(), Some(Some(10_000)));
        drain(&events);

        remote.advance(10_000);
        remote.fire_timer();
        monitor.refresh().unwrap();

        // a expired, timer re-armed for b's remaining 5 seconds
        assert_eq!(drain(&events), vec![("32010-Teensy".to_string(), Event::Dropped)]);
        assert_eq!(remote.last_timer_set(), Some(Some(5_000)));
        assert_eq!(monitor.boards().len(), 1);

        remote.advance(5_000);
        remote.fire_timer();
        monitor.refresh().unwrap();

        assert_eq!(drain(&events), vec![("81920-Teensy".to_string(), Event::Dropped)]);
        assert!(monitor.boards().is_empty());
    }

    #[test]
    fn test_list_reports_online_boards_in_insertion_order() {
        let a = teensy30("hid0", "usb-1-1");
        let b = MockDevice::bootloader("hid1", "usb-1-2", 0x1E, Some("00002000"));
        let (mut monitor, remote, _events) = monitor_with(vec![a, b.clone()]);
        monitor.refresh().unwrap();

        let mut seen = Vec::new();
        monitor.list(|board, event| {
            assert_eq!(event, Event::Added);
            seen.push(board.id().to_string());
            ControlFlow::Continue(())
        });
        assert_eq!(seen, vec!["32010-Teensy", "81920-Teensy"]);

        remote.push(&b, DeviceStatus::Disconnected);
        monitor.refresh().unwrap();

        let mut seen = Vec::new();
        monitor.list(|board, _| {
            seen.push(board.id().to_string());
            ControlFlow::Continue(())
        });
        assert_eq!(seen, vec!["32010-Teensy"]);
    }

    #[test]
    fn test_register_deregister_roundtrip() {
        let (mut monitor, remote, _events) = monitor_with(Vec::new());
        monitor.refresh().unwrap();

        let extra: Events = Arc::default();
        let sink = extra.clone();
        let id = monitor.register_callback(move |board, event| {
            lock(&sink).push((board.id().to_string(), event));
            Ok(CallbackAction::Keep)
        });
        monitor.deregister_callback(id);

        remote.push(&teensy30("hid0", "usb-1-2"), DeviceStatus::Online);
        monitor.refresh().unwrap();

        assert!(lock(&extra).is_empty());
    }

    #[test]
    fn test_callback_unregisters_through_return_value() {
        let (mut monitor, remote, events) = monitor_with(Vec::new());
        monitor.refresh().unwrap();

        let once: Events = Arc::default();
        let sink = once.clone();
        monitor.register_callback(move |board, event| {
            lock(&sink).push((board.id().to_string(), event));
            Ok(CallbackAction::Unregister)
        });

        remote.push(&teensy30("hid0", "usb-1-1"), DeviceStatus::Online);
        monitor.refresh().unwrap();
        remote.push(
            &MockDevice::bootloader("hid1", "usb-1-2", 0x1E, Some("00002000")),
            DeviceStatus::Online,
        );
        monitor.refresh().unwrap();

        // the one-shot callback saw only the first event
        assert_eq!(lock(&once).len(), 1);
        assert_eq!(drain(&events).len(), 2);
    }

    #[test]
    fn test_callback_error_aborts_refresh() {
        let (mut monitor, remote, _events) = monitor_with(Vec::new());
        monitor.refresh().unwrap();

        monitor.register_callback(|_, _| Err(MonitorError::Callback("no thanks".into())));

        remote.push(&teensy30("hid0", "usb-1-2"), DeviceStatus::Online);
        let err = monitor.refresh().unwrap_err();
        assert!(matches!(err, MonitorError::Callback(_)));
    }

    #[test]
    fn test_find_board_by_location_and_tag() {
        let (mut monitor, _remote, _events) = monitor_with(vec![teensy30("hid0", "usb-1-2")]);
        monitor.refresh().unwrap();

        assert!(monitor.find_board("usb-1-2").is_some());
        assert!(monitor.find_board("usb-9-9").is_none());
        assert!(monitor.board_by_tag("32010-Teensy").is_some());
        assert!(monitor.board_by_tag("1-Teensy").is_none());
    }

    #[test]
    fn test_foreign_devices_are_ignored() {
        let mut alien = MockDevice::serial_cdc("ttyA", "usb-2-1", Some("555"));
        alien.vid = 0x0403;
        let (mut monitor, _remote, events) = monitor_with(vec![alien]);
        monitor.refresh().unwrap();

        assert!(monitor.boards().is_empty());
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn test_wait_returns_when_predicate_satisfied() {
        let (mut monitor, remote, _events) = monitor_with(Vec::new());
        monitor.refresh().unwrap();
        remote.push(&teensy30("hid0", "usb-1-2"), DeviceStatus::Online);

        let found = monitor
            .wait(|monitor| Ok(!monitor.boards().is_empty()), 1000)
            .unwrap();
        assert!(found);
    }

    #[test]
    fn test_wait_times_out() {
        let (mut monitor, _remote, _events) = monitor_with(Vec::new());

        let found = monitor.wait(|_| Ok(false), 50).unwrap();
        assert!(!found);
    }

    #[test]
    fn test_wait_for_board_fails_once_dropped() {
        let hid = teensy30("hid0", "usb-1-2");
        let (mut monitor, remote, _events) = monitor_with(vec![hid.clone()]);
        monitor.refresh().unwrap();
        let board = monitor.boards().remove(0);

        remote.push(&hid, DeviceStatus::Disconnected);
        monitor.refresh().unwrap();
        remote.advance(15_000);
        remote.fire_timer();
        monitor.refresh().unwrap();

        let err = monitor
            .wait_for_board(&board, Capability::Upload, 10)
            .unwrap_err();
        assert!(matches!(err, MonitorError::BoardGone(_)));
    }

    #[test]
    fn test_refresh_signal_wakes_parallel_waiter() {
        let (mut monitor, _remote, _events) = monitor_with(Vec::new());
        let signal = monitor.refresh_signal();

        let ready = Arc::new(AtomicBool::new(false));
        let flag = ready.clone();
        let waiter = std::thread::spawn(move || {
            signal.wait_until(|| Ok(flag.load(Ordering::SeqCst)), 5_000)
        });

        ready.store(true, Ordering::SeqCst);
        monitor.refresh().unwrap();

        assert!(waiter.join().unwrap().unwrap());
    }
}
