//! Scripted platform for tests
//!
//! Device events are queued from the outside, the clock is manual, and
//! every I/O operation on an opened handle is recorded so tests can
//! assert on the exact wire traffic.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rteensy_core::device::{Clock, DeviceIo, DeviceType, SerialConfig, UsbDevice};
use rteensy_core::Result as CoreResult;

use crate::board::lock;
use crate::platform::{Descriptor, DescriptorSet, DeviceStatus, Platform, Timer};

#[derive(Default)]
pub struct IoLog {
    pub opens: usize,
    pub hid_writes: Vec<Vec<u8>>,
    pub feature_reports: Vec<Vec<u8>>,
    pub serial_writes: Vec<Vec<u8>>,
    pub baud_changes: Vec<u32>,
}

#[derive(Clone)]
pub struct MockDevice {
    pub node: String,
    pub location: String,
    pub vid: u16,
    pub pid: u16,
    pub device_type: DeviceType,
    pub serial: Option<String>,
    pub product: Option<String>,
    pub usage_page: u16,
    pub usage: u16,
    pub log: Arc<Mutex<IoLog>>,
}

impl MockDevice {
    pub fn bootloader(node: &str, location: &str, usage: u16, serial: Option<&str>) -> Self {
        Self {
            node: node.into(),
            location: location.into(),
            vid: 0x16C0,
            pid: 0x483,
            device_type: DeviceType::Hid,
            serial: serial.map(Into::into),
            product: None,
            usage_page: 0xFF9C,
            usage,
            log: Arc::default(),
        }
    }

    pub fn serial_cdc(node: &str, location: &str, serial: Option<&str>) -> Self {
        Self {
            node: node.into(),
            location: location.into(),
            vid: 0x16C0,
            pid: 0x483,
            device_type: DeviceType::Serial,
            serial: serial.map(Into::into),
            product: Some("USB Serial".into()),
            usage_page: 0,
            usage: 0,
            log: Arc::default(),
        }
    }

    pub fn seremu(node: &str, location: &str, serial: Option<&str>) -> Self {
        Self {
            node: node.into(),
            location: location.into(),
            vid: 0x16C0,
            pid: 0x486,
            device_type: DeviceType::Hid,
            serial: serial.map(Into::into),
            product: Some("Teensyduino RawHID".into()),
            usage_page: 0xFFC9,
            usage: 0x01,
            log: Arc::default(),
        }
    }
}

impl UsbDevice for MockDevice {
    type Handle = MockHandle;

    fn node(&self) -> &str {
        &self.node
    }
    fn location(&self) -> &str {
        &self.location
    }
    fn vid(&self) -> u16 {
        self.vid
    }
    fn pid(&self) -> u16 {
        self.pid
    }
    fn device_type(&self) -> DeviceType {
        self.device_type
    }
    fn serial_number(&self) -> Option<&str> {
        self.serial.as_deref()
    }
    fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }
    fn hid_usage_page(&self) -> u16 {
        self.usage_page
    }
    fn hid_usage(&self) -> u16 {
        self.usage
    }

    fn open(&self) -> CoreResult<MockHandle> {
        lock(&self.log).opens += 1;
        Ok(MockHandle {
            log: self.log.clone(),
        })
    }
}

pub struct MockHandle {
    log: Arc<Mutex<IoLog>>,
}

impl DeviceIo for MockHandle {
    fn serial_read(&mut self, _buf: &mut [u8], _timeout_ms: i32) -> CoreResult<usize> {
        Ok(0)
    }

    fn serial_write(&mut self, buf: &[u8]) -> CoreResult<usize> {
        lock(&self.log).serial_writes.push(buf.to_vec());
        Ok(buf.len())
    }

    fn serial_set_config(&mut self, config: &SerialConfig) -> CoreResult<()> {
        lock(&self.log).baud_changes.push(config.baudrate);
        Ok(())
    }

    fn hid_read(&mut self, _buf: &mut [u8], _timeout_ms: i32) -> CoreResult<usize> {
        Ok(0)
    }

    fn hid_write(&mut self, buf: &[u8]) -> CoreResult<usize> {
        lock(&self.log).hid_writes.push(buf.to_vec());
        Ok(buf.len())
    }

    fn hid_send_feature_report(&mut self, buf: &[u8]) -> CoreResult<usize> {
        lock(&self.log).feature_reports.push(buf.to_vec());
        Ok(buf.len())
    }
}

#[derive(Default)]
pub struct TimerState {
    pub fired: bool,
    pub set_calls: Vec<Option<u64>>,
}

pub struct MockTimer {
    state: Arc<Mutex<TimerState>>,
}

impl Timer for MockTimer {
    fn set(&mut self, timeout_ms: Option<u64>) -> CoreResult<()> {
        lock(&self.state).set_calls.push(timeout_ms);
        Ok(())
    }

    fn rearm(&mut self) -> bool {
        std::mem::take(&mut lock(&self.state).fired)
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor(2)
    }
}

/// Handles a test keeps to drive the platform from outside the monitor
#[derive(Clone)]
pub struct MockRemote {
    pub now: Arc<Mutex<u64>>,
    pub pending: Arc<Mutex<VecDeque<(MockDevice, DeviceStatus)>>>,
    pub timer: Arc<Mutex<TimerState>>,
    pub poll_results: Arc<Mutex<VecDeque<u32>>>,
}

impl MockRemote {
    pub fn advance(&self, ms: u64) {
        *lock(&self.now) += ms;
    }

    pub fn fire_timer(&self) {
        lock(&self.timer).fired = true;
    }

    pub fn last_timer_set(&self) -> Option<Option<u64>> {
        lock(&self.timer).set_calls.last().copied()
    }

    pub fn push(&self, dev: &MockDevice, status: DeviceStatus) {
        lock(&self.pending).push_back((dev.clone(), status));
    }
}

pub struct MockPlatform {
    now: Arc<Mutex<u64>>,
    initial: Vec<MockDevice>,
    pending: Arc<Mutex<VecDeque<(MockDevice, DeviceStatus)>>>,
    timer: Arc<Mutex<TimerState>>,
    poll_results: Arc<Mutex<VecDeque<u32>>>,
}

impl MockPlatform {
    pub fn with_initial(initial: Vec<MockDevice>) -> (Self, MockRemote) {
        let remote = MockRemote {
            now: Arc::default(),
            pending: Arc::default(),
            timer: Arc::default(),
            poll_results: Arc::default(),
        };

        let platform = Self {
            now: remote.now.clone(),
            initial,
            pending: remote.pending.clone(),
            timer: remote.timer.clone(),
            poll_results: remote.poll_results.clone(),
        };

        (platform, remote)
    }
}

impl Clock for MockPlatform {
    fn now_ms(&self) -> u64 {
        *lock(&self.now)
    }

    fn sleep_ms(&self, ms: u64) {
        *lock(&self.now) += ms;
    }
}

impl Platform for MockPlatform {
    type Device = MockDevice;
    type Handle = MockHandle;
    type Timer = MockTimer;

    fn new_timer(&mut self) -> CoreResult<MockTimer> {
        Ok(MockTimer {
            state: self.timer.clone(),
        })
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor(1)
    }

    fn list(
        &mut self,
        callback: &mut dyn FnMut(&MockDevice, DeviceStatus) -> bool,
    ) -> CoreResult<()> {
        let devices = self.initial.clone();
        for dev in &devices {
            if callback(dev, DeviceStatus::Online) {
                break;
            }
        }
        Ok(())
    }

    fn refresh(
        &mut self,
        callback: &mut dyn FnMut(&MockDevice, DeviceStatus) -> bool,
    ) -> CoreResult<()> {
        loop {
            let next = lock(&self.pending).pop_front();
            let Some((dev, status)) = next else {
                break;
            };
            if callback(&dev, status) {
                break;
            }
        }
        Ok(())
    }

    fn poll(&mut self, _set: &DescriptorSet, _timeout_ms: i32) -> CoreResult<u32> {
        Ok(lock(&self.poll_results).pop_front().unwrap_or(0))
    }
}

/// Manual clock for driving protocol engines directly
#[derive(Default)]
pub struct MockClock {
    pub now: Mutex<u64>,
    pub sleeps: Mutex<Vec<u64>>,
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        *lock(&self.now)
    }

    fn sleep_ms(&self, ms: u64) {
        *lock(&self.now) += ms;
        lock(&self.sleeps).push(ms);
    }
}
