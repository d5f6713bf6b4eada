//! Shared test doubles: a scriptable controller link and a recording sink.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use plcpoll::{EventKey, EventSink, PlcLink, Result, RollRecord};

/// Shared script and counters behind a [`MockLink`]
#[derive(Default)]
pub struct LinkScript {
    connect_codes: Mutex<Vec<i32>>,
    read_codes: Mutex<Vec<i32>>,
    buffers: Mutex<HashMap<u16, Vec<u8>>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub reads: AtomicUsize,
}

impl LinkScript {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the raw buffer served for a register block
    pub fn set_buffer(&self, db: u16, bytes: Vec<u8>) {
        self.buffers.lock().insert(db, bytes);
    }

    /// Patch bytes inside an existing block buffer
    pub fn patch_buffer(&self, db: u16, offset: usize, bytes: &[u8]) {
        let mut buffers = self.buffers.lock();
        let buf = buffers.get_mut(&db).expect("buffer not scripted");
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Queue a result code for upcoming connect attempts (zero = success)
    pub fn push_connect_code(&self, code: i32) {
        self.connect_codes.lock().push(code);
    }

    /// Queue a result code for the next block read (zero = success)
    pub fn push_read_code(&self, code: i32) {
        self.read_codes.lock().push(code);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn next_connect_code(&self) -> i32 {
        let mut codes = self.connect_codes.lock();
        if codes.is_empty() {
            0
        } else {
            codes.remove(0)
        }
    }

    fn next_read_code(&self) -> i32 {
        let mut codes = self.read_codes.lock();
        if codes.is_empty() {
            0
        } else {
            codes.remove(0)
        }
    }
}

/// Controller link test double driven by a [`LinkScript`]
pub struct MockLink {
    script: Arc<LinkScript>,
}

impl MockLink {
    pub fn new(script: Arc<LinkScript>) -> Self {
        Self { script }
    }
}

#[async_trait]
impl PlcLink for MockLink {
    async fn connect(&mut self, _address: &str, _rack: u16, _slot: u16) -> i32 {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        self.script.next_connect_code()
    }

    async fn disconnect(&mut self) {
        self.script.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn read_block(&mut self, db: u16, start: usize, buf: &mut [u8]) -> i32 {
        self.script.reads.fetch_add(1, Ordering::SeqCst);
        let code = self.script.next_read_code();
        if code != 0 {
            return code;
        }
        buf.fill(0);
        if let Some(bytes) = self.script.buffers.lock().get(&db) {
            let available = bytes.len().saturating_sub(start);
            let len = buf.len().min(available);
            buf[..len].copy_from_slice(&bytes[start..start + len]);
        }
        0
    }

    fn error_text(&self, code: i32) -> String {
        format!("mock link error {code}")
    }
}

/// In-memory event sink recording every appended record
#[derive(Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<RollRecord>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn keys(&self) -> Vec<EventKey> {
        self.records.lock().iter().map(|r| r.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn record_exists(&self, key: &EventKey) -> Result<bool> {
        Ok(self.records.lock().iter().any(|r| r.key() == *key))
    }

    async fn append(&self, record: RollRecord) -> Result<RollRecord> {
        self.records.lock().push(record.clone());
        Ok(record)
    }
}
