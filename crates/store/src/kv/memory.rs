//! An in-process [`KvStore`] that understands the commands the gateway sends.
//!
//! Time only moves when the attached [`ManualClock`] is advanced, which makes key
//! expiry deterministic in tests.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::resp::{Command, RespValue};
use super::{KvStore, StoreError};

/// A clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(millis, Ordering::AcqRel);
    }

    pub fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::Acquire))
    }
}

#[derive(Debug)]
struct Entry {
    value: Bytes,
    expires_at: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<Bytes, Entry>>,
    clock: ManualClock,
    offline: AtomicBool,
    log: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: ManualClock) -> Self {
        Self { clock, ..Self::default() }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// While offline every command fails as a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Every command executed so far, rendered with its arguments.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The live value of `key`, bypassing the command log.
    pub fn value(&self, key: &str) -> Option<Bytes> {
        let now = self.clock.now();
        let mut entries = self.entries();
        live(&mut entries, key.as_bytes(), now).map(|entry| entry.value.clone())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Bytes, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, command: &Command) {
        let mut line = command.name().to_owned();
        for arg in command.args() {
            line.push(' ');
            line.push_str(&String::from_utf8_lossy(arg));
        }
        self.log.lock().unwrap_or_else(PoisonError::into_inner).push(line);
    }

    fn apply(&self, command: &Command) -> RespValue {
        let now = self.clock.now();
        let mut entries = self.entries();
        let args = command.args();

        match (command.name().to_ascii_uppercase().as_str(), args) {
            ("PING", []) => RespValue::Simple("PONG".into()),
            ("GET", [key]) => live(&mut entries, key, now).map_or(RespValue::Nil, |entry| RespValue::Bulk(entry.value.clone())),
            ("DEL", keys) if !keys.is_empty() => {
                let removed = keys.iter().filter(|key| live(&mut entries, key, now).is_some() && entries.remove(*key).is_some()).count();
                RespValue::Integer(i64::try_from(removed).unwrap_or(i64::MAX))
            }
            ("INCR", [key]) => {
                let entry = live(&mut entries, key, now);
                let current = match entry.as_ref().map(|entry| parse_integer(&entry.value)) {
                    None => 0,
                    Some(Some(current)) => current,
                    Some(None) => return RespValue::Error("ERR value is not an integer or out of range".into()),
                };
                let Some(next) = current.checked_add(1) else {
                    return RespValue::Error("ERR increment or decrement would overflow".into());
                };
                let expires_at = entry.and_then(|entry| entry.expires_at);
                entries.insert(key.clone(), Entry { value: Bytes::from(next.to_string()), expires_at });
                RespValue::Integer(next)
            }
            ("SET", [key, value, options @ ..]) => set(&mut entries, now, key, value, options),
            (name, _) => RespValue::Error(format!("ERR unknown command or wrong number of arguments for '{name}'")),
        }
    }
}

fn parse_integer(value: &[u8]) -> Option<i64> {
    std::str::from_utf8(value).ok()?.parse().ok()
}

/// The entry under `key` unless it has expired; expired entries are dropped on access.
fn live<'a>(entries: &'a mut HashMap<Bytes, Entry>, key: &[u8], now: Duration) -> Option<&'a Entry> {
    if entries.get(key).is_some_and(|entry| entry.expires_at.is_some_and(|at| at <= now)) {
        entries.remove(key);
    }
    entries.get(key)
}

fn set(entries: &mut HashMap<Bytes, Entry>, now: Duration, key: &Bytes, value: &Bytes, options: &[Bytes]) -> RespValue {
    let mut expires_at = None;
    let mut only_new = false;
    let mut options = options.iter();

    while let Some(option) = options.next() {
        if option.eq_ignore_ascii_case(b"NX") {
            only_new = true;
        } else if option.eq_ignore_ascii_case(b"EX") {
            match options.next().and_then(|seconds| parse_integer(seconds)) {
                Some(seconds) if seconds > 0 => expires_at = Some(now + Duration::from_secs(seconds.unsigned_abs())),
                Some(_) => return RespValue::Error("ERR invalid expire time in 'set' command".into()),
                None => return RespValue::Error("ERR value is not an integer or out of range".into()),
            }
        } else {
            return RespValue::Error("ERR syntax error".into());
        }
    }

    if only_new && live(entries, key, now).is_some() {
        return RespValue::Nil;
    }
    entries.insert(key.clone(), Entry { value: value.clone(), expires_at });
    RespValue::Simple("OK".into())
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn execute(&self, command: Command) -> Result<RespValue, StoreError> {
        if self.offline.load(Ordering::Acquire) {
            return Err(StoreError::Transport { source: io::ErrorKind::ConnectionReset.into() });
        }
        self.record(&command);
        Ok(self.apply(&command))
    }
}
