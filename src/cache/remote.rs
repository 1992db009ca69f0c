//! Distributed cache backend.
//!
//! Speaks the RESP protocol (`GET` / `SET key value PX ttl`) to an external
//! key-value store over pooled TCP connections with bounded socket
//! timeouts. Every failure (connect, I/O, timeout, malformed reply,
//! undecodable payload) degrades to a cache miss: the error is counted and
//! logged, never propagated, so evaluation proceeds locally.
//!
//! Keys are branded with the owning model's content seed
//! (`helios:<seed>:<fingerprint>`), which keeps a long-lived external store
//! sound across model hot-swaps. Payloads at or above the configured
//! threshold are lz4-compressed; a one-byte header records the framing.

use crate::cache::{CacheValue, Fingerprint, FingerprintCache};
use crate::config::{CacheSettings, DistributedSettings};
use crate::error::{HeliosError, HeliosResult};
use crate::metrics::{CacheSnapshot, CacheStats};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Read, Write};
use std::marker::PhantomData;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const FRAME_RAW: u8 = 0;
const FRAME_LZ4: u8 = 1;

type Connection = BufReader<TcpStream>;

struct AddressPool {
    address: String,
    connections: Vec<Mutex<Option<Connection>>>,
    next: AtomicUsize,
}

/// RESP-backed distributed cache (type = "distributed").
pub struct RemoteCache<V> {
    pools: Vec<AddressPool>,
    timeout: Duration,
    ttl_millis: u64,
    compression_threshold: usize,
    key_prefix: String,
    cluster: bool,
    stats: Arc<CacheStats>,
    record_stats: bool,
    _value: PhantomData<fn() -> V>,
}

impl<V: CacheValue> RemoteCache<V> {
    pub fn new(
        distributed: &DistributedSettings,
        settings: &CacheSettings,
        model_seed: u64,
    ) -> HeliosResult<Self> {
        let addresses: Vec<String> = distributed
            .address
            .split(',')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if addresses.is_empty() {
            return Err(HeliosError::Config(
                "cache distributed.address must name at least one host:port".to_string(),
            ));
        }
        if !distributed.cluster && addresses.len() > 1 {
            return Err(HeliosError::Config(
                "multiple cache addresses require distributed.cluster = true".to_string(),
            ));
        }

        let per_address = distributed.pool_size.max(1);
        let pools = addresses
            .into_iter()
            .map(|address| AddressPool {
                address,
                connections: (0..per_address).map(|_| Mutex::new(None)).collect(),
                next: AtomicUsize::new(0),
            })
            .collect();

        Ok(RemoteCache {
            pools,
            timeout: Duration::from_millis(distributed.timeout_ms.max(1)),
            ttl_millis: settings.ttl_seconds * 1000,
            compression_threshold: distributed.compression_threshold,
            key_prefix: format!("helios:{:016x}", model_seed),
            cluster: distributed.cluster,
            stats: Arc::new(CacheStats::new()),
            record_stats: settings.record_stats,
            _value: PhantomData,
        })
    }

    fn pool_for(&self, key: &Fingerprint) -> &AddressPool {
        if self.cluster {
            let index = (key.0 >> 64) as usize % self.pools.len();
            &self.pools[index]
        } else {
            &self.pools[0]
        }
    }

    fn key_string(&self, key: &Fingerprint) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    fn with_connection<T>(
        &self,
        pool: &AddressPool,
        op: impl FnOnce(&mut Connection) -> std::io::Result<T>,
    ) -> Option<T> {
        let slot = pool.next.fetch_add(1, Ordering::Relaxed) % pool.connections.len();
        let mut guard = pool.connections[slot].lock();

        if guard.is_none() {
            match connect(&pool.address, self.timeout) {
                Ok(conn) => *guard = Some(conn),
                Err(err) => {
                    self.note_error(&pool.address, &err);
                    return None;
                }
            }
        }

        let conn = guard.as_mut().expect("connection populated above");
        match op(conn) {
            Ok(value) => Some(value),
            Err(err) => {
                // Drop the broken connection; the next caller redials.
                *guard = None;
                self.note_error(&pool.address, &err);
                None
            }
        }
    }

    fn note_error(&self, address: &str, err: &std::io::Error) {
        if self.record_stats {
            self.stats.record_error();
        }
        warn!(address = address, error = %err, "distributed cache unavailable, treating as miss");
    }

    fn encode_value(&self, value: &V) -> std::io::Result<Vec<u8>> {
        let raw = value.to_bytes();
        if raw.len() >= self.compression_threshold {
            let compressed = lz4::block::compress(&raw, None, true)?;
            let mut framed = Vec::with_capacity(1 + compressed.len());
            framed.push(FRAME_LZ4);
            framed.extend_from_slice(&compressed);
            Ok(framed)
        } else {
            let mut framed = Vec::with_capacity(1 + raw.len());
            framed.push(FRAME_RAW);
            framed.extend_from_slice(&raw);
            Ok(framed)
        }
    }

    fn decode_value(&self, framed: &[u8]) -> HeliosResult<V> {
        match framed.split_first() {
            Some((&FRAME_RAW, payload)) => V::from_bytes(payload),
            Some((&FRAME_LZ4, payload)) => {
                let raw = lz4::block::decompress(payload, None)
                    .map_err(|e| HeliosError::CacheBackend(e.to_string()))?;
                V::from_bytes(&raw)
            }
            _ => Err(HeliosError::CacheBackend(
                "unknown cache payload framing".to_string(),
            )),
        }
    }
}

impl<V: CacheValue> FingerprintCache<V> for RemoteCache<V> {
    fn get(&self, key: &Fingerprint) -> Option<V> {
        let pool = self.pool_for(key);
        let key_string = self.key_string(key);
        let reply = self.with_connection(pool, |conn| {
            send_command(conn, &[b"GET", key_string.as_bytes()])?;
            read_reply(conn)
        })?;

        let payload = match reply {
            Reply::Bulk(bytes) => bytes,
            Reply::Nil => {
                if self.record_stats {
                    self.stats.record_miss();
                }
                return None;
            }
            other => {
                warn!(reply = ?other, "unexpected GET reply, treating as miss");
                if self.record_stats {
                    self.stats.record_error();
                }
                return None;
            }
        };

        match self.decode_value(&payload) {
            Ok(value) => {
                if self.record_stats {
                    self.stats.record_hit();
                }
                Some(value)
            }
            Err(err) => {
                warn!(error = %err, "undecodable cache payload, treating as miss");
                if self.record_stats {
                    self.stats.record_error();
                }
                None
            }
        }
    }

    fn put(&self, key: Fingerprint, value: V) {
        let pool = self.pool_for(&key);
        let key_string = self.key_string(&key);
        let framed = match self.encode_value(&value) {
            Ok(framed) => framed,
            Err(err) => {
                self.note_error(&pool.address, &err);
                return;
            }
        };
        let ttl_arg = self.ttl_millis.to_string();
        let _ = self.with_connection(pool, |conn| {
            if self.ttl_millis > 0 {
                send_command(
                    conn,
                    &[b"SET", key_string.as_bytes(), &framed, b"PX", ttl_arg.as_bytes()],
                )?;
            } else {
                send_command(conn, &[b"SET", key_string.as_bytes(), &framed])?;
            }
            read_reply(conn)
        });
    }

    fn stats(&self) -> CacheSnapshot {
        self.stats.snapshot()
    }
}

fn connect(address: &str, timeout: Duration) -> std::io::Result<Connection> {
    let addr = address
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "unresolvable address"))?;
    let stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)?;
    Ok(BufReader::new(stream))
}

#[derive(Debug)]
enum Reply {
    Ok,
    Bulk(Vec<u8>),
    Nil,
    Error(String),
}

fn send_command(conn: &mut Connection, parts: &[&[u8]]) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(format!("*{}\r\n", parts.len()).as_bytes());
    for part in parts {
        buf.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        buf.extend_from_slice(part);
        buf.extend_from_slice(b"\r\n");
    }
    let stream = conn.get_mut();
    stream.write_all(&buf)?;
    stream.flush()
}

fn read_reply(conn: &mut Connection) -> std::io::Result<Reply> {
    let mut line = String::new();
    conn.read_line(&mut line)?;
    let line = line.trim_end_matches(['\r', '\n']);
    let mut chars = line.chars();
    let kind = chars.next().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "empty RESP reply")
    })?;
    let rest = chars.as_str();
    match kind {
        '+' => Ok(Reply::Ok),
        '-' => Ok(Reply::Error(rest.to_string())),
        ':' => Ok(Reply::Ok),
        '$' => {
            let len: i64 = rest.parse().map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "bad bulk length")
            })?;
            if len < 0 {
                return Ok(Reply::Nil);
            }
            let mut payload = vec![0u8; len as usize];
            conn.read_exact(&mut payload)?;
            let mut crlf = [0u8; 2];
            conn.read_exact(&mut crlf)?;
            Ok(Reply::Bulk(payload))
        }
        other => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unsupported RESP reply type '{}'", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BaseConditionResult;
    use roaring::RoaringBitmap;

    fn remote(compression_threshold: usize) -> RemoteCache<Arc<BaseConditionResult>> {
        let settings = CacheSettings::default();
        let distributed = DistributedSettings {
            compression_threshold,
            ..DistributedSettings::default()
        };
        RemoteCache::new(&distributed, &settings, 0xfeed).unwrap()
    }

    fn sample() -> Arc<BaseConditionResult> {
        let mut eligible = RoaringBitmap::new();
        for c in 0..500 {
            eligible.insert(c * 7);
        }
        Arc::new(BaseConditionResult {
            eligible,
            true_static: vec![1, 2, 3],
        })
    }

    #[test]
    fn test_value_framing_raw() {
        let cache = remote(usize::MAX);
        let value = sample();
        let framed = cache.encode_value(&value).unwrap();
        assert_eq!(framed[0], FRAME_RAW);
        let decoded = cache.decode_value(&framed).unwrap();
        assert_eq!(*decoded, *value);
    }

    #[test]
    fn test_value_framing_compressed() {
        let cache = remote(1);
        let value = sample();
        let framed = cache.encode_value(&value).unwrap();
        assert_eq!(framed[0], FRAME_LZ4);
        let decoded = cache.decode_value(&framed).unwrap();
        assert_eq!(*decoded, *value);
    }

    #[test]
    fn test_unreachable_store_is_a_miss() {
        let settings = CacheSettings::default();
        let distributed = DistributedSettings {
            // Reserved port that nothing listens on.
            address: "127.0.0.1:1".to_string(),
            timeout_ms: 10,
            ..DistributedSettings::default()
        };
        let cache: RemoteCache<Arc<BaseConditionResult>> =
            RemoteCache::new(&distributed, &settings, 1).unwrap();
        assert!(cache.get(&Fingerprint(1)).is_none());
        assert!(cache.stats().errors >= 1);
    }

    #[test]
    fn test_cluster_requires_flag() {
        let settings = CacheSettings::default();
        let distributed = DistributedSettings {
            address: "127.0.0.1:6379,127.0.0.1:6380".to_string(),
            cluster: false,
            ..DistributedSettings::default()
        };
        let result: HeliosResult<RemoteCache<Arc<BaseConditionResult>>> =
            RemoteCache::new(&distributed, &settings, 1);
        assert!(result.is_err());
    }
}
