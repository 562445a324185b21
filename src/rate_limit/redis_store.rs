use std::time::{SystemTime, UNIX_EPOCH};

use redis::aio::MultiplexedConnection;
use redis::Script;

use super::{KeyKind, RateDecision, KEY_TTL_SECS, WINDOW_MS};

/// Both windows in one round trip: purge expired members, count, and only
/// if both have capacity insert the new timestamps. Runs atomically on the
/// server, so concurrent callers on the same keys cannot interleave between
/// the count and the insert.
///
/// KEYS[1]/KEYS[2]: patient and IP ZSETs of millisecond timestamps.
/// ARGV: now_ms, window_ms, patient_limit, ip_limit, ttl_secs, member_nonce.
/// Returns {admitted, retry_after_secs, rejected_window} where
/// rejected_window is 1 for patient, 2 for IP.
const CHECK_AND_INSERT: &str = r#"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local min_live = now - window
redis.call('ZREMRANGEBYSCORE', KEYS[1], 0, '(' .. min_live)
redis.call('ZREMRANGEBYSCORE', KEYS[2], 0, '(' .. min_live)
local patient_count = redis.call('ZCARD', KEYS[1])
local ip_count = redis.call('ZCARD', KEYS[2])
if patient_count >= tonumber(ARGV[3]) or ip_count >= tonumber(ARGV[4]) then
  local oldest = now
  local oldest_patient = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
  if oldest_patient[2] then oldest = math.min(oldest, tonumber(oldest_patient[2])) end
  local oldest_ip = redis.call('ZRANGE', KEYS[2], 0, 0, 'WITHSCORES')
  if oldest_ip[2] then oldest = math.min(oldest, tonumber(oldest_ip[2])) end
  local retry_ms = window - (now - oldest)
  if retry_ms < 0 then retry_ms = 0 end
  local which = 2
  if patient_count >= tonumber(ARGV[3]) then which = 1 end
  return {0, math.ceil(retry_ms / 1000), which}
end
redis.call('ZADD', KEYS[1], now, ARGV[1] .. '-' .. ARGV[6])
redis.call('ZADD', KEYS[2], now, ARGV[1] .. '-' .. ARGV[6])
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[5]))
redis.call('EXPIRE', KEYS[2], tonumber(ARGV[5]))
return {1, 0, 0}
"#;

/// Redis-backed sliding-window limiter for multi-process deployments.
///
/// All instances share the same per-key windows, and the check-and-insert
/// script keeps admissions exact across them.
pub struct RedisRateLimiter {
    connection: MultiplexedConnection,
    script: Script,
    patient_limit: u32,
    ip_limit: u32,
}

impl RedisRateLimiter {
    /// Connect to the shared store.
    pub async fn connect(
        url: &str,
        patient_limit: u32,
        ip_limit: u32,
    ) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        tracing::info!(patient_limit, ip_limit, "Connected to shared rate limit store");
        Ok(Self {
            connection,
            script: Script::new(CHECK_AND_INSERT),
            patient_limit,
            ip_limit,
        })
    }

    /// Check both windows and record the attempt if admitted.
    pub async fn allow(&self, patient_id: &str, ip: &str) -> Result<RateDecision, redis::RedisError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        // Unique member suffix: two admissions in the same millisecond must
        // not collapse into one ZSET entry.
        let nonce = uuid::Uuid::new_v4().to_string();

        let mut connection = self.connection.clone();
        let (admitted, retry_after, which): (i64, i64, i64) = self
            .script
            .key(format!("rate:patient:{patient_id}"))
            .key(format!("rate:ip:{ip}"))
            .arg(now)
            .arg(WINDOW_MS)
            .arg(self.patient_limit)
            .arg(self.ip_limit)
            .arg(KEY_TTL_SECS)
            .arg(nonce)
            .invoke_async(&mut connection)
            .await?;

        if admitted == 1 {
            Ok(RateDecision::Admitted)
        } else {
            Ok(RateDecision::Rejected {
                retry_after_secs: retry_after.max(0) as u64,
                key_kind: if which == 1 {
                    KeyKind::Patient
                } else {
                    KeyKind::Ip
                },
            })
        }
    }
}
