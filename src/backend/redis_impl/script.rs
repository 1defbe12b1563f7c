//! Write-with-ceiling script.
//!
//! `KEYS[1]` data key, `KEYS[2]` namespace index, `ARGV[1]` payload,
//! `ARGV[2]` ttl in seconds, `ARGV[3]` population limit.

use redis::aio::ConnectionManager;
use tracing::debug;

use crate::backend::WriteRequest;
use crate::error::{CacheError, Result};

use super::error::map_redis_error;

/// Stores the value, then records it in the index and evicts the oldest
/// entries beyond the limit. Runs atomically on the server.
const WRITE_WITH_CEILING: &str = r#"
local ttl = tonumber(ARGV[2])
if ttl > 0 then
  redis.call('SET', KEYS[1], ARGV[1], 'EX', ttl)
else
  redis.call('SET', KEYS[1], ARGV[1])
end

local limit = tonumber(ARGV[3])
if limit > 0 then
  local now = redis.call('TIME')
  local score = tonumber(now[1]) + tonumber(now[2]) / 1000000
  redis.call('ZADD', KEYS[2], score, KEYS[1])
  local over = redis.call('ZCARD', KEYS[2]) - limit
  if over > 0 then
    local popped = redis.call('ZPOPMIN', KEYS[2], over)
    local stale = {}
    for i = 1, #popped, 2 do
      stale[#stale + 1] = popped[i]
    end
    redis.call('DEL', unpack(stale))
  end
end
return 1
"#;

// == Write Script ==
/// The write-with-ceiling script registered on one connection.
#[derive(Debug)]
pub struct WriteScript {
    script: redis::Script,
}

impl WriteScript {
    pub fn new() -> Self {
        Self {
            script: redis::Script::new(WRITE_WITH_CEILING),
        }
    }

    /// SHA1 the server knows the script by.
    pub fn hash(&self) -> &str {
        self.script.get_hash()
    }

    // == Load ==
    /// Registers the script with the server.
    pub async fn load(&self, conn: &mut ConnectionManager) -> Result<()> {
        let hash: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(WRITE_WITH_CEILING)
            .query_async(conn)
            .await
            .map_err(map_redis_error)?;

        if hash != self.hash() {
            return Err(CacheError::OperationFailed(format!(
                "server registered script as {} instead of {}",
                hash,
                self.hash()
            )));
        }

        debug!(sha = %hash, "write-with-ceiling script loaded");
        Ok(())
    }

    // == Invoke ==
    /// Runs one write; reloads the script transparently if the server lost it.
    pub async fn invoke(&self, conn: &mut ConnectionManager, write: &WriteRequest) -> Result<()> {
        let mut invocation = self.script.prepare_invoke();
        invocation
            .key(&write.key)
            .key(&write.index_key)
            .arg(write.payload.as_bytes())
            .arg(write.ttl)
            .arg(write.limit);

        let _: i64 = invocation
            .invoke_async(conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    // == Pipeline ==
    /// Queues one `EVALSHA` per write into a single pipeline.
    pub fn pipeline(&self, writes: &[WriteRequest]) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        for write in writes {
            pipe.cmd("EVALSHA")
                .arg(self.hash())
                .arg(2)
                .arg(&write.key)
                .arg(&write.index_key)
                .arg(write.payload.as_bytes())
                .arg(write.ttl)
                .arg(write.limit)
                .ignore();
        }
        pipe
    }
}

impl Default for WriteScript {
    fn default() -> Self {
        Self::new()
    }
}
