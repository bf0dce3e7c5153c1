use castor_types::{Result, TupleType};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

/// ConsumptionCounter maintains a rolling window of tuples consumed per
/// tuple type, in fixed-width time buckets, for telemetry and rate-based
/// provisioning alarms. It's strictly advisory: losing a bucket is not a
/// correctness issue.
#[derive(Clone)]
pub struct ConsumptionCounter {
    conn: ConnectionManager,
    prefix: String,
    bucket_width_millis: i64,
    retention: Duration,
}

impl ConsumptionCounter {
    pub fn new(
        conn: ConnectionManager,
        prefix: impl Into<String>,
        bucket_width_millis: i64,
        retention: Duration,
    ) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            bucket_width_millis,
            retention,
        }
    }

    fn bucket_start(&self, timestamp_millis: i64) -> i64 {
        floor_to_bucket(timestamp_millis, self.bucket_width_millis)
    }

    fn key(&self, tuple_type: TupleType, bucket_start_millis: i64) -> String {
        format!("{}{}::{}", self.prefix, tuple_type, bucket_start_millis)
    }

    /// Atomically adds `delta` to the bucket covering `timestamp_millis`.
    /// Sets the bucket's TTL to the retention window on its first write
    /// (detected by the `INCRBY` reply equalling `delta`). Never decrements.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn record(
        &self,
        timestamp_millis: i64,
        tuple_type: TupleType,
        delta: i64,
    ) -> Result<()> {
        debug_assert!(delta >= 0, "consumption counter never decrements");

        let key = self.key(tuple_type, self.bucket_start(timestamp_millis));
        let mut conn = self.conn.clone();
        let total: i64 = conn.incr(&key, delta).await?;

        if total == delta {
            let _: () = conn
                .expire(&key, self.retention.as_secs() as i64)
                .await?;
        }
        Ok(())
    }

    /// Sums all buckets with `bucket_start >= from_millis`.
    /// `from_millis == i64::MIN` means "the entire retained window".
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn sum_since(&self, tuple_type: TupleType, from_millis: i64) -> Result<i64> {
        let now_bucket = self.bucket_start(chrono_now_millis());
        let first_bucket = if from_millis == i64::MIN {
            now_bucket - (self.retention.as_millis() as i64)
        } else {
            self.bucket_start(from_millis)
        };

        let mut conn = self.conn.clone();
        let mut total = 0i64;
        let mut bucket = first_bucket;
        while bucket <= now_bucket {
            let value: Option<i64> = conn.get(self.key(tuple_type, bucket)).await?;
            total += value.unwrap_or(0);
            bucket += self.bucket_width_millis;
        }
        Ok(total)
    }
}

fn chrono_now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `floor(timestamp_millis / bucket_width_millis) * bucket_width_millis`,
/// pulled out of `ConsumptionCounter` so the bucket math can be unit tested
/// without a Redis connection.
fn floor_to_bucket(timestamp_millis: i64, bucket_width_millis: i64) -> i64 {
    (timestamp_millis / bucket_width_millis) * bucket_width_millis
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bucket_start_floors_to_width() {
        assert_eq!(floor_to_bucket(2_500, 1_000), 2_000);
        assert_eq!(floor_to_bucket(2_000, 1_000), 2_000);
        assert_eq!(floor_to_bucket(0, 1_000), 0);
    }
}
