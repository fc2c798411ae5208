//! Background cleanup of streams stuck in `live`.
//!
//! An ingest that dies without a `stream_ended` callback leaves its row
//! live forever; the reaper forces those rows to `ended` and publishes a
//! `stream_cleanup` event for downstream consumers.

use crate::error::AppResult;
use crate::models::StreamStatus;
use crate::repository::{HotStore, StreamStore};
use crate::services::events::EventSink;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub const REAPER_INTERVAL: Duration = Duration::from_secs(300);

/// A live stream is expired once it has been running longer than this...
const MAX_LIVE_AGE_HOURS: i64 = 12;
/// ...and has not been touched for this long.
const MAX_IDLE_HOURS: i64 = 1;

pub struct Reaper {
    streams: Arc<dyn StreamStore>,
    hot: Arc<dyn HotStore>,
    events: Arc<dyn EventSink>,
}

impl Reaper {
    pub fn new(
        streams: Arc<dyn StreamStore>,
        hot: Arc<dyn HotStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            streams,
            hot,
            events,
        }
    }

    /// Runs until the stop signal flips. Spawned once at bootstrap.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(REAPER_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(0) => {}
                        Ok(n) => info!(count = n, "cleaned up expired streams"),
                        Err(e) => warn!(error = %e, "reaper sweep failed"),
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("reaper stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One sweep over live streams. Returns how many were expired.
    pub async fn run_once(&self) -> AppResult<usize> {
        let live = self.streams.list_streams_by_status(StreamStatus::Live).await?;
        let now = Utc::now();
        let mut expired = 0usize;

        for mut stream in live {
            let Some(started_at) = stream.started_at else {
                continue;
            };
            let too_old = now - started_at > ChronoDuration::hours(MAX_LIVE_AGE_HOURS);
            let idle = now - stream.updated_at > ChronoDuration::hours(MAX_IDLE_HOURS);
            if !(too_old && idle) {
                continue;
            }

            let snapshot = stream.updated_at;
            stream.status = StreamStatus::Ended;
            stream.ended_at = Some(now);
            stream.duration_seconds = (now - started_at).num_seconds();
            stream.updated_at = now;

            if let Err(e) = self.streams.update_stream(&stream, snapshot).await {
                // Someone else may have won the transition; skip and continue.
                warn!(stream_id = %stream.id, error = %e, "could not expire stream");
                continue;
            }

            if let Err(e) = self.hot.session_del(&stream.stream_key).await {
                warn!(stream_id = %stream.id, error = %e, "could not purge session for expired stream");
            }

            if let Err(e) = self
                .events
                .publish(json!({
                    "event_type": "stream_cleanup",
                    "stream_id": stream.id,
                    "user_id": stream.user_id,
                    "reason": "expired",
                    "timestamp": now.timestamp(),
                }))
                .await
            {
                warn!(stream_id = %stream.id, error = %e, "could not publish cleanup event");
            }

            expired += 1;
        }

        Ok(expired)
    }
}
