use crate::core::ent::StatsResponse;
use crate::core::error::{UpstreamError, UpstreamResult};

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};

#[derive(Debug)]
pub enum Event {
    Snapshot(StatsResponse),
    Failed(String),
}

/// Periodically fetches a `/api/servers` contract.
///
/// Each fetch is awaited before the next tick is taken, so there is never more than one
/// request in flight; a slow upstream stretches the period instead of piling up
/// requests. Flipping (or dropping) the shutdown sender cancels both the wait and the
/// request in flight.
#[derive(Debug, Clone)]
pub struct Poller {
    http: reqwest::Client,
    url: String,
    period: Duration,
}

impl Poller {
    pub fn new(http: reqwest::Client, url: impl Into<String>, period: Duration) -> Poller {
        Poller {
            http,
            url: url.into(),
            period,
        }
    }

    pub async fn fetch(&self) -> UpstreamResult<StatsResponse> {
        let res = self.http.get(&self.url).send().await?;
        if !res.status().is_success() {
            return Err(UpstreamError::Http(res.status()));
        }
        let bytes = res.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn run(self, tx: mpsc::Sender<Event>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            let event = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.fetch() => match result {
                    Ok(stats) => Event::Snapshot(stats),
                    Err(e) => Event::Failed(e.to_string()),
                },
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
        tracing::debug!("poller for {} stopped", self.url);
    }
}
