use crate::core::ent::NodeStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// tiered policy windows, seconds
pub const FRESH_SECS: i64 = 60;
pub const STALE_SECS: i64 = 300;

/// How to judge a record when the upstream does not say whether the node is online.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OnlinePolicy {
    /// Online iff the record is at most `max_age_secs` old.
    Threshold { max_age_secs: i64 },
    /// Online within 60 s; between 60 s and 300 s only when the record still shows
    /// some activity; offline after that.
    #[default]
    Tiered,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Doctor {
    policy: OnlinePolicy,
}

impl Doctor {
    pub fn new(policy: OnlinePolicy) -> Doctor {
        Doctor { policy }
    }

    pub fn policy(&self) -> OnlinePolicy {
        self.policy
    }

    /// The upstream `online` flag wins; the freshness heuristic is only a fallback.
    pub fn check_node(&self, status: &NodeStatus, now: DateTime<Utc>) -> bool {
        match status.online {
            Some(online) => online,
            None => self.is_fresh(status, now),
        }
    }

    pub fn is_fresh(&self, status: &NodeStatus, now: DateTime<Utc>) -> bool {
        let updated = match status.timestamp() {
            Some(updated) => updated,
            None => return false,
        };
        // clock skew: a record from the future is brand new
        let age = (now - updated).num_seconds().max(0);
        match self.policy {
            OnlinePolicy::Threshold { max_age_secs } => age <= max_age_secs,
            OnlinePolicy::Tiered => {
                if age <= FRESH_SECS {
                    true
                } else if age <= STALE_SECS {
                    has_activity(status)
                } else {
                    false
                }
            }
        }
    }
}

fn has_activity(status: &NodeStatus) -> bool {
    status.uptime > 0
        || status.cpu > 0.0
        || status.net_in > 0
        || status.net_out > 0
        || status.ram > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(age_secs: i64, now: DateTime<Utc>) -> NodeStatus {
        NodeStatus {
            time: Some(now - Duration::seconds(age_secs)),
            ..Default::default()
        }
    }

    fn policies() -> [Doctor; 3] {
        [
            Doctor::new(OnlinePolicy::Threshold { max_age_secs: 30 }),
            Doctor::new(OnlinePolicy::Threshold { max_age_secs: 60 }),
            Doctor::new(OnlinePolicy::Tiered),
        ]
    }

    #[test]
    fn recent_record_is_online_under_every_policy() {
        let now = Utc::now();
        for dc in policies() {
            assert!(dc.check_node(&record(20, now), now), "{:?}", dc.policy());
        }
    }

    #[test]
    fn old_record_is_offline_under_every_policy() {
        let now = Utc::now();
        for dc in policies() {
            assert!(!dc.check_node(&record(400, now), now), "{:?}", dc.policy());
        }
    }

    #[test]
    fn tiered_middle_window_needs_activity() {
        let now = Utc::now();
        let dc = Doctor::new(OnlinePolicy::Tiered);

        let idle = record(120, now);
        assert!(!dc.check_node(&idle, now));

        let busy = NodeStatus {
            cpu: 3.2,
            ..record(120, now)
        };
        assert!(dc.check_node(&busy, now));

        let uptime_only = NodeStatus {
            uptime: 10,
            ..record(299, now)
        };
        assert!(dc.check_node(&uptime_only, now));
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let now = Utc::now();
        let dc = Doctor::new(OnlinePolicy::Threshold { max_age_secs: 30 });
        assert!(dc.check_node(&record(30, now), now));
        assert!(!dc.check_node(&record(31, now), now));
    }

    #[test]
    fn upstream_flag_wins() {
        let now = Utc::now();
        let dc = Doctor::new(OnlinePolicy::Tiered);
        let stale_but_online = NodeStatus {
            online: Some(true),
            ..record(10_000, now)
        };
        let fresh_but_offline = NodeStatus {
            online: Some(false),
            ..record(1, now)
        };
        assert!(dc.check_node(&stale_but_online, now));
        assert!(!dc.check_node(&fresh_but_offline, now));
    }

    #[test]
    fn missing_timestamp_is_offline_and_future_is_online() {
        let now = Utc::now();
        let dc = Doctor::new(OnlinePolicy::Threshold { max_age_secs: 30 });
        assert!(!dc.check_node(&NodeStatus::default(), now));
        assert!(dc.check_node(&record(-120, now), now));
    }
}
