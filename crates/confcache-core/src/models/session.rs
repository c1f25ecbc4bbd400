use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled conference session (talk, workshop, track block).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ConferenceSession {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
}

impl ConferenceSession {
    /// Start inclusive, end exclusive.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now < self.end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_is_live_at_bounds() {
        let start = Utc::now();
        let session = ConferenceSession {
            id: "s1".to_string(),
            title: "Rust at the edge".to_string(),
            start_time: start,
            end_time: start + Duration::hours(1),
            room: None,
            track: None,
        };
        assert!(!session.is_live_at(start - Duration::seconds(1)));
        assert!(session.is_live_at(start));
        assert!(session.is_live_at(start + Duration::minutes(59)));
        assert!(!session.is_live_at(start + Duration::hours(1)));
    }
}
