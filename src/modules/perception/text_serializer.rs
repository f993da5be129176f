use std::fmt;
use super::structs::{Item, TrackedItem};

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.id, self.title, self.published_at.format("%Y/%m/%d %H:%M"))
    }
}

impl fmt::Display for TrackedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.notified_at {
            Some(at) if self.notified => format!("notified @ {}", at.format("%Y/%m/%d %H:%M")),
            _ => "pending".to_string(),
        };
        write!(f, "{} | {}", self.item, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn renders_pending_and_notified_records() {
        let item = Item {
            id: "guid-1".into(),
            title: "Instagram update".into(),
            link: "https://example.com/1".into(),
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            description: String::new(),
        };
        let mut tracked = TrackedItem::new(item);
        assert_eq!(tracked.to_string(), "[guid-1] Instagram update (2024/05/01 09:30) | pending");

        tracked.notified = true;
        tracked.notified_at = Some(Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap());
        assert!(tracked.to_string().ends_with("notified @ 2024/05/02 08:00"));
    }
}
