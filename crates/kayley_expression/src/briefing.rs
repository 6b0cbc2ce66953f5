use anyhow::Result;
use chrono::NaiveDate;
use kayley_memory::{CompanionStore, BRIEFED_ON_KEY};
use std::sync::Arc;

/// Tracks whether today's first-contact briefing already happened.
pub struct BriefingTracker {
    store: Arc<dyn CompanionStore>,
}

impl BriefingTracker {
    pub fn new(store: Arc<dyn CompanionStore>) -> Self {
        Self { store }
    }

    pub async fn briefed_on(&self) -> Result<Option<NaiveDate>> {
        let raw = self.store.get_flag(BRIEFED_ON_KEY).await?;
        Ok(raw.and_then(|s| match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => {
                tracing::warn!("Ignoring malformed {} flag: {:?}", BRIEFED_ON_KEY, s);
                None
            }
        }))
    }

    /// True when no briefing has been recorded for `today`.
    pub async fn is_first_contact(&self, today: NaiveDate) -> Result<bool> {
        Ok(self.briefed_on().await? != Some(today))
    }

    pub async fn mark_briefed(&self, today: NaiveDate) -> Result<()> {
        self.store
            .set_flag(BRIEFED_ON_KEY, &today.format("%Y-%m-%d").to_string())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kayley_memory::SqliteStore;

    #[tokio::test]
    async fn test_briefing_once_per_day() {
        let store: Arc<dyn CompanionStore> = Arc::new(SqliteStore::new(":memory:").await.unwrap());
        let tracker = BriefingTracker::new(store.clone());
        let monday = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let tuesday = monday.succ_opt().unwrap();

        assert!(tracker.is_first_contact(monday).await.unwrap());
        tracker.mark_briefed(monday).await.unwrap();
        assert!(!tracker.is_first_contact(monday).await.unwrap());
        assert!(tracker.is_first_contact(tuesday).await.unwrap());

        store.set_flag(BRIEFED_ON_KEY, "garbage").await.unwrap();
        assert!(tracker.is_first_contact(monday).await.unwrap());
    }
}
