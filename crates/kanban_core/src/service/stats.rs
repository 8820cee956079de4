//! Hierarchy statistics and their publication to the metrics sink.

use crate::error::HierarchyResult;
use crate::repo::hierarchy_repo::{BoardStats, HierarchyStore};
use crate::service::hierarchy_api::HierarchyApi;
use log::{info, warn};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

pub const STATS_LAST_UPDATE_KEY: &str = "kanban:stats:last_update";
pub const STATS_DATA_KEY: &str = "kanban:stats:data";

/// Totals across every owner, plus per-board counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyStats {
    pub total_boards: u64,
    pub boards_with_lists: u64,
    pub total_lists: u64,
    pub total_cards: u64,
    pub boards: Vec<BoardStats>,
}

impl HierarchyStats {
    fn from_boards(boards: Vec<BoardStats>) -> Self {
        Self {
            total_boards: boards.len() as u64,
            boards_with_lists: boards.iter().filter(|b| b.lists_count > 0).count() as u64,
            total_lists: boards.iter().map(|b| b.lists_count).sum(),
            total_cards: boards.iter().map(|b| b.cards_count).sum(),
            boards,
        }
    }
}

impl<S: HierarchyStore> HierarchyApi<S> {
    pub fn statistics(&self) -> HierarchyResult<HierarchyStats> {
        Ok(HierarchyStats::from_boards(self.store().board_statistics()?))
    }

    /// Computes statistics and writes them to the metrics sink.
    ///
    /// Sink failures are logged and ignored; the computed statistics are
    /// returned either way.
    pub fn publish_statistics(&self) -> HierarchyResult<HierarchyStats> {
        let stats = self.statistics()?;
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_millis())
            .unwrap_or_default();

        match serde_json::to_string(&stats) {
            Ok(payload) => {
                for (key, value) in [
                    (STATS_LAST_UPDATE_KEY, now_ms.to_string()),
                    (STATS_DATA_KEY, payload),
                ] {
                    if let Err(err) = self.metrics.set(key, &value) {
                        warn!(
                            "event=stats_publish module=service status=error key={} error={}",
                            key, err
                        );
                    }
                }
            }
            Err(err) => warn!(
                "event=stats_publish module=service status=error error_code=serialize_failed error={}",
                err
            ),
        }

        info!(
            "event=stats_publish module=service status=ok boards={} lists={} cards={}",
            stats.total_boards, stats.total_lists, stats.total_cards
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::HierarchyStats;
    use crate::repo::hierarchy_repo::BoardStats;
    use uuid::Uuid;

    #[test]
    fn totals_sum_per_board_counters() {
        let stats = HierarchyStats::from_boards(vec![
            BoardStats {
                uuid: Uuid::new_v4(),
                title: "Roadmap".to_string(),
                lists_count: 3,
                cards_count: 10,
            },
            BoardStats {
                uuid: Uuid::new_v4(),
                title: "Empty".to_string(),
                lists_count: 0,
                cards_count: 0,
            },
        ]);

        assert_eq!(stats.total_boards, 2);
        assert_eq!(stats.boards_with_lists, 1);
        assert_eq!(stats.total_lists, 3);
        assert_eq!(stats.total_cards, 10);
    }
}
