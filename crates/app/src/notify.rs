use metrics::counter;
use tracing::{debug, warn};
use uuid::Uuid;

use opsdesk_core::notice::Notice;
use opsdesk_core::types::Notification;
use opsdesk_storage::Database;

use crate::accessor::{stamp, Clock};

#[derive(Clone, Copy)]
enum Delivery {
    Spawned,
    #[cfg(test)]
    Inline,
}

/// One-way notification sink. Delivery failures never reach the caller.
#[derive(Clone)]
pub struct Notifier {
    database: Database,
    clock: Clock,
    delivery: Delivery,
}

impl Notifier {
    pub fn new(database: Database, clock: Clock) -> Self {
        Self {
            database,
            clock,
            delivery: Delivery::Spawned,
        }
    }

    /// Writes notices before returning, so tests can observe them.
    #[cfg(test)]
    pub fn inline(database: Database, clock: Clock) -> Self {
        Self {
            database,
            clock,
            delivery: Delivery::Inline,
        }
    }

    pub async fn send(&self, notices: Vec<Notice>) {
        if notices.is_empty() {
            return;
        }
        let notifications: Vec<Notification> = notices
            .into_iter()
            .map(|notice| Notification {
                id: Uuid::new_v4().to_string(),
                user_id: notice.user_id,
                kind: notice.kind,
                payload: notice.payload,
                created_at: stamp(&self.clock),
                read_at: None,
            })
            .collect();

        match self.delivery {
            Delivery::Spawned => {
                let database = self.database.clone();
                tokio::spawn(async move { deliver(database, notifications).await });
            }
            #[cfg(test)]
            Delivery::Inline => deliver(self.database.clone(), notifications).await,
        }
    }
}

async fn deliver(database: Database, notifications: Vec<Notification>) {
    let repo = database.notifications();
    for notification in notifications {
        match repo.insert(&notification).await {
            Ok(()) => {
                counter!("notifications_total", "result" => "delivered").increment(1);
                debug!(
                    stage = "notify",
                    user_id = %notification.user_id,
                    kind = %notification.kind,
                    "notification stored"
                );
            }
            Err(err) => {
                counter!("notifications_total", "result" => "failed").increment(1);
                warn!(
                    stage = "notify",
                    user_id = %notification.user_id,
                    kind = %notification.kind,
                    error = %err,
                    "failed to store notification"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::test_support::{setup_db, ticking_clock};
    use opsdesk_core::types::NotificationKind;
    use serde_json::json;

    #[tokio::test]
    async fn inline_delivery_persists_each_notice() {
        let db = setup_db().await;
        let notifier = Notifier::inline(db.clone(), ticking_clock("2024-06-01T08:00:00Z"));

        notifier
            .send(vec![
                Notice {
                    user_id: "u-1".into(),
                    kind: NotificationKind::TaskAssigned,
                    payload: json!({ "task_id": "t-1" }),
                },
                Notice {
                    user_id: "u-1".into(),
                    kind: NotificationKind::TaskStatusChanged,
                    payload: json!({ "task_id": "t-1" }),
                },
            ])
            .await;

        let stored = db
            .notifications()
            .list_for_user("u-1", false, 10)
            .await
            .expect("list");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].kind, NotificationKind::TaskStatusChanged);
    }

    #[tokio::test]
    async fn spawned_delivery_eventually_lands() {
        let db = setup_db().await;
        let notifier = Notifier::new(db.clone(), ticking_clock("2024-06-01T08:00:00Z"));

        notifier
            .send(vec![Notice {
                user_id: "u-9".into(),
                kind: NotificationKind::LeaveDecided,
                payload: json!({}),
            }])
            .await;

        let mut stored = Vec::new();
        for _ in 0..50 {
            stored = db
                .notifications()
                .list_for_user("u-9", false, 10)
                .await
                .expect("list");
            if !stored.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(stored.len(), 1);
    }
}
