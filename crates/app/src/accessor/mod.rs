//! Record accessors: the per-domain operations behind the HTTP handlers.
//!
//! Each accessor validates raw input, resolves references, applies the
//! access policy for the calling [`UserContext`](opsdesk_core::UserContext)
//! and maps row store failures onto [`AccessError`].

mod leave;
mod notifications;
mod references;
mod tasks;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use metrics::{counter, histogram};
use tracing::{debug, error};

use opsdesk_core::validate::ValidationError;
use opsdesk_core::AccessError;
use opsdesk_storage::RecordError;

pub use leave::LeaveAccessor;
pub use notifications::NotificationAccessor;
pub use references::ReferenceAccessor;
pub use tasks::TaskAccessor;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Reads the clock at the precision the row store keeps.
pub(crate) fn stamp(clock: &Clock) -> DateTime<Utc> {
    clock().trunc_subsecs(3)
}

/// Maps a repository failure onto the accessor taxonomy.
pub(crate) fn backend(err: RecordError) -> AccessError {
    match err {
        // Only reachable when a referenced row disappears between check and write.
        RecordError::MissingReference => AccessError::Validation(ValidationError::new(
            "reference",
            "a referenced record no longer exists",
        )),
        other => AccessError::Backend(other.to_string()),
    }
}

/// Runs one accessor call, recording its outcome.
pub(crate) async fn observed<T, F>(
    entity: &'static str,
    op: &'static str,
    call: F,
) -> Result<T, AccessError>
where
    F: Future<Output = Result<T, AccessError>>,
{
    let started = Instant::now();
    let result = call.await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };

    counter!("accessor_ops_total", "entity" => entity, "op" => op, "result" => outcome)
        .increment(1);
    histogram!("accessor_latency_seconds", "entity" => entity, "op" => op)
        .record(started.elapsed().as_secs_f64());

    match &result {
        Err(AccessError::Backend(detail)) => {
            error!(stage = "accessor", entity, op, error = %detail, "row store call failed");
        }
        Err(err) => {
            debug!(stage = "accessor", entity, op, error = %err, "request rejected");
        }
        Ok(_) => {}
    }

    result
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::notify::Notifier;
    use opsdesk_storage::Database;

    pub async fn setup_db() -> Database {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("connect");
        db.run_migrations().await.expect("migrations");
        db
    }

    /// A clock that advances one second per reading.
    pub fn ticking_clock(start: &str) -> Clock {
        let start = DateTime::parse_from_rfc3339(start)
            .expect("timestamp")
            .with_timezone(&Utc);
        let ticks = Arc::new(std::sync::atomic::AtomicI64::new(0));
        Arc::new(move || {
            let tick = ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            start + chrono::Duration::seconds(tick)
        })
    }

    pub fn inline_notifier(db: &Database, clock: &Clock) -> Notifier {
        Notifier::inline(db.clone(), clock.clone())
    }
}
