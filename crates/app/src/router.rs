use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use opsdesk_storage::Database;
use tracing::warn;

use crate::accessor::{
    Clock, LeaveAccessor, NotificationAccessor, ReferenceAccessor, TaskAccessor,
};
use crate::notify::Notifier;
use crate::session::SessionValidator;
use crate::{api, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    clock: Clock,
    sessions: SessionValidator,
    tasks: TaskAccessor,
    leave: LeaveAccessor,
    references: ReferenceAccessor,
    notifications: NotificationAccessor,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database, session_secret: &[u8]) -> Self {
        let clock: Clock = Arc::new(Utc::now);
        let notifier = Notifier::new(storage.clone(), clock.clone());
        Self::build(
            metrics,
            storage,
            SessionValidator::new(session_secret),
            clock,
            notifier,
        )
    }

    fn build(
        metrics: PrometheusHandle,
        storage: Database,
        sessions: SessionValidator,
        clock: Clock,
        notifier: Notifier,
    ) -> Self {
        let references = ReferenceAccessor::new(storage.clone(), clock.clone());
        let tasks = TaskAccessor::new(
            storage.clone(),
            references.clone(),
            notifier.clone(),
            clock.clone(),
        );
        let leave = LeaveAccessor::new(storage.clone(), references.clone(), notifier, clock.clone());
        let notifications = NotificationAccessor::new(storage.clone(), clock.clone());
        Self {
            metrics,
            storage,
            clock,
            sessions,
            tasks,
            leave,
            references,
            notifications,
        }
    }

    /// Pins the clock and delivers notifications before handlers return.
    #[cfg(test)]
    pub fn with_clock(self, clock: Clock) -> Self {
        let notifier = Notifier::inline(self.storage.clone(), clock.clone());
        Self::build(self.metrics, self.storage, self.sessions, clock, notifier)
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn sessions(&self) -> &SessionValidator {
        &self.sessions
    }

    pub fn tasks(&self) -> &TaskAccessor {
        &self.tasks
    }

    pub fn leave(&self) -> &LeaveAccessor {
        &self.leave
    }

    pub fn references(&self) -> &ReferenceAccessor {
        &self.references
    }

    pub fn notifications(&self) -> &NotificationAccessor {
        &self.notifications
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .merge(api::routes())
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> StatusCode {
    match state.storage().ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            warn!(stage = "health", error = %err, "row store ping failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}


#[cfg(test)]
mod tests {
    use super::test_support::{call, setup_state};
    use super::*;
    use crate::session::test_support::user;
    use opsdesk_core::Role;
    use opsdesk_util::{AppConfig, Environment};

    #[tokio::test]
    async fn healthz_returns_ok() {
        let state = setup_state().await;
        let (status, _) = call(&state, "GET", "/healthz", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info_and_accessor_counts() {
        let state = setup_state().await;
        let ctx = user("u-1", Role::Employee, None);
        let (status, _) = call(&state, "GET", "/api/boards/tasks/tasks", Some(&ctx), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&state, "GET", "/metrics", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let text = body.as_str().expect("plain text body");
        assert!(text.contains("app_build_info"));
        assert!(text.contains("app_uptime_seconds"));
        assert!(text.contains("accessor_ops_total"));
    }

    #[tokio::test]
    async fn file_backed_database_keeps_records_across_restarts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("opsdesk.db").display());
        let ctx = user("u-1", Role::Manager, None);
        let config = AppConfig {
            bind_addr: "127.0.0.1:0".parse().expect("addr"),
            environment: Environment::Test,
            database_url: url,
            session_secret: crate::session::test_support::TEST_SECRET.to_vec(),
        };

        let id = {
            let database = Database::connect(&config.database_url).await.expect("connect");
            database.run_migrations().await.expect("migrations");
            let state = AppState::new(
                telemetry::init_metrics().expect("metrics"),
                database,
                &config.session_secret,
            )
            .with_clock(crate::accessor::test_support::ticking_clock(test_support::START));
            let (status, body) = call(
                &state,
                "POST",
                "/api/boards/dev/tasks",
                Some(&ctx),
                Some(serde_json::json!({ "name": "Persisted" })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            body["id"].as_str().expect("id").to_string()
        };

        let database = Database::connect(&config.database_url).await.expect("reconnect");
        database.run_migrations().await.expect("migrations are idempotent");
        let state = AppState::new(
            telemetry::init_metrics().expect("metrics"),
            database,
            &config.session_secret,
        )
        .with_clock(crate::accessor::test_support::ticking_clock(test_support::START));
        let (status, body) = call(
            &state,
            "GET",
            &format!("/api/boards/dev/tasks/{id}"),
            Some(&ctx),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Persisted");
    }
}
