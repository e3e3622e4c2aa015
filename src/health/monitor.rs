//! Periodic reachability checks of the external services.
//!
//! Every cycle probes all configured endpoints concurrently. A probe that
//! errors, answers non-2xx or runs past `probe_timeout` marks its service
//! down; nothing is retried within a cycle. One slow endpoint therefore
//! delays a cycle by at most `probe_timeout`.
//!
//! Status is advisory: the pipeline still attempts every stage call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{AppConfig, ServicesConfig};
use crate::services::http;
use crate::services::ServiceError;
use crate::session::SessionHandle;

use super::status::{ServiceHealth, ServiceId, ServiceStatus};

// ---------------------------------------------------------------------------
// Probe seam
// ---------------------------------------------------------------------------

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok(())` when the service behind `base_url` reports healthy.
    async fn probe(&self, base_url: &str) -> Result<(), ServiceError>;
}

/// `GET {base_url}/health`; any 2xx counts as up.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: http::client(timeout),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, base_url: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .get(http::endpoint(base_url, "health"))
            .send()
            .await?;
        http::ensure_success(response).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// HealthMonitor
// ---------------------------------------------------------------------------

pub struct HealthMonitor {
    targets: Vec<(ServiceId, String)>,
    probe: Arc<dyn HealthProbe>,
    probe_timeout: Duration,
    interval: Duration,
    session: SessionHandle,
    status: watch::Sender<ServiceStatus>,
}

impl HealthMonitor {
    pub fn new(config: &AppConfig, probe: Arc<dyn HealthProbe>, session: SessionHandle) -> Self {
        let (status, _) = watch::channel(ServiceStatus::default());
        Self {
            targets: targets(&config.services),
            probe,
            probe_timeout: config.health.probe_timeout(),
            interval: config.health.interval(),
            session,
            status,
        }
    }

    /// Monitor backed by [`HttpProbe`].
    pub fn http(config: &AppConfig, session: SessionHandle) -> Self {
        let probe = Arc::new(HttpProbe::new(config.health.probe_timeout()));
        Self::new(config, probe, session)
    }

    /// Probe every endpoint concurrently and return the combined status.
    /// Does not publish anything; see [`check_now`](Self::check_now).
    pub async fn check_all(&self) -> ServiceStatus {
        let checks = self.targets.iter().map(|(id, url)| async move {
            let up = match tokio::time::timeout(self.probe_timeout, self.probe.probe(url)).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    log::debug!("health: {id} down: {e}");
                    false
                }
                Err(_) => {
                    log::debug!("health: {id} down: no answer within {:?}", self.probe_timeout);
                    false
                }
            };
            (
                *id,
                ServiceHealth {
                    up,
                    checked_at: Utc::now(),
                },
            )
        });
        ServiceStatus::from_results(join_all(checks).await)
    }

    /// Run a cycle now, store the result in the session and notify
    /// subscribers.
    pub async fn check_now(&self) -> ServiceStatus {
        let status = self.check_all().await;
        let down = status.down();
        if down.is_empty() {
            log::debug!("health: all services up");
        } else {
            let names: Vec<_> = down.iter().map(ServiceId::as_str).collect();
            log::warn!("health: down: {}", names.join(", "));
        }

        self.session.replace_services(status.clone());
        self.status.send_replace(status.clone());
        status
    }

    /// Follows every published status.
    pub fn subscribe(&self) -> watch::Receiver<ServiceStatus> {
        self.status.subscribe()
    }

    /// Check immediately, then every `interval`, until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.check_now().await;
            }
        })
    }
}

fn targets(services: &ServicesConfig) -> Vec<(ServiceId, String)> {
    ServiceId::ALL
        .iter()
        .map(|id| {
            let url = match id {
                ServiceId::Recognition => &services.recognition_url,
                ServiceId::Generation => &services.generation_url,
                ServiceId::Synthesis => &services.synthesis_url,
                ServiceId::Animation => &services.animation_url,
                ServiceId::Coordination => &services.coordination_url,
            };
            (*id, url.clone())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::services::stub::{Route, StubServer};
    use tokio::time::Instant;

    #[derive(Clone, Copy)]
    enum Answer {
        Up,
        Down,
        Hang,
    }

    /// Answers per base URL; unknown URLs are up.
    struct ScriptedProbe {
        answers: Mutex<HashMap<String, Answer>>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(answers: &[(&str, Answer)]) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(
                    answers
                        .iter()
                        .map(|(url, a)| (url.to_string(), *a))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, url: &str, answer: Answer) {
            self.answers.lock().unwrap().insert(url.to_string(), answer);
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self, base_url: &str) -> Result<(), ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = self
                .answers
                .lock()
                .unwrap()
                .get(base_url)
                .copied()
                .unwrap_or(Answer::Up);
            match answer {
                Answer::Up => Ok(()),
                Answer::Down => Err(ServiceError::Unavailable),
                Answer::Hang => std::future::pending().await,
            }
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.services = ServicesConfig {
            recognition_url: "http://asr".into(),
            generation_url: "http://llm".into(),
            synthesis_url: "http://tts".into(),
            animation_url: "http://anim".into(),
            coordination_url: "http://coord".into(),
        };
        config
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_endpoint_is_bounded_by_probe_timeout() {
        let probe = ScriptedProbe::new(&[("http://anim", Answer::Hang), ("http://tts", Answer::Down)]);
        let monitor = HealthMonitor::new(&config(), probe, SessionHandle::new());

        let started = Instant::now();
        let status = monitor.check_all().await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_millis(5_100));
        assert!(status.is_up(ServiceId::Recognition));
        assert!(status.is_up(ServiceId::Generation));
        assert!(status.is_up(ServiceId::Coordination));
        assert_eq!(status.down(), vec![ServiceId::Synthesis, ServiceId::Animation]);
    }

    #[tokio::test]
    async fn check_all_publishes_nothing_check_now_does() {
        let session = SessionHandle::new();
        let probe = ScriptedProbe::new(&[]);
        let monitor = HealthMonitor::new(&config(), probe, session.clone());
        let mut updates = monitor.subscribe();

        let status = monitor.check_all().await;
        assert!(status.all_up());
        assert!(session.services().is_empty());
        assert!(!updates.has_changed().unwrap());

        let status = monitor.check_now().await;
        assert_eq!(session.services(), status);
        assert!(updates.has_changed().unwrap());
        assert_eq!(*updates.borrow_and_update(), status);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_monitor_checks_immediately_then_on_interval() {
        let session = SessionHandle::new();
        let probe = ScriptedProbe::new(&[]);
        let monitor = Arc::new(HealthMonitor::new(&config(), probe.clone(), session.clone()));
        let mut updates = monitor.subscribe();

        let task = Arc::clone(&monitor).spawn();
        updates.changed().await.unwrap();
        assert!(updates.borrow_and_update().all_up());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 5);

        probe.set("http://llm", Answer::Down);
        let before = Instant::now();
        updates.changed().await.unwrap();
        assert!(before.elapsed() >= Duration::from_secs(29));
        assert_eq!(updates.borrow_and_update().down(), vec![ServiceId::Generation]);
        assert_eq!(session.services().down(), vec![ServiceId::Generation]);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 10);

        task.abort();
    }

    #[tokio::test]
    async fn http_probe_requires_2xx_from_health_endpoint() {
        let healthy = StubServer::start(vec![Route::json(
            "GET",
            "/health",
            200,
            serde_json::json!({"status": "healthy"}),
        )])
        .await;
        let broken = StubServer::start(vec![Route::json(
            "GET",
            "/health",
            500,
            serde_json::json!({"status": "unhealthy"}),
        )])
        .await;

        let probe = HttpProbe::new(Duration::from_secs(5));
        assert!(probe.probe(healthy.base()).await.is_ok());
        assert!(probe.probe(broken.base()).await.is_err());
        assert_eq!(healthy.requests()[0].path, "/health");
    }

    #[test]
    fn every_service_is_a_target() {
        let ids: Vec<_> = targets(&config().services).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ServiceId::ALL.to_vec());
    }
}
