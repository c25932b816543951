//! Mission scheduler: one polling cycle per call.
//!
//! A cycle runs `login → fetch user/mission → attempt completion → branch →
//! recheck → sleep`. The branch taken after the first confirmation never
//! decides how long to sleep; the sleep always comes from a fresh mission
//! read in the recheck step.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::api::types::{decode_mission, DecodeError, Mission};
use crate::api::GameClient;
use crate::auth::{self, LoginOutcome};
use crate::config::ScheduleConfig;
use crate::error::BotResult;
use crate::events::{format_hms, AccountLog, Category};
use crate::mission;
use crate::session::Session;
use crate::subscription;
use crate::telegram::TelegramSession;

/// Which path a cycle took after the first completion confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptBranch {
    /// Mission reported completed.
    Completed,
    /// Mission is active and needs a channel join first.
    NeedsSubscription,
    /// Type-2 mission that did not complete; give upstream time to settle.
    Type2Pending,
    /// No usable mission in the response, or a status we do not act on.
    Indeterminate,
}

/// Why the account sleeps at the end of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepReason {
    /// Login failed; retry after the fixed backoff.
    LoginBackoff,
    /// Sleeping until the mission's next eligible time.
    Schedule { wake_secs: i64 },
    /// No usable schedule; short randomized pause.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    pub duration: Duration,
    pub reason: SleepReason,
}

/// What one cycle did and how long it wants to sleep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// `None` when the cycle stopped at login.
    pub branch: Option<AttemptBranch>,
    /// Result of the recheck step.
    pub wake_secs: Option<i64>,
    pub plan: SleepPlan,
}

/// Pick the branch for the mission returned by the first confirmation.
pub fn classify(mission: Option<&Mission>, subscription_sequence: i64) -> AttemptBranch {
    let Some(m) = mission else {
        return AttemptBranch::Indeterminate;
    };
    if m.status.is_completed() {
        AttemptBranch::Completed
    } else if m.status.is_active()
        && (m.sequence == Some(subscription_sequence) || m.locator().is_some())
    {
        AttemptBranch::NeedsSubscription
    } else if m.mission_type == Some(2) {
        AttemptBranch::Type2Pending
    } else {
        AttemptBranch::Indeterminate
    }
}

/// Turn a wake decision into the end-of-cycle sleep.
///
/// Wakes above the configured threshold sleep until the wake time plus an
/// independently drawn extra delay; everything else takes the idle window.
pub fn plan_sleep<R: Rng + ?Sized>(wake_secs: Option<i64>, config: &ScheduleConfig, rng: &mut R) -> SleepPlan {
    match wake_secs {
        Some(wake) if wake > config.min_schedule_secs => {
            let extra = config.extra_delay.sample(rng);
            SleepPlan {
                duration: Duration::from_secs(wake as u64) + extra,
                reason: SleepReason::Schedule { wake_secs: wake },
            }
        }
        _ => SleepPlan {
            duration: config.idle_sleep.sample(rng),
            reason: SleepReason::Idle,
        },
    }
}

/// Drives one account's mission cycle.
pub struct MissionScheduler {
    session: Session,
    client: GameClient,
    telegram: Arc<dyn TelegramSession>,
    config: ScheduleConfig,
    log: AccountLog,
}

impl MissionScheduler {
    pub fn new(
        session: Session,
        client: GameClient,
        telegram: Arc<dyn TelegramSession>,
        config: ScheduleConfig,
        log: AccountLog,
    ) -> Self {
        Self {
            session,
            client,
            telegram,
            config,
            log,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn client(&self) -> &GameClient {
        &self.client
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn log(&self) -> &AccountLog {
        &self.log
    }

    /// Route the client through `proxy` and record it on the session.
    pub fn switch_proxy(&mut self, proxy: Option<String>) -> BotResult<()> {
        self.client.set_proxy(proxy.as_deref())?;
        self.session.proxy = proxy;
        Ok(())
    }

    /// Run one cycle and sleep for the planned duration.
    pub async fn run_cycle(&mut self) -> BotResult<CycleReport> {
        let report = self.poll().await?;
        self.sleep(&report.plan).await;
        Ok(report)
    }

    /// Run one cycle up to (not including) the final sleep.
    ///
    /// Only session-fatal conditions are returned as errors.
    pub async fn poll(&mut self) -> BotResult<CycleReport> {
        self.log.debug(Category::General, "Starting mission cycle");

        let user = match auth::login(&self.client, &mut self.session, self.telegram.as_ref(), &self.log).await? {
            LoginOutcome::Authenticated(user) => user,
            LoginOutcome::Failed => {
                self.log.error(Category::Login, "Login failed, skipping this cycle");
                return Ok(CycleReport {
                    branch: None,
                    wake_secs: None,
                    plan: SleepPlan {
                        duration: self.config.login_backoff,
                        reason: SleepReason::LoginBackoff,
                    },
                });
            }
        };

        self.log.success(
            Category::Balance,
            format!("Session: {}, balance: {}", user.display_name(), user.balance_text()),
        );
        mission::fetch_mission(&self.client, &self.session, &self.log).await;

        self.log.info(Category::Mission, "Attempting to confirm the current mission...");
        let attempted = self.confirm().await;
        let branch = classify(attempted.as_ref(), self.config.subscription_sequence);

        match (branch, attempted) {
            (AttemptBranch::Completed, _) => {
                self.log.success(Category::Mission, "Mission confirmed");
            }
            (AttemptBranch::NeedsSubscription, Some(m)) => {
                self.log.info(Category::Mission, "Mission is active and requires a subscription");
                subscription::resolve_and_execute(
                    &self.client,
                    &self.session,
                    self.telegram.as_ref(),
                    &m,
                    &self.log,
                )
                .await;
                self.log.info(Category::Mission, "Confirming mission after subscription...");
                match self.confirm().await {
                    Some(after) if after.status.is_completed() => {
                        self.log.success(Category::Mission, "Mission confirmed after subscription");
                    }
                    Some(after) => self.log.error(
                        Category::Mission,
                        format!("Mission not confirmed after subscription (status {})", after.status),
                    ),
                    None => self.log.error(
                        Category::Mission,
                        "No usable response when confirming after subscription",
                    ),
                }
            }
            (AttemptBranch::Type2Pending, attempted) => {
                let status = attempted
                    .map(|m| m.status.to_string())
                    .unwrap_or_default();
                let wait = self.config.type2_wait.sample(&mut rand::thread_rng());
                self.log.info(
                    Category::Sleep,
                    format!(
                        "Type-2 mission still {}, waiting {:.0}s before rechecking",
                        status,
                        wait.as_secs_f64()
                    ),
                );
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
            }
            (_, attempted) => {
                let status = attempted
                    .map(|m| m.status.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                self.log.info(
                    Category::Mission,
                    format!("Mission needs no action this cycle (status {})", status),
                );
            }
        }

        let wake_secs = mission::recheck(&self.client, &self.session, &self.log).await;
        let plan = plan_sleep(wake_secs, &self.config, &mut rand::thread_rng());
        Ok(CycleReport {
            branch: Some(branch),
            wake_secs,
            plan,
        })
    }

    /// Issue `check(completed=true)` and decode the mission it returns.
    async fn confirm(&self) -> Option<Mission> {
        let Some(body) = self.client.check_mission(&self.session, true).await else {
            self.log.error(Category::Mission, "Mission confirmation request failed");
            return None;
        };
        match decode_mission(&body) {
            Ok(m) => {
                self.log.info(
                    Category::Mission,
                    format!("Mission status after confirmation: {}", m.status),
                );
                Some(m)
            }
            Err(DecodeError::Unsuccessful) => {
                self.log.error(
                    Category::Mission,
                    format!("Mission confirmation rejected: {}", body),
                );
                None
            }
            Err(e) => {
                self.log.warn(
                    Category::Mission,
                    format!("No mission data in confirmation response: {}", e),
                );
                None
            }
        }
    }

    async fn sleep(&self, plan: &SleepPlan) {
        let secs = plan.duration.as_secs();
        match plan.reason {
            SleepReason::LoginBackoff => self.log.info(
                Category::Sleep,
                format!("Retrying login in {}", format_hms(secs)),
            ),
            SleepReason::Schedule { .. } => self.log.info(
                Category::Sleep,
                format!("Sleeping {} until the next mission", format_hms(secs)),
            ),
            SleepReason::Idle => self.log.debug(
                Category::Sleep,
                format!("Standard pause of {} before the next cycle", format_hms(secs)),
            ),
        }
        if !plan.duration.is_zero() {
            tokio::time::sleep(plan.duration).await;
        }
        if matches!(plan.reason, SleepReason::Schedule { .. }) {
            self.log.info(Category::Sleep, "Woke up");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MissionStatus;
    use crate::config::SecondsWindow;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mission(status: &str, sequence: Option<i64>, mission_type: Option<i64>, url: Option<&str>) -> Mission {
        Mission {
            status: MissionStatus::new(status),
            sequence,
            mission_type,
            start_at: None,
            expires_at: None,
            streak: None,
            title: None,
            reward: None,
            channel_url: None,
            link: None,
            url: url.map(str::to_string),
        }
    }

    #[test]
    fn classify_completed_wins() {
        let m = mission("COMPLETED", Some(1), Some(2), Some("https://t.me/x"));
        assert_eq!(classify(Some(&m), 1), AttemptBranch::Completed);
    }

    #[test]
    fn classify_active_subscription_by_sequence_or_locator() {
        assert_eq!(
            classify(Some(&mission("ACTIVE", Some(1), None, None)), 1),
            AttemptBranch::NeedsSubscription
        );
        assert_eq!(
            classify(Some(&mission("ACTIVE", Some(7), Some(2), Some("https://t.me/x"))), 1),
            AttemptBranch::NeedsSubscription
        );
        assert_eq!(
            classify(Some(&mission("ACTIVE", Some(7), None, None)), 1),
            AttemptBranch::Indeterminate
        );
    }

    #[test]
    fn classify_type2_pending() {
        assert_eq!(
            classify(Some(&mission("ACTIVE", Some(4), Some(2), None)), 1),
            AttemptBranch::Type2Pending
        );
        assert_eq!(
            classify(Some(&mission("NOT_COMPLETED", Some(1), Some(2), None)), 1),
            AttemptBranch::Type2Pending
        );
    }

    #[test]
    fn classify_missing_mission_is_indeterminate() {
        assert_eq!(classify(None, 1), AttemptBranch::Indeterminate);
        assert_eq!(
            classify(Some(&mission("WEIRD", None, None, None)), 1),
            AttemptBranch::Indeterminate
        );
    }

    #[test]
    fn long_wake_adds_extra_delay() {
        let config = ScheduleConfig {
            extra_delay: SecondsWindow { min: 10.0, max: 20.0 },
            ..ScheduleConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let plan = plan_sleep(Some(3_600), &config, &mut rng);
            assert_eq!(plan.reason, SleepReason::Schedule { wake_secs: 3_600 });
            let secs = plan.duration.as_secs();
            assert!((3_610..=3_620).contains(&secs), "{}", secs);
        }
    }

    #[test]
    fn fractional_extra_delay_is_kept() {
        let config = ScheduleConfig {
            extra_delay: SecondsWindow { min: 0.5, max: 0.7 },
            ..ScheduleConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(9);
        let plan = plan_sleep(Some(120), &config, &mut rng);
        assert!(plan.duration >= Duration::from_millis(120_500));
        assert!(plan.duration <= Duration::from_millis(120_700));
    }

    #[test]
    fn short_or_unknown_wake_uses_idle_window() {
        let config = ScheduleConfig {
            idle_sleep: SecondsWindow { min: 5.0, max: 6.0 },
            ..ScheduleConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        for wake in [None, Some(0), Some(59), Some(60)] {
            let plan = plan_sleep(wake, &config, &mut rng);
            assert_eq!(plan.reason, SleepReason::Idle);
            let secs = plan.duration.as_secs_f64();
            assert!((5.0..=6.0).contains(&secs));
        }
        let plan = plan_sleep(Some(61), &config, &mut rng);
        assert_eq!(plan.reason, SleepReason::Schedule { wake_secs: 61 });
    }
}
