//! Request metering and daily quota enforcement.

pub mod config;
pub mod exits;
pub mod ledger;
pub mod metrics;

use std::fmt;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use ledger::{Admission, UsageLedger};

pub use config::{ConfigError, MonetizationConfig};
pub use metrics::{MetricsSnapshot, MonetizationEvent, MonetizationMetrics, Outcome};

/// Stable metering identity. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClientKey(String);

impl ClientKey {
    /// Returns `None` for empty or whitespace-only input.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return None;
        }
        Some(Self(raw))
    }

    pub fn from_peer(addr: Option<IpAddr>) -> Self {
        match addr {
            Some(addr) => Self(format!("ip:{addr}")),
            None => Self("ip:unknown".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    #[default]
    Free,
    Premium,
    Internal,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Free, Plan::Premium, Plan::Internal];

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "FREE",
            Plan::Premium => "PREMIUM",
            Plan::Internal => "INTERNAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|plan| plan.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DailyCap {
    Limited(u64),
    Unlimited,
}

impl DailyCap {
    pub fn limit(self) -> Option<u64> {
        match self {
            DailyCap::Limited(limit) => Some(limit),
            DailyCap::Unlimited => None,
        }
    }
}

/// Outcome of a quota check for one client on one UTC day.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub client_key: ClientKey,
    pub plan: Plan,
    pub usage_today: u64,
    pub daily_cap: DailyCap,
    /// `None` when the cap is unlimited.
    pub remaining: Option<u64>,
    /// Next UTC midnight; only set on denial.
    pub retry_at_utc: Option<OffsetDateTime>,
    /// False when monetization is disabled and nothing was counted.
    pub metered: bool,
}

impl Decision {
    fn new(
        allowed: bool,
        client_key: &ClientKey,
        plan: Plan,
        usage_today: u64,
        daily_cap: DailyCap,
        metered: bool,
    ) -> Self {
        Self {
            allowed,
            client_key: client_key.clone(),
            plan,
            usage_today,
            daily_cap,
            remaining: daily_cap
                .limit()
                .map(|limit| limit.saturating_sub(usage_today)),
            retry_at_utc: None,
            metered,
        }
    }
}

/// Explicit identifier wins when non-empty; otherwise `ip:<peer>`.
pub fn resolve_identity(explicit: Option<&str>, peer: Option<IpAddr>) -> ClientKey {
    explicit
        .and_then(ClientKey::new)
        .unwrap_or_else(|| ClientKey::from_peer(peer))
}

/// Header plans are only honored when explicitly allowed; anything else is FREE.
pub fn resolve_plan(explicit: Option<&str>, header_plans_allowed: bool) -> Plan {
    if !header_plans_allowed {
        return Plan::Free;
    }
    explicit.and_then(Plan::parse).unwrap_or(Plan::Free)
}

pub fn next_utc_midnight(now: OffsetDateTime) -> OffsetDateTime {
    let now = now.to_offset(UtcOffset::UTC);
    match now.date().next_day() {
        Some(day) => day.midnight().assume_utc(),
        None => now,
    }
}

pub fn format_utc(at: OffsetDateTime) -> String {
    let at = at.to_offset(UtcOffset::UTC);
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> OffsetDateTime;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Owns the usage ledger and turns (client, plan, instant) into a [`Decision`].
///
/// The check-then-increment sequence runs under a single lock, so concurrent callers for the
/// same client can never be admitted past the cap.
pub struct QuotaGuard {
    config: MonetizationConfig,
    ledger: Mutex<UsageLedger>,
    clock: Box<dyn Clock>,
}

impl fmt::Debug for QuotaGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaGuard")
            .field("config", &self.config)
            .field("clients", &self.lock_ledger().len())
            .finish()
    }
}

impl QuotaGuard {
    pub fn new(config: MonetizationConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub fn with_clock(config: MonetizationConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            config,
            ledger: Mutex::new(UsageLedger::default()),
            clock,
        }
    }

    pub fn config(&self) -> &MonetizationConfig {
        &self.config
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now_utc()
    }

    pub fn resolve_plan(&self, explicit: Option<&str>) -> Plan {
        resolve_plan(explicit, self.config.allow_header_plans)
    }

    pub fn daily_cap(&self, plan: Plan) -> DailyCap {
        match plan {
            Plan::Free => DailyCap::Limited(self.config.free_tier_daily_requests),
            Plan::Premium | Plan::Internal => DailyCap::Unlimited,
        }
    }

    pub fn check_and_increment(
        &self,
        client_key: &ClientKey,
        plan: Plan,
        now_utc: OffsetDateTime,
    ) -> Decision {
        if !self.config.enabled {
            return Decision::new(true, client_key, plan, 0, DailyCap::Unlimited, false);
        }

        let cap = self.daily_cap(plan);
        let day = now_utc.to_offset(UtcOffset::UTC).date();
        let admission = self.lock_ledger().check_and_consume(client_key, cap, day);

        match admission {
            Admission::Admitted { usage } => {
                Decision::new(true, client_key, plan, usage, cap, true)
            }
            Admission::Denied { usage } => {
                let mut decision = Decision::new(false, client_key, plan, usage, cap, true);
                decision.retry_at_utc = Some(next_utc_midnight(now_utc));
                decision
            }
        }
    }

    /// Read-only view of what `check_and_increment` would see; never counts.
    pub fn status(&self, client_key: &ClientKey, plan: Plan, now_utc: OffsetDateTime) -> Decision {
        let cap = self.daily_cap(plan);
        let day = now_utc.to_offset(UtcOffset::UTC).date();
        let usage = self.lock_ledger().usage(client_key, day);

        let allowed = !self.config.enabled || cap.limit().is_none_or(|limit| usage < limit);
        let mut decision = Decision::new(allowed, client_key, plan, usage, cap, self.config.enabled);
        if !allowed {
            decision.retry_at_utc = Some(next_utc_midnight(now_utc));
        }
        decision
    }

    pub fn reset_all(&self) {
        self.lock_ledger().clear();
    }

    fn lock_ledger(&self) -> MutexGuard<'_, UsageLedger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn free_guard(cap: u64) -> QuotaGuard {
        QuotaGuard::new(MonetizationConfig::enabled_with_cap(cap))
    }

    fn key(raw: &str) -> ClientKey {
        ClientKey::new(raw).unwrap()
    }

    #[test]
    fn identity_prefers_explicit_id() {
        let peer = Some("1.2.3.4".parse().unwrap());
        assert_eq!(resolve_identity(Some("client-7"), peer).as_str(), "client-7");
    }

    #[test]
    fn identity_falls_back_to_peer_address() {
        let peer = Some("1.2.3.4".parse().unwrap());
        assert_eq!(resolve_identity(None, peer).as_str(), "ip:1.2.3.4");
        assert_eq!(resolve_identity(Some(""), peer).as_str(), "ip:1.2.3.4");
        assert_eq!(resolve_identity(Some("   "), peer).as_str(), "ip:1.2.3.4");
    }

    #[test]
    fn identity_is_never_empty() {
        assert_eq!(resolve_identity(None, None).as_str(), "ip:unknown");
    }

    #[test]
    fn plan_header_requires_opt_in() {
        assert_eq!(resolve_plan(Some("PREMIUM"), false), Plan::Free);
        assert_eq!(resolve_plan(Some("premium"), true), Plan::Premium);
        assert_eq!(resolve_plan(Some(" Internal "), true), Plan::Internal);
        assert_eq!(resolve_plan(Some("gold"), true), Plan::Free);
        assert_eq!(resolve_plan(None, true), Plan::Free);
    }

    #[test]
    fn free_plan_admits_exactly_cap_requests() {
        let guard = free_guard(5);
        let client = key("demo");
        let now = datetime!(2025-03-14 15:30:00 UTC);

        let decisions: Vec<Decision> = (0..6)
            .map(|_| guard.check_and_increment(&client, Plan::Free, now))
            .collect();

        let allowed: Vec<bool> = decisions.iter().map(|d| d.allowed).collect();
        assert_eq!(allowed, [true, true, true, true, true, false]);

        let remaining: Vec<Option<u64>> = decisions[..5].iter().map(|d| d.remaining).collect();
        assert_eq!(remaining, [Some(4), Some(3), Some(2), Some(1), Some(0)]);

        let denied = &decisions[5];
        assert_eq!(denied.usage_today, 5);
        assert_eq!(denied.daily_cap, DailyCap::Limited(5));
        assert_eq!(denied.remaining, Some(0));
        assert_eq!(denied.retry_at_utc, Some(datetime!(2025-03-15 00:00:00 UTC)));
        assert!(decisions[..5].iter().all(|d| d.retry_at_utc.is_none()));
    }

    #[test]
    fn denial_does_not_change_usage() {
        let guard = free_guard(1);
        let client = key("demo");
        let now = datetime!(2025-03-14 08:00:00 UTC);

        guard.check_and_increment(&client, Plan::Free, now);
        for _ in 0..3 {
            let decision = guard.check_and_increment(&client, Plan::Free, now);
            assert!(!decision.allowed);
            assert_eq!(decision.usage_today, 1);
        }
    }

    #[test]
    fn unlimited_plans_always_admit() {
        let guard = free_guard(1);
        let now = datetime!(2025-03-14 08:00:00 UTC);
        for plan in [Plan::Premium, Plan::Internal] {
            let client = key(plan.as_str());
            for expected in 1..=10 {
                let decision = guard.check_and_increment(&client, plan, now);
                assert!(decision.allowed);
                assert_eq!(decision.usage_today, expected);
                assert_eq!(decision.daily_cap, DailyCap::Unlimited);
                assert_eq!(decision.remaining, None);
            }
        }
    }

    #[test]
    fn status_never_counts() {
        let guard = free_guard(3);
        let client = key("demo");
        let now = datetime!(2025-03-14 08:00:00 UTC);

        guard.check_and_increment(&client, Plan::Free, now);
        for _ in 0..5 {
            let status = guard.status(&client, Plan::Free, now);
            assert_eq!(status.usage_today, 1);
            assert_eq!(status.remaining, Some(2));
            assert!(status.allowed);
        }
    }

    #[test]
    fn status_reports_exhausted_quota() {
        let guard = free_guard(1);
        let client = key("demo");
        let now = datetime!(2025-03-14 23:59:59 UTC);

        guard.check_and_increment(&client, Plan::Free, now);
        let status = guard.status(&client, Plan::Free, now);
        assert!(!status.allowed);
        assert_eq!(status.retry_at_utc, Some(datetime!(2025-03-15 00:00:00 UTC)));
    }

    #[test]
    fn new_utc_day_starts_fresh() {
        let guard = free_guard(2);
        let client = key("demo");
        let day_one = datetime!(2025-03-14 23:59:59 UTC);
        let day_two = datetime!(2025-03-15 00:00:00 UTC);

        guard.check_and_increment(&client, Plan::Free, day_one);
        guard.check_and_increment(&client, Plan::Free, day_one);
        assert!(!guard.check_and_increment(&client, Plan::Free, day_one).allowed);

        assert_eq!(guard.status(&client, Plan::Free, day_two).usage_today, 0);
        let decision = guard.check_and_increment(&client, Plan::Free, day_two);
        assert!(decision.allowed);
        assert_eq!(decision.usage_today, 1);
        assert_eq!(decision.remaining, Some(1));
    }

    #[test]
    fn request_stamped_before_midnight_cannot_reset_todays_counts() {
        let guard = free_guard(1);
        let after_midnight = datetime!(2025-03-15 00:00:01 UTC);
        let before_midnight = datetime!(2025-03-14 23:59:59 UTC);

        assert!(guard.check_and_increment(&key("a"), Plan::Free, after_midnight).allowed);
        assert!(!guard.check_and_increment(&key("a"), Plan::Free, after_midnight).allowed);

        guard.check_and_increment(&key("b"), Plan::Free, before_midnight);

        assert_eq!(guard.status(&key("a"), Plan::Free, after_midnight).usage_today, 1);
        let again = guard.check_and_increment(&key("a"), Plan::Free, after_midnight);
        assert!(!again.allowed);
        assert_eq!(again.usage_today, 1);
    }

    #[test]
    fn day_boundary_uses_utc_not_local_offset() {
        let guard = free_guard(1);
        let client = key("demo");
        // 23:30 at -05:00 is already the next UTC day.
        let late_local = datetime!(2025-03-14 23:30:00 -5);
        let same_utc_day = datetime!(2025-03-15 06:00:00 UTC);

        assert!(guard.check_and_increment(&client, Plan::Free, late_local).allowed);
        let denied = guard.check_and_increment(&client, Plan::Free, same_utc_day);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_at_utc, Some(datetime!(2025-03-16 00:00:00 UTC)));
    }

    #[test]
    fn disabled_guard_is_bypassed() {
        let guard = QuotaGuard::new(MonetizationConfig::default());
        let client = key("demo");
        let now = datetime!(2025-03-14 08:00:00 UTC);
        for _ in 0..100 {
            let decision = guard.check_and_increment(&client, Plan::Free, now);
            assert!(decision.allowed);
            assert!(!decision.metered);
            assert_eq!(decision.usage_today, 0);
        }
        assert_eq!(guard.status(&client, Plan::Free, now).usage_today, 0);
    }

    #[test]
    fn reset_all_clears_usage() {
        let guard = free_guard(1);
        let client = key("demo");
        let now = datetime!(2025-03-14 08:00:00 UTC);

        guard.check_and_increment(&client, Plan::Free, now);
        assert!(!guard.check_and_increment(&client, Plan::Free, now).allowed);
        guard.reset_all();
        assert!(guard.check_and_increment(&client, Plan::Free, now).allowed);
    }

    #[test]
    fn clients_are_metered_independently() {
        let guard = free_guard(1);
        let now = datetime!(2025-03-14 08:00:00 UTC);
        assert!(guard.check_and_increment(&key("a"), Plan::Free, now).allowed);
        assert!(guard.check_and_increment(&key("b"), Plan::Free, now).allowed);
        assert!(!guard.check_and_increment(&key("a"), Plan::Free, now).allowed);
    }

    #[test]
    fn formats_rfc3339_in_utc() {
        assert_eq!(
            format_utc(datetime!(2025-03-15 00:00:00 UTC)),
            "2025-03-15T00:00:00Z"
        );
        assert_eq!(
            format_utc(datetime!(2025-03-14 20:00:00 -4)),
            "2025-03-15T00:00:00Z"
        );
    }
}
