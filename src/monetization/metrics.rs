use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::{ClientKey, Decision, Plan, format_utc};

pub const DEFAULT_MAX_EVENTS: usize = 200;
const TOP_CLIENTS: usize = 10;
const RECENT_EVENTS: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Allowed,
    DeniedCap,
    TestAllowed,
    TestDeniedCap,
}

impl Outcome {
    pub fn for_decision(decision: &Decision, test: bool) -> Self {
        match (decision.allowed, test) {
            (true, false) => Outcome::Allowed,
            (false, false) => Outcome::DeniedCap,
            (true, true) => Outcome::TestAllowed,
            (false, true) => Outcome::TestDeniedCap,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetizationEvent {
    pub ts: String,
    pub client_id: String,
    pub plan: Plan,
    pub outcome: Outcome,
    pub usage: u64,
    pub cap: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub plans: BTreeMap<Plan, u64>,
    pub clients_top: Vec<(String, u64)>,
    pub recent: Vec<MonetizationEvent>,
}

/// In-memory monetization counters plus a bounded log of recent decisions.
#[derive(Debug)]
pub struct MonetizationMetrics {
    plan_totals: BTreeMap<Plan, u64>,
    client_totals: HashMap<ClientKey, u64>,
    events: VecDeque<MonetizationEvent>,
    max_events: usize,
}

impl Default for MonetizationMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

impl MonetizationMetrics {
    pub fn new(max_events: usize) -> Self {
        let max_events = max_events.max(1);
        Self {
            plan_totals: BTreeMap::new(),
            client_totals: HashMap::new(),
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    pub fn record(&mut self, decision: &Decision, outcome: Outcome, ts: time::OffsetDateTime) {
        let plan_total = self.plan_totals.entry(decision.plan).or_insert(0);
        *plan_total = plan_total.saturating_add(1);

        let client_total = self
            .client_totals
            .entry(decision.client_key.clone())
            .or_insert(0);
        *client_total = client_total.saturating_add(1);

        if self.events.len() == self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(MonetizationEvent {
            ts: format_utc(ts),
            client_id: decision.client_key.to_string(),
            plan: decision.plan,
            outcome,
            usage: decision.usage_today,
            cap: decision.daily_cap.limit(),
        });
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut clients_top: Vec<(String, u64)> = self
            .client_totals
            .iter()
            .map(|(client, total)| (client.to_string(), *total))
            .collect();
        clients_top.sort_by(|(a_id, a), (b_id, b)| b.cmp(a).then_with(|| a_id.cmp(b_id)));
        clients_top.truncate(TOP_CLIENTS);

        let skip = self.events.len().saturating_sub(RECENT_EVENTS);
        MetricsSnapshot {
            plans: self.plan_totals.clone(),
            clients_top,
            recent: self.events.iter().skip(skip).cloned().collect(),
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}
