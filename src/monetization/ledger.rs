use std::collections::HashMap;

use time::Date;

use super::{ClientKey, DailyCap};

/// Per-client request counters for the current UTC day.
///
/// Each client owns a single slot holding the day it was last metered on. A slot from an
/// older day reads as zero and is overwritten on the client's next admission.
#[derive(Debug, Default)]
pub struct UsageLedger {
    usage: HashMap<ClientKey, DayUsage>,
    last_gc_day: Option<Date>,
}

#[derive(Debug, Clone, Copy)]
struct DayUsage {
    day: Date,
    count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Counted; `usage` is the post-increment count.
    Admitted { usage: u64 },
    /// Not counted; `usage` is the unchanged count that hit the cap.
    Denied { usage: u64 },
}

impl UsageLedger {
    /// A `day` older than the newest day seen is charged to that newest day, so a request
    /// stamped before midnight but locked after it can neither sweep today's slots nor
    /// reopen a client's exhausted quota.
    pub fn check_and_consume(&mut self, key: &ClientKey, cap: DailyCap, day: Date) -> Admission {
        let day = match self.last_gc_day {
            Some(last) if day <= last => last,
            _ => {
                self.usage.retain(|_, usage| usage.day == day);
                self.last_gc_day = Some(day);
                day
            }
        };

        let usage = self
            .usage
            .entry(key.clone())
            .or_insert(DayUsage { day, count: 0 });

        if usage.day < day {
            usage.day = day;
            usage.count = 0;
        }

        if let DailyCap::Limited(limit) = cap {
            if usage.count >= limit {
                return Admission::Denied { usage: usage.count };
            }
        }

        usage.count = usage.count.saturating_add(1);
        Admission::Admitted { usage: usage.count }
    }

    pub fn usage(&self, key: &ClientKey, day: Date) -> u64 {
        self.usage
            .get(key)
            .filter(|usage| usage.day == day)
            .map(|usage| usage.count)
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.usage.clear();
        self.last_gc_day = None;
    }

    pub fn len(&self) -> usize {
        self.usage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usage.is_empty()
    }
}
