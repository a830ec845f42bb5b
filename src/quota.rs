//! Usage/entitlement gate: a per-user daily counter checked against the
//! free-tier limit before any generation action. Subscribed (pro) users bypass
//! the counter until their period ends. Checking and counting happen under one
//! lock acquisition so concurrent requests cannot slip past the limit;
//! exceeding it is a policy rejection, not a fault.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::info;

/// Returned when a free-tier user is out of generations for the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaExceeded {
  pub limit: u32,
}

pub struct UsageGate {
  daily_limit: u32,
  /// Per-user (day, count); stale days are overwritten on first touch.
  counts: RwLock<HashMap<String, (NaiveDate, u32)>>,
  pro_until: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl UsageGate {
  pub fn new(daily_limit: u32) -> Self {
    Self {
      daily_limit,
      counts: RwLock::new(HashMap::new()),
      pro_until: RwLock::new(HashMap::new()),
    }
  }

  pub async fn is_pro(&self, user_id: &str) -> bool {
    self.is_pro_at(user_id, Utc::now()).await
  }

  /// Consume one generation action: check today's count against the limit and
  /// increment it in the same write-lock acquisition. Pro users always pass
  /// without counting.
  pub async fn try_consume(&self, user_id: &str) -> Result<(), QuotaExceeded> {
    self.try_consume_on(user_id, Utc::now()).await
  }

  /// Generations left today, None for pro users (unlimited).
  pub async fn remaining(&self, user_id: &str) -> Option<u32> {
    if self.is_pro(user_id).await {
      return None;
    }
    let today = Utc::now().date_naive();
    let counts = self.counts.read().await;
    let used = match counts.get(user_id) {
      Some((day, n)) if *day == today => *n,
      _ => 0,
    };
    Some(self.daily_limit.saturating_sub(used))
  }

  /// Activate (or extend) a subscription, e.g. from the payment webhook.
  pub async fn activate(&self, user_id: &str, until: DateTime<Utc>) {
    info!(target: "quota", %user_id, %until, "Subscription activated");
    self.pro_until.write().await.insert(user_id.to_string(), until);
  }

  async fn is_pro_at(&self, user_id: &str, now: DateTime<Utc>) -> bool {
    self
      .pro_until
      .read()
      .await
      .get(user_id)
      .map(|until| *until > now)
      .unwrap_or(false)
  }

  async fn try_consume_on(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), QuotaExceeded> {
    if self.is_pro_at(user_id, now).await {
      return Ok(());
    }
    let today = now.date_naive();
    let mut counts = self.counts.write().await;
    let entry = counts.entry(user_id.to_string()).or_insert((today, 0));
    if entry.0 != today {
      *entry = (today, 0);
    }
    if entry.1 >= self.daily_limit {
      return Err(QuotaExceeded { limit: self.daily_limit });
    }
    entry.1 += 1;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone};

  fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
  }

  #[tokio::test]
  async fn free_user_is_blocked_after_daily_limit() {
    let gate = UsageGate::new(3);
    let now = noon(2026, 8, 23);
    for _ in 0..3 {
      gate.try_consume_on("u1", now).await.unwrap();
    }
    assert_eq!(gate.try_consume_on("u1", now).await, Err(QuotaExceeded { limit: 3 }));
  }

  #[tokio::test]
  async fn counter_resets_on_day_rollover() {
    let gate = UsageGate::new(3);
    let today = noon(2026, 8, 23);
    for _ in 0..3 {
      gate.try_consume_on("u1", today).await.unwrap();
    }
    assert!(gate.try_consume_on("u1", today).await.is_err());
    let tomorrow = today + Duration::days(1);
    assert!(gate.try_consume_on("u1", tomorrow).await.is_ok());
  }

  #[tokio::test]
  async fn pro_user_bypasses_the_limit_until_period_end() {
    let gate = UsageGate::new(3);
    let now = noon(2026, 8, 23);
    gate.activate("u1", now + Duration::days(30)).await;
    for _ in 0..10 {
      gate.try_consume_on("u1", now).await.unwrap();
    }
    // Expired subscription falls back to the counter.
    let later = now + Duration::days(31);
    for _ in 0..3 {
      gate.try_consume_on("u1", later).await.unwrap();
    }
    assert!(gate.try_consume_on("u1", later).await.is_err());
    assert!(gate.try_consume_on("u1", now).await.is_ok());
  }

  #[tokio::test]
  async fn users_are_counted_independently() {
    let gate = UsageGate::new(1);
    let now = noon(2026, 8, 23);
    gate.try_consume_on("u1", now).await.unwrap();
    assert!(gate.try_consume_on("u1", now).await.is_err());
    assert!(gate.try_consume_on("u2", now).await.is_ok());
  }

  #[tokio::test]
  async fn concurrent_consumers_cannot_exceed_the_limit() {
    let gate = UsageGate::new(1);
    let now = noon(2026, 8, 23);
    // With one generation left, exactly one of two simultaneous requests may
    // pass regardless of interleaving.
    let (a, b) = tokio::join!(gate.try_consume_on("u1", now), gate.try_consume_on("u1", now));
    assert!(a.is_ok() ^ b.is_ok());
  }
}
