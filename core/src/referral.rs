//! Referral invites, affiliate networks and multi-level commissions.
//!
//! An invite goes pending → accepted exactly once, or pending → expired.
//! Commissions are derived only from finalized weekly records of recruited
//! drivers who are currently active; per-level rates come from config.

use crate::{
    calculator::DriverWeeklyRecord,
    config::ReferralConfig,
    error::{PayrollError, PayrollResult},
    money::round2,
    roster::Driver,
    types::{DriverId, PaymentStatus, WeekId},
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Expired,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending  => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Expired  => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending"  => Some(InviteStatus::Pending),
            "accepted" => Some(InviteStatus::Accepted),
            "expired"  => Some(InviteStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralInvite {
    pub code: String,
    pub referrer_id: DriverId,
    pub status: InviteStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_by: Option<DriverId>,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffiliateMember {
    pub driver_id: DriverId,
    pub joined_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffiliateNetwork {
    pub referrer_id: DriverId,
    pub members: Vec<AffiliateMember>,
    pub total_recruited: u32,
    pub active_recruited: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionLine {
    pub driver_id: DriverId,
    /// 1 = direct recruit.
    pub level: u32,
    pub base: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionReport {
    pub referrer_id: DriverId,
    pub week_id: WeekId,
    pub lines: Vec<CommissionLine>,
    pub total: Decimal,
}

/// What the store should do with an invite read inside its transaction.
#[derive(Debug)]
pub enum InviteDecision {
    Accept { driver_id: DriverId, at: DateTime<Utc> },
    Expire,
    Reject(PayrollError),
}

pub trait ReferralRepository {
    fn insert_invite(&self, invite: &ReferralInvite) -> PayrollResult<()>;

    fn get_invite(&self, code: &str) -> PayrollResult<Option<ReferralInvite>>;

    /// Inside one write transaction: read the invite and apply `decide`.
    /// `Accept` marks it accepted, links the driver to the referrer and
    /// appends to the referrer's network. `Expire` persists the expiry and
    /// fails with `InviteExpired`. `Reject` rolls back.
    fn redeem_invite<F>(&self, code: &str, decide: F) -> PayrollResult<ReferralInvite>
    where
        F: FnOnce(&ReferralInvite) -> InviteDecision;

    fn network(&self, referrer_id: &str) -> PayrollResult<AffiliateNetwork>;

    /// Recompute member activation and counters from driver status.
    fn sync_network_activation(&self, referrer_id: &str) -> PayrollResult<AffiliateNetwork>;

    fn find_driver(&self, driver_id: &str) -> PayrollResult<Option<Driver>>;

    fn roster(&self) -> PayrollResult<Vec<Driver>>;
}

pub struct ReferralEngine<'a, S> {
    store: &'a S,
    config: ReferralConfig,
}

impl<'a, S: ReferralRepository> ReferralEngine<'a, S> {
    pub fn new(store: &'a S, config: ReferralConfig) -> Self {
        Self { store, config }
    }

    pub fn issue_invite(&self, referrer_id: &str, now: DateTime<Utc>) -> PayrollResult<ReferralInvite> {
        let referrer = self
            .store
            .find_driver(referrer_id)?
            .ok_or_else(|| PayrollError::DriverNotFound { driver_id: referrer_id.to_string() })?;
        if !referrer.is_active() {
            return Err(PayrollError::InvalidReferral {
                reason: format!("referrer {referrer_id} is not active"),
            });
        }

        let mut code = new_code();
        while self.store.get_invite(&code)?.is_some() {
            code = new_code();
        }

        let invite = ReferralInvite {
            code,
            referrer_id: referrer_id.to_string(),
            status: InviteStatus::Pending,
            issued_at: now,
            expires_at: now + Duration::days(self.config.invite_ttl_days),
            accepted_by: None,
            accepted_at: None,
        };
        self.store.insert_invite(&invite)?;
        log::debug!("invite {} issued for {referrer_id}", invite.code);
        Ok(invite)
    }

    /// Accept `code` on behalf of `driver_id`. Succeeds at most once per code.
    pub fn accept_invite(
        &self,
        code: &str,
        driver_id: &str,
        now: DateTime<Utc>,
    ) -> PayrollResult<ReferralInvite> {
        let driver = self
            .store
            .find_driver(driver_id)?
            .ok_or_else(|| PayrollError::DriverNotFound { driver_id: driver_id.to_string() })?;

        let invite = self.store.redeem_invite(code, |invite| {
            match invite.status {
                InviteStatus::Accepted => {
                    return InviteDecision::Reject(PayrollError::InviteAlreadyUsed {
                        code: invite.code.clone(),
                    })
                }
                InviteStatus::Expired => {
                    return InviteDecision::Reject(PayrollError::InviteExpired {
                        code: invite.code.clone(),
                    })
                }
                InviteStatus::Pending => {}
            }
            if now > invite.expires_at {
                return InviteDecision::Expire;
            }
            if invite.referrer_id == driver.id {
                return InviteDecision::Reject(PayrollError::InvalidReferral {
                    reason: "a driver cannot accept their own invite".into(),
                });
            }
            if let Some(existing) = &driver.referred_by {
                return InviteDecision::Reject(PayrollError::InvalidReferral {
                    reason: format!("{} is already referred by {existing}", driver.id),
                });
            }
            InviteDecision::Accept { driver_id: driver.id.clone(), at: now }
        })?;

        log::info!("invite {code} accepted by {driver_id} (referrer {})", invite.referrer_id);
        Ok(invite)
    }

    pub fn network(&self, referrer_id: &str) -> PayrollResult<AffiliateNetwork> {
        self.store.network(referrer_id)
    }

    pub fn sync_network(&self, referrer_id: &str) -> PayrollResult<AffiliateNetwork> {
        self.store.sync_network_activation(referrer_id)
    }

    /// Commission owed to `referrer_id` for `week_id`.
    ///
    /// Walks the downline breadth first, one level per configured rate.
    /// Inactive drivers earn nothing for their upline but still connect it
    /// to their own recruits. A cancelled week earns nothing either. Cycles
    /// are ignored.
    pub fn commissions<F>(
        &self,
        referrer_id: &str,
        week_id: &str,
        mut finalized_record: F,
    ) -> PayrollResult<CommissionReport>
    where
        F: FnMut(&str) -> PayrollResult<Option<DriverWeeklyRecord>>,
    {
        let roster = self.store.roster()?;
        let mut visited: HashSet<&str> = HashSet::from([referrer_id]);
        let mut frontier: Vec<&str> = vec![referrer_id];
        let mut lines = Vec::new();

        for (depth, rate) in self.config.level_rates.iter().enumerate() {
            let mut next: Vec<&Driver> = roster
                .iter()
                .filter(|d| {
                    d.referred_by
                        .as_deref()
                        .is_some_and(|parent| frontier.contains(&parent))
                })
                .filter(|d| !visited.contains(d.id.as_str()))
                .collect();
            next.sort_by(|a, b| a.id.cmp(&b.id));
            if next.is_empty() {
                break;
            }

            for recruit in &next {
                visited.insert(recruit.id.as_str());
                if !recruit.is_active() {
                    continue;
                }
                let Some(record) = finalized_record(&recruit.id)? else {
                    continue;
                };
                if record.payment_status == PaymentStatus::Cancelled {
                    continue;
                }
                let base = record.amounts.gross_ride_earnings;
                lines.push(CommissionLine {
                    driver_id: recruit.id.clone(),
                    level: depth as u32 + 1,
                    base,
                    rate: *rate,
                    amount: round2(base * *rate),
                });
            }
            frontier = next.iter().map(|d| d.id.as_str()).collect();
        }

        let total = lines.iter().map(|l| l.amount).sum();
        Ok(CommissionReport {
            referrer_id: referrer_id.to_string(),
            week_id: week_id.to_string(),
            lines,
            total,
        })
    }
}

fn new_code() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}
