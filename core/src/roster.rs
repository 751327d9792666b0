//! Driver roster and financing agreements, as maintained by administration.

use crate::types::{ContractorType, DriverId, DriverStatus, Platform};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub name: String,
    pub contractor_type: ContractorType,
    /// Only charged to renters.
    pub rental_fee_per_week: Decimal,
    /// Platform → reference id used by that platform's exports.
    pub integrations: BTreeMap<Platform, String>,
    /// Leased vehicle plate (renters).
    pub vehicle_plate: Option<String>,
    pub referred_by: Option<DriverId>,
    pub status: DriverStatus,
}

impl Driver {
    pub fn is_active(&self) -> bool {
        self.status == DriverStatus::Active
    }

    pub fn is_renter(&self) -> bool {
        self.contractor_type == ContractorType::Renter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancingStatus {
    Active,
    Completed,
}

impl FinancingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinancingStatus::Active    => "active",
            FinancingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active"    => Some(FinancingStatus::Active),
            "completed" => Some(FinancingStatus::Completed),
            _ => None,
        }
    }
}

/// A loan or vehicle financing repaid through weekly payroll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancingAgreement {
    pub id: String,
    pub driver_id: DriverId,
    pub principal: Decimal,
    pub weekly_installment: Decimal,
    /// Added on top of the base admin fee, in percent of earnings net of tax.
    pub weekly_interest_percent: Decimal,
    pub remaining_weeks: u32,
    pub status: FinancingStatus,
}

impl FinancingAgreement {
    pub fn is_active(&self) -> bool {
        self.status == FinancingStatus::Active && self.remaining_weeks > 0
    }
}
