//! Shared primitive types used across the payroll engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, unique identifier for a driver.
pub type DriverId = String;

/// ISO week identifier, `YYYY-Www`.
pub type WeekId = String;

/// Composite key of a weekly record: `driver_id:week_id`.
pub type RecordId = String;

pub fn record_id(driver_id: &str, week_id: &str) -> RecordId {
    format!("{driver_id}:{week_id}")
}

/// Week part of a record id. Driver ids may themselves contain ':'.
pub fn week_of_record(record_id: &str) -> Option<&str> {
    record_id.rsplit_once(':').map(|(_, week)| week)
}

/// The five known source platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    RideA,
    RideB,
    FuelCard,
    TollTag,
    Telemetry,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::RideA,
        Platform::RideB,
        Platform::FuelCard,
        Platform::TollTag,
        Platform::Telemetry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::RideA     => "ride_a",
            Platform::RideB     => "ride_b",
            Platform::FuelCard  => "fuel_card",
            Platform::TollTag   => "toll_tag",
            Platform::Telemetry => "telemetry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    /// Ride platforms carry earnings and trip counts.
    pub fn is_ride(&self) -> bool {
        matches!(self, Platform::RideA | Platform::RideB)
    }

    /// Platforms keyed by a vehicle plate or card number rather than an
    /// account identifier. Their keys are stripped of punctuation.
    pub fn is_plate_keyed(&self) -> bool {
        matches!(self, Platform::FuelCard | Platform::TollTag | Platform::Telemetry)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractorType {
    /// Own vehicle; pays tolls directly.
    Affiliate,
    /// Leased vehicle; weekly rental and tolls come out of payroll.
    Renter,
}

impl ContractorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractorType::Affiliate => "affiliate",
            ContractorType::Renter    => "renter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "affiliate" => Some(ContractorType::Affiliate),
            "renter"    => Some(ContractorType::Renter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Active,
    Inactive,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Active   => "active",
            DriverStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active"   => Some(DriverStatus::Active),
            "inactive" => Some(DriverStatus::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending   => "pending",
            PaymentStatus::Paid      => "paid",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending"   => Some(PaymentStatus::Pending),
            "paid"      => Some(PaymentStatus::Paid),
            "cancelled" => Some(PaymentStatus::Cancelled),
            _ => None,
        }
    }

    /// Frozen records are never recomputed from platform data.
    pub fn is_frozen(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
