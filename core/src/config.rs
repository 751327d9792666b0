use crate::error::{PayrollError, PayrollResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ── Waterfall ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallConfig {
    /// Fraction of gross ride earnings withheld as tax (0.06).
    pub tax_rate: Decimal,
    /// Base admin fee as a fraction of earnings net of tax (0.07).
    pub admin_fee_rate: Decimal,
}

// ── KPI ───────────────────────────────────────────────────────────

/// Minimum-acceptable and excellence values for one KPI input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KpiTarget {
    pub min: f64,
    pub excellence: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KpiWeights {
    pub revenue: f64,
    pub acceptance: f64,
    pub rating: f64,
    pub recruitment: f64,
    pub hours: f64,
}

impl KpiWeights {
    pub fn total(&self) -> f64 {
        self.revenue + self.acceptance + self.rating + self.recruitment + self.hours
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiTargets {
    pub revenue: KpiTarget,
    /// Acceptance rate in percent, 0–100.
    pub acceptance: KpiTarget,
    pub rating: KpiTarget,
    pub recruitment: KpiTarget,
    pub hours: KpiTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierBreakpoint {
    pub tier: String,
    pub min_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiConfig {
    pub weights: KpiWeights,
    pub targets: KpiTargets,
    /// Ascending by `min_score`; the first entry should start at 0.
    pub tiers: Vec<TierBreakpoint>,
}

// ── Referral ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralConfig {
    /// Commission rate per level; index 0 is direct recruits.
    pub level_rates: Vec<Decimal>,
    pub invite_ttl_days: i64,
}

// ── Root ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollConfig {
    pub waterfall: WaterfallConfig,
    pub kpi: KpiConfig,
    pub referral: ReferralConfig,
}

impl PayrollConfig {
    /// Load from the data/ directory.
    /// In tests, use PayrollConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let config = Self {
            waterfall: read_json(&format!("{data_dir}/payroll/waterfall.json"))?,
            kpi: read_json(&format!("{data_dir}/payroll/kpi.json"))?,
            referral: read_json(&format!("{data_dir}/payroll/referral.json"))?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PayrollResult<()> {
        let invalid = |msg: String| Err(PayrollError::InvalidConfig(msg));

        if self.waterfall.tax_rate.is_sign_negative() || self.waterfall.tax_rate >= Decimal::ONE {
            return invalid(format!("tax_rate {} out of range", self.waterfall.tax_rate));
        }
        if self.waterfall.admin_fee_rate.is_sign_negative()
            || self.waterfall.admin_fee_rate >= Decimal::ONE
        {
            return invalid(format!(
                "admin_fee_rate {} out of range",
                self.waterfall.admin_fee_rate
            ));
        }

        let total = self.kpi.weights.total();
        if (total - 1.0).abs() > 1e-9 {
            return invalid(format!("KPI weights sum to {total}, expected 1.0"));
        }
        let t = &self.kpi.targets;
        for (name, target) in [
            ("revenue", t.revenue),
            ("acceptance", t.acceptance),
            ("rating", t.rating),
            ("recruitment", t.recruitment),
            ("hours", t.hours),
        ] {
            if target.excellence <= target.min {
                return invalid(format!("KPI target '{name}' has excellence <= min"));
            }
        }
        if self.kpi.tiers.is_empty() {
            return invalid("KPI tiers are empty".into());
        }
        if self
            .kpi
            .tiers
            .windows(2)
            .any(|w| w[1].min_score <= w[0].min_score)
        {
            return invalid("KPI tiers must be strictly ascending".into());
        }

        if self.referral.level_rates.iter().any(|r| r.is_sign_negative()) {
            return invalid("referral level rates must be non-negative".into());
        }
        if self.referral.invite_ttl_days <= 0 {
            return invalid("invite_ttl_days must be positive".into());
        }
        Ok(())
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            waterfall: WaterfallConfig {
                tax_rate: Decimal::new(6, 2),
                admin_fee_rate: Decimal::new(7, 2),
            },
            kpi: KpiConfig {
                weights: KpiWeights {
                    revenue: 0.30,
                    acceptance: 0.20,
                    rating: 0.25,
                    recruitment: 0.15,
                    hours: 0.10,
                },
                targets: KpiTargets {
                    revenue: KpiTarget { min: 300.0, excellence: 1200.0 },
                    acceptance: KpiTarget { min: 60.0, excellence: 95.0 },
                    rating: KpiTarget { min: 4.5, excellence: 4.95 },
                    recruitment: KpiTarget { min: 0.0, excellence: 5.0 },
                    hours: KpiTarget { min: 20.0, excellence: 50.0 },
                },
                tiers: vec![
                    TierBreakpoint { tier: "beginner".into(), min_score: 0.0 },
                    TierBreakpoint { tier: "bronze".into(), min_score: 40.0 },
                    TierBreakpoint { tier: "silver".into(), min_score: 60.0 },
                    TierBreakpoint { tier: "gold".into(), min_score: 75.0 },
                    TierBreakpoint { tier: "master".into(), min_score: 90.0 },
                ],
            },
            referral: ReferralConfig {
                level_rates: vec![Decimal::new(2, 2), Decimal::new(1, 2)],
                invite_ttl_days: 30,
            },
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    let value = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_test_config_is_valid() {
        PayrollConfig::default_test().validate().unwrap();
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut cfg = PayrollConfig::default_test();
        cfg.kpi.weights.hours = 0.2;
        assert!(matches!(cfg.validate(), Err(PayrollError::InvalidConfig(_))));
    }

    #[test]
    fn tiers_must_ascend() {
        let mut cfg = PayrollConfig::default_test();
        cfg.kpi.tiers.swap(1, 2);
        assert!(cfg.validate().is_err());
    }
}
