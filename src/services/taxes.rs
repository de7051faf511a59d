// src/services/taxes.rs
//
// Statutory deduction engine. Each component (NSSF, SHIF, housing levy, PAYE)
// is looked up independently in the tax configuration store; when no active
// row exists for a component the built-in statutory table applies. Every
// component is rounded half-up to 2 decimal places on its own, and the total
// is the sum of the rounded components.

use crate::errors::AppResult;
use crate::models::{PayeBand, RateShape, TaxBreakdown, TaxType};
use crate::store::TaxConfigStore;
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::sync::Arc;

pub struct TaxEngine {
    config: Arc<dyn TaxConfigStore>,
}

impl TaxEngine {
    pub fn new(config: Arc<dyn TaxConfigStore>) -> Self {
        Self { config }
    }

    /// Statutory breakdown for one worker's gross pay as of a date.
    ///
    /// NSSF is computed on gross; PAYE on gross minus NSSF (pension relief),
    /// with personal relief applied last and the result floored at zero.
    pub async fn compute(&self, gross: Decimal, as_of: NaiveDate) -> AppResult<TaxBreakdown> {
        let nssf_shape = self.shape_for(TaxType::Nssf, as_of).await?;
        let shif_shape = self.shape_for(TaxType::Shif, as_of).await?;
        let housing_shape = self.shape_for(TaxType::HousingLevy, as_of).await?;
        let paye_shape = self.shape_for(TaxType::Paye, as_of).await?;

        let nssf = round_half_up(apply_shape(&nssf_shape, gross));
        let shif = round_half_up(apply_shape(&shif_shape, gross));
        let housing_levy = round_half_up(apply_shape(&housing_shape, gross));

        let taxable = (gross - nssf).max(Decimal::ZERO);
        let paye = round_half_up(apply_shape(&paye_shape, taxable));

        let total_deductions = nssf + shif + housing_levy + paye;

        Ok(TaxBreakdown {
            nssf,
            shif,
            housing_levy,
            paye,
            total_deductions,
        })
    }

    async fn shape_for(&self, tax_type: TaxType, as_of: NaiveDate) -> AppResult<RateShape> {
        match self.config.get_active(tax_type, as_of).await? {
            Some(shape) => Ok(shape),
            None => Ok(default_shape(tax_type)),
        }
    }
}

/// The statutory table effective February 2025 (Kenya): tiered NSSF at 6%,
/// SHIF at 2.75% with a 300 floor, housing levy at 1.5%, and the three-band
/// monthly PAYE schedule with 2400 personal relief.
pub fn default_shape(tax_type: TaxType) -> RateShape {
    match tax_type {
        TaxType::Nssf => RateShape::Tiered {
            tier1_limit: dec!(7000),
            tier2_limit: dec!(36000),
            rate: dec!(0.06),
        },
        TaxType::Shif => RateShape::Percentage {
            rate: dec!(0.0275),
            min_amount: Some(dec!(300)),
        },
        TaxType::HousingLevy => RateShape::Percentage {
            rate: dec!(0.015),
            min_amount: None,
        },
        TaxType::Paye => RateShape::Brackets {
            bands: vec![
                PayeBand {
                    limit: Some(dec!(24000)),
                    rate: dec!(0.10),
                },
                PayeBand {
                    limit: Some(dec!(32333)),
                    rate: dec!(0.25),
                },
                PayeBand {
                    limit: None,
                    rate: dec!(0.30),
                },
            ],
            personal_relief: dec!(2400),
        },
    }
}

fn apply_shape(shape: &RateShape, base: Decimal) -> Decimal {
    match shape {
        RateShape::Tiered {
            tier1_limit,
            tier2_limit,
            rate,
        } => {
            let tier1 = base.min(*tier1_limit) * rate;
            // A misconfigured tier2_limit below tier1_limit must not produce
            // a negative slice.
            let tier2 = (base.min(*tier2_limit) - tier1_limit).max(Decimal::ZERO) * rate;
            tier1 + tier2
        }
        RateShape::Percentage { rate, min_amount } => {
            let amount = base * rate;
            match min_amount {
                Some(min) => amount.max(*min),
                None => amount,
            }
        }
        RateShape::Brackets {
            bands,
            personal_relief,
        } => {
            let mut tax = Decimal::ZERO;
            let mut lower = Decimal::ZERO;
            for band in bands {
                let upper = band.limit.unwrap_or(base).max(lower);
                if base <= lower {
                    break;
                }
                let slice = base.min(upper) - lower;
                tax += slice * band.rate;
                lower = upper;
            }
            (tax - personal_relief).max(Decimal::ZERO)
        }
    }
}

fn round_half_up(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
