//! Procedure-based jaspel split.
//!
//! The charged tariff is scaled by complexity, a pool percentage of it
//! becomes jaspel, and the pool is divided between doctor, paramedic and
//! non-paramedic staff by one of two fixed tables.

use crate::model::{Complexity, Procedure, ProcedureCategory, ProcedureType, Role};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Pool percentage and split shares, all in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SplitTable {
    pub pool: Decimal,
    pub doctor: Decimal,
    pub paramedic: Decimal,
    pub non_paramedic: Decimal,
}

impl SplitTable {
    pub fn doctor_required() -> Self {
        Self {
            pool: Decimal::from(30),
            doctor: Decimal::from(70),
            paramedic: Decimal::from(20),
            non_paramedic: Decimal::from(10),
        }
    }

    pub fn paramedic_only() -> Self {
        Self {
            pool: Decimal::from(70),
            doctor: Decimal::ZERO,
            paramedic: Decimal::from(80),
            non_paramedic: Decimal::from(20),
        }
    }
}

/// Everything the split depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitInput {
    pub base_tariff: Decimal,
    pub complexity: Complexity,
    pub category: ProcedureCategory,
    pub requires_doctor: bool,
    pub percentage_override: Option<Decimal>,
}

impl SplitInput {
    pub fn from_type(procedure_type: &ProcedureType) -> Self {
        Self {
            base_tariff: procedure_type.base_tariff,
            complexity: procedure_type.complexity,
            category: procedure_type.category,
            requires_doctor: procedure_type.requires_doctor,
            percentage_override: procedure_type.jaspel_percentage,
        }
    }

    /// Split of a performed procedure: its charged tariff, its type's rules.
    pub fn for_procedure(procedure: &Procedure, procedure_type: &ProcedureType) -> Self {
        Self {
            base_tariff: procedure.tariff,
            ..Self::from_type(procedure_type)
        }
    }

    fn table(&self) -> SplitTable {
        if self.requires_doctor {
            SplitTable {
                pool: self
                    .percentage_override
                    .unwrap_or(SplitTable::doctor_required().pool),
                ..SplitTable::doctor_required()
            }
        } else {
            let pool = self
                .category
                .paramedic_pool_percentage()
                .or(self.percentage_override)
                .unwrap_or(SplitTable::paramedic_only().pool);
            SplitTable {
                pool,
                ..SplitTable::paramedic_only()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcedureSplit {
    pub base_tariff: Decimal,
    pub complexity_multiplier: Decimal,
    pub adjusted_tariff: Decimal,
    pub jaspel_percentage: Decimal,
    pub total_jaspel: Decimal,
    pub jasa_dokter: Decimal,
    pub jasa_paramedis: Decimal,
    pub jasa_non_paramedis: Decimal,
    pub requires_doctor: bool,
}

impl ProcedureSplit {
    /// Amount owed to staff of `role`; zero for roles outside the split.
    pub fn share_for(&self, role: Role) -> Decimal {
        match role {
            Role::Doctor => self.jasa_dokter,
            Role::Paramedic => self.jasa_paramedis,
            Role::NonParamedic => self.jasa_non_paramedis,
            _ => Decimal::ZERO,
        }
    }
}

fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn percent_of(value: Decimal, percent: Decimal) -> Decimal {
    money(value * percent / Decimal::ONE_HUNDRED)
}

pub(super) fn calculate(input: &SplitInput) -> ProcedureSplit {
    let table = input.table();
    let multiplier = input.complexity.multiplier();
    let adjusted_tariff = money(input.base_tariff * multiplier);
    let total_jaspel = percent_of(adjusted_tariff, table.pool);

    let jasa_dokter = percent_of(total_jaspel, table.doctor);
    let jasa_paramedis = percent_of(total_jaspel, table.paramedic);
    // remainder keeps the three shares summing exactly to the pool
    let jasa_non_paramedis = total_jaspel - jasa_dokter - jasa_paramedis;

    ProcedureSplit {
        base_tariff: input.base_tariff,
        complexity_multiplier: multiplier,
        adjusted_tariff,
        jaspel_percentage: table.pool,
        total_jaspel,
        jasa_dokter,
        jasa_paramedis,
        jasa_non_paramedis,
        requires_doctor: input.requires_doctor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(
        tariff: i64,
        complexity: Complexity,
        category: ProcedureCategory,
        requires_doctor: bool,
    ) -> SplitInput {
        SplitInput {
            base_tariff: Decimal::from(tariff),
            complexity,
            category,
            requires_doctor,
            percentage_override: None,
        }
    }

    #[test]
    fn test_reference_paramedic_only_scenario() {
        let split = calculate(&input(
            30_000,
            Complexity::Standard,
            ProcedureCategory::Tindakan,
            false,
        ));
        assert_eq!(split.adjusted_tariff, Decimal::from(30_000));
        assert_eq!(split.jaspel_percentage, Decimal::from(70));
        assert_eq!(split.total_jaspel, Decimal::from(21_000));
        assert_eq!(split.jasa_paramedis, Decimal::from(16_800));
        assert_eq!(split.jasa_non_paramedis, Decimal::from(4_200));
        assert_eq!(split.jasa_dokter, Decimal::ZERO);
    }

    #[test]
    fn test_doctor_required_split() {
        let split = calculate(&input(
            100_000,
            Complexity::Complex,
            ProcedureCategory::Tindakan,
            true,
        ));
        assert_eq!(split.adjusted_tariff, Decimal::from(140_000));
        assert_eq!(split.jaspel_percentage, Decimal::from(30));
        assert_eq!(split.total_jaspel, Decimal::from(42_000));
        assert_eq!(split.jasa_dokter, Decimal::from(29_400));
        assert_eq!(split.jasa_paramedis, Decimal::from(8_400));
        assert_eq!(split.jasa_non_paramedis, Decimal::from(4_200));
    }

    #[test]
    fn test_category_only_overrides_paramedic_pool() {
        let lab_doctor = calculate(&input(
            50_000,
            Complexity::Standard,
            ProcedureCategory::Laboratorium,
            true,
        ));
        assert_eq!(lab_doctor.jaspel_percentage, Decimal::from(30));

        let lab_paramedic = calculate(&input(
            50_000,
            Complexity::Standard,
            ProcedureCategory::Laboratorium,
            false,
        ));
        assert_eq!(lab_paramedic.jaspel_percentage, Decimal::from(50));
    }

    #[test]
    fn test_type_override_applies_when_category_is_silent() {
        let mut custom = input(10_000, Complexity::Standard, ProcedureCategory::Lainnya, false);
        custom.percentage_override = Some(Decimal::from(55));
        assert_eq!(calculate(&custom).jaspel_percentage, Decimal::from(55));

        custom.percentage_override = None;
        assert_eq!(calculate(&custom).jaspel_percentage, Decimal::from(70));
    }

    #[test]
    fn test_shares_sum_to_total_for_every_combination() {
        let categories = [
            ProcedureCategory::Konsultasi,
            ProcedureCategory::Pemeriksaan,
            ProcedureCategory::Tindakan,
            ProcedureCategory::Laboratorium,
            ProcedureCategory::Radiologi,
            ProcedureCategory::Lainnya,
        ];
        let complexities = [Complexity::Simple, Complexity::Standard, Complexity::Complex];
        let tariffs = [1, 333, 7_777, 12_345, 30_000, 99_999, 1_234_567];
        let tolerance = Decimal::new(1, 2);

        for category in categories {
            for complexity in complexities {
                for requires_doctor in [true, false] {
                    for tariff in tariffs {
                        let split = calculate(&input(tariff, complexity, category, requires_doctor));
                        let sum = split.jasa_dokter + split.jasa_paramedis + split.jasa_non_paramedis;
                        assert!(
                            (sum - split.total_jaspel).abs() <= tolerance,
                            "{:?} {:?} {} {}",
                            category,
                            complexity,
                            requires_doctor,
                            tariff
                        );
                        assert!(split.jasa_non_paramedis >= Decimal::ZERO);
                    }
                }
            }
        }
    }

    #[test]
    fn test_share_for_role() {
        let split = calculate(&input(
            30_000,
            Complexity::Standard,
            ProcedureCategory::Tindakan,
            false,
        ));
        assert_eq!(split.share_for(Role::Paramedic), Decimal::from(16_800));
        assert_eq!(split.share_for(Role::Treasurer), Decimal::ZERO);
    }
}
