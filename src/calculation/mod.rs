//! Jaspel calculation.
//!
//! All fee arithmetic goes through [`calculate`], which takes an explicit
//! [`CalculationPolicy`]:
//!
//! - [`PatientCountPolicy`]: sitting fee plus per-patient fees above a
//!   threshold ([`patient_count`])
//! - [`ProcedureSplitPolicy`]: tariff-based pool split between doctor,
//!   paramedic and non-paramedic staff ([`procedure`])
//!
//! Formula resolution for patient count records lives in [`formula`].

pub mod formula;
pub mod patient_count;
pub mod procedure;

pub use formula::{FormulaSelection, FormulaSource};
pub use patient_count::PatientCountFee;
pub use procedure::{ProcedureSplit, SplitInput, SplitTable};

use crate::model::FeeFormula;
use rust_decimal::Decimal;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// A fee model [`calculate`] can run.
pub trait CalculationPolicy {
    type Output;

    /// Label used in logs, spans and metrics
    const NAME: &'static str;

    fn compute(&self) -> Self::Output;

    fn total(output: &Self::Output) -> Decimal;
}

/// Patient counts of one shift priced with a fee formula.
#[derive(Debug, Clone, Copy)]
pub struct PatientCountPolicy<'a> {
    pub general: u32,
    pub insurance: u32,
    pub formula: &'a FeeFormula,
}

impl CalculationPolicy for PatientCountPolicy<'_> {
    type Output = PatientCountFee;
    const NAME: &'static str = "patient_count";

    fn compute(&self) -> PatientCountFee {
        patient_count::calculate(self.general, self.insurance, self.formula)
    }

    fn total(output: &PatientCountFee) -> Decimal {
        output.total
    }
}

/// Jaspel split of one procedure.
#[derive(Debug, Clone, Copy)]
pub struct ProcedureSplitPolicy<'a>(pub &'a SplitInput);

impl CalculationPolicy for ProcedureSplitPolicy<'_> {
    type Output = ProcedureSplit;
    const NAME: &'static str = "procedure_split";

    fn compute(&self) -> ProcedureSplit {
        procedure::calculate(self.0)
    }

    fn total(output: &ProcedureSplit) -> Decimal {
        output.total_jaspel
    }
}

pub fn calculate<P: CalculationPolicy>(policy: P) -> P::Output {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::calculation_span(P::NAME).entered();

    let output = policy.compute();

    #[cfg(feature = "metrics")]
    METRICS.record_calculation(P::NAME);
    log::debug!(target: "jaspel::calculation", "{} calculated total={}", P::NAME, P::total(&output));
    output
}
