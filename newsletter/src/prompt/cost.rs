use std::fmt;

/// Approximate characters per usage unit for backends that do not report
/// token counts.
pub const CHARS_PER_UNIT: u64 = 4;

/// Pricing entry used for model ids missing from [`PRICING`].
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingUnit {
    /// Rates are USD per 1,000,000 tokens; units are tokens.
    PerMillionTokens,
    /// Rates are USD per 1,000 characters; units are converted back to
    /// characters with [`CHARS_PER_UNIT`] first.
    PerThousandChars,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub unit: PricingUnit,
    pub input_rate: f64,
    pub output_rate: f64,
}

pub const PRICING: [(&str, Pricing); 5] = [
    (
        "gpt-4o-mini",
        Pricing {
            unit: PricingUnit::PerMillionTokens,
            input_rate: 0.15,
            output_rate: 0.60,
        },
    ),
    (
        "gpt-4o",
        Pricing {
            unit: PricingUnit::PerMillionTokens,
            input_rate: 2.50,
            output_rate: 10.00,
        },
    ),
    (
        "gemini-1.5-flash",
        Pricing {
            unit: PricingUnit::PerThousandChars,
            input_rate: 0.000_018_75,
            output_rate: 0.000_075,
        },
    ),
    (
        "gemini-1.5-pro",
        Pricing {
            unit: PricingUnit::PerThousandChars,
            input_rate: 0.000_312_5,
            output_rate: 0.001_25,
        },
    ),
    (
        "gemini-2.0-flash",
        Pricing {
            unit: PricingUnit::PerThousandChars,
            input_rate: 0.000_025,
            output_rate: 0.000_1,
        },
    ),
];

/// Units consumed by one successful completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub input_units: u64,
    pub output_units: u64,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostRecord {
    pub model: String,
    pub input_units: u64,
    pub output_units: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

pub fn pricing_for(model: &str) -> &'static Pricing {
    PRICING
        .iter()
        .find(|(id, _)| *id == model)
        .or_else(|| PRICING.iter().find(|(id, _)| *id == DEFAULT_MODEL))
        .map(|(_, pricing)| pricing)
        .unwrap_or(&PRICING[0].1)
}

fn unit_cost(units: u64, rate: f64, unit: PricingUnit) -> f64 {
    match unit {
        PricingUnit::PerMillionTokens => units as f64 / 1_000_000.0 * rate,
        PricingUnit::PerThousandChars => (units * CHARS_PER_UNIT) as f64 / 1_000.0 * rate,
    }
}

pub fn estimate(input_units: u64, output_units: u64, model: &str) -> CostRecord {
    let pricing = pricing_for(model);
    let input_cost = unit_cost(input_units, pricing.input_rate, pricing.unit);
    let output_cost = unit_cost(output_units, pricing.output_rate, pricing.unit);

    CostRecord {
        model: model.to_string(),
        input_units,
        output_units,
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub stage: String,
    pub cost: CostRecord,
}

/// Every priced completion call of a run, in call order.
#[derive(Debug, Default)]
pub struct CostLedger {
    entries: Vec<LedgerEntry>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls that produced no usage (sentinel replies) are not priced.
    pub fn record(&mut self, stage: &str, usage: Option<&UsageRecord>) {
        let Some(usage) = usage else {
            return;
        };
        let cost = estimate(usage.input_units, usage.output_units, &usage.model);
        tracing::debug!(
            "{} [{}] in={} out={} ${:.6}",
            stage,
            cost.model,
            cost.input_units,
            cost.output_units,
            cost.total_cost
        );
        self.entries.push(LedgerEntry {
            stage: stage.to_string(),
            cost,
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.cost.total_cost).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for CostLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Estimated API cost:")?;
        for entry in &self.entries {
            writeln!(
                f,
                "  {:<24} {:<18} in={:>7} out={:>6}  ${:.6} (in ${:.6}, out ${:.6})",
                entry.stage,
                entry.cost.model,
                entry.cost.input_units,
                entry.cost.output_units,
                entry.cost.total_cost,
                entry.cost.input_cost,
                entry.cost.output_cost,
            )?;
        }
        write!(
            f,
            "Total: ${:.6} across {} call(s)",
            self.total(),
            self.entries.len()
        )
    }
}
