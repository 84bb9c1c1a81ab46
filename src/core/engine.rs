use tracing::{debug, info};

use super::types::{
    Inputs, Propagation, RetentionRates, RowLabel, SatisfactionBand, SimulationError,
    SimulationReport, Table, TableRow, Wave, YearActivity,
};

/// Contributions below this many customers are dropped for the year.
pub const MIN_CONTRIBUTION: f64 = 0.5;

/// Lower score bound of each band, highest first.
const BANDS: [(i32, SatisfactionBand); 3] = [
    (901, SatisfactionBand::Excellent),
    (801, SatisfactionBand::Good),
    (701, SatisfactionBand::Fair),
];

impl SatisfactionBand {
    pub fn from_score(score: i32) -> Self {
        BANDS
            .iter()
            .find(|(lower, _)| score >= *lower)
            .map(|(_, band)| *band)
            .unwrap_or(SatisfactionBand::Poor)
    }

    pub fn rates(self) -> RetentionRates {
        let (service_return, repeat_purchase) = match self {
            SatisfactionBand::Excellent => (0.74, 0.35),
            SatisfactionBand::Good => (0.51, 0.24),
            SatisfactionBand::Fair => (0.32, 0.19),
            SatisfactionBand::Poor => (0.14, 0.16),
        };
        RetentionRates {
            service_return,
            repeat_purchase,
        }
    }
}

pub fn rates(score: i32) -> RetentionRates {
    SatisfactionBand::from_score(score).rates()
}

/// Largest magnitude an `f64` holds exactly as an integer (2^53).
pub const MAX_EXACT_COUNT: f64 = 9_007_199_254_740_992.0;

/// Half-to-even, the rounding used for every displayed figure.
pub fn round_count(value: f64) -> Result<i64, SimulationError> {
    let rounded = value.round_ties_even();
    if !rounded.is_finite() || rounded.abs() > MAX_EXACT_COUNT {
        return Err(SimulationError::Overflow(value));
    }
    Ok(rounded as i64)
}

pub fn simulate(inputs: &Inputs) -> Result<Table, SimulationError> {
    run(inputs).map(|(_, table)| table)
}

pub fn simulate_report(inputs: &Inputs) -> Result<SimulationReport, SimulationError> {
    let (propagation, table) = run(inputs)?;
    Ok(SimulationReport {
        satisfaction_score: inputs.satisfaction_score,
        band: SatisfactionBand::from_score(inputs.satisfaction_score),
        rates: propagation.rates,
        start_year: inputs.start_year,
        end_year: inputs.end_year,
        table,
    })
}

fn run(inputs: &Inputs) -> Result<(Propagation, Table), SimulationError> {
    inputs.validate()?;
    let propagation = propagate(inputs);
    let table = assemble_table(&propagation.years)?;
    info!(
        score = inputs.satisfaction_score,
        start_year = inputs.start_year,
        end_year = inputs.end_year,
        waves = propagation.waves.len(),
        total_profit = table.totals().total_profit,
        "simulation complete"
    );
    Ok((propagation, table))
}

/// Advances the wave set year by year. Callers are expected to have
/// validated `inputs`; an empty year range yields no activity.
pub fn propagate(inputs: &Inputs) -> Propagation {
    let rates = SatisfactionBand::from_score(inputs.satisfaction_score).rates();
    let warranty = i64::from(inputs.warranty_years);
    let ownership = i64::from(inputs.ownership_years);

    let mut waves = vec![Wave {
        origin_year: inputs.start_year - 1,
        size: inputs.initial_customers,
    }];
    let mut years = Vec::new();

    for year in inputs.start_year..=inputs.end_year {
        let mut service_customers = 0.0;
        let mut repeat_purchases = 0.0;
        let mut spawned = Vec::new();

        for wave in &waves {
            let age = i64::from(year) - i64::from(wave.origin_year);
            if (1..=warranty).contains(&age) {
                let candidate = wave.size * rates.service_return;
                if candidate >= MIN_CONTRIBUTION {
                    service_customers += candidate;
                }
            }
            if age == ownership {
                let candidate = wave.size * rates.repeat_purchase;
                if candidate >= MIN_CONTRIBUTION {
                    repeat_purchases += candidate;
                    spawned.push(Wave {
                        origin_year: year,
                        size: candidate,
                    });
                }
            }
        }
        waves.extend(spawned);

        let total_profit = service_customers.round_ties_even() * inputs.service_profit_per_year
            + repeat_purchases.round_ties_even() * inputs.vehicle_sale_profit;
        debug!(
            year,
            service_customers,
            repeat_purchases,
            total_profit,
            "year simulated"
        );
        years.push(YearActivity {
            year,
            service_customers,
            repeat_purchases,
            total_profit,
        });
    }

    Propagation {
        rates,
        waves,
        years,
    }
}

/// Rounds each year and prepends a totals row summed from the rounded rows.
/// Fails with `Overflow` when a figure cannot be represented exactly.
pub fn assemble_table(years: &[YearActivity]) -> Result<Table, SimulationError> {
    let year_rows = years
        .iter()
        .map(|activity| {
            Ok(TableRow {
                year: RowLabel::Year(activity.year),
                service_customers: round_count(activity.service_customers)?,
                repeat_purchases: round_count(activity.repeat_purchases)?,
                total_profit: round_count(activity.total_profit)?,
            })
        })
        .collect::<Result<Vec<_>, SimulationError>>()?;

    let mut totals = TableRow {
        year: RowLabel::Total,
        service_customers: 0,
        repeat_purchases: 0,
        total_profit: 0,
    };
    for row in &year_rows {
        totals.service_customers = checked_sum(totals.service_customers, row.service_customers)?;
        totals.repeat_purchases = checked_sum(totals.repeat_purchases, row.repeat_purchases)?;
        totals.total_profit = checked_sum(totals.total_profit, row.total_profit)?;
    }

    let mut rows = Vec::with_capacity(year_rows.len() + 1);
    rows.push(totals);
    rows.extend(year_rows);
    Ok(Table { rows })
}

fn checked_sum(total: i64, value: i64) -> Result<i64, SimulationError> {
    total
        .checked_add(value)
        .ok_or(SimulationError::Overflow(total as f64 + value as f64))
}
