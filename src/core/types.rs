use serde::{Serialize, Serializer};
use thiserror::Error;

pub const DEFAULT_START_YEAR: i32 = 2026;
pub const DEFAULT_END_YEAR: i32 = 2040;

#[derive(Debug, Clone, PartialEq)]
pub struct Inputs {
    pub satisfaction_score: i32,
    pub initial_customers: f64,
    pub service_profit_per_year: f64,
    pub ownership_years: u32,
    pub warranty_years: u32,
    pub vehicle_sale_profit: f64,
    pub start_year: i32,
    pub end_year: i32,
}

impl Inputs {
    /// Checks the preconditions `simulate` relies on.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.start_year > self.end_year {
            return Err(SimulationError::InvalidYearRange {
                start: self.start_year,
                end: self.end_year,
            });
        }
        if self.ownership_years == 0 {
            return Err(SimulationError::InvalidDuration {
                name: "ownership",
                value: self.ownership_years,
            });
        }
        if self.warranty_years == 0 {
            return Err(SimulationError::InvalidDuration {
                name: "warranty",
                value: self.warranty_years,
            });
        }
        if !self.initial_customers.is_finite() || self.initial_customers <= 0.0 {
            return Err(SimulationError::InvalidCustomers(self.initial_customers));
        }
        for (name, value) in [
            ("service", self.service_profit_per_year),
            ("vehicle sale", self.vehicle_sale_profit),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SimulationError::InvalidProfit { name, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("start year {start} is after end year {end}")]
    InvalidYearRange { start: i32, end: i32 },
    #[error("{name} duration must be at least one year, got {value}")]
    InvalidDuration { name: &'static str, value: u32 },
    #[error("initial customers must be a positive number, got {0}")]
    InvalidCustomers(f64),
    #[error("{name} profit must be a non-negative number, got {value}")]
    InvalidProfit { name: &'static str, value: f64 },
    #[error("figure {0} is too large to report exactly; reduce the cohort size or profits")]
    Overflow(f64),
    #[error("failed to write delimited output: {0}")]
    Export(#[from] csv::Error),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SatisfactionBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionRates {
    pub service_return: f64,
    pub repeat_purchase: f64,
}

/// A cohort that took ownership in `origin_year`. Sizes stay fractional.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Wave {
    pub origin_year: i32,
    pub size: f64,
}

/// Unrounded accumulators for one simulated year.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct YearActivity {
    pub year: i32,
    pub service_customers: f64,
    pub repeat_purchases: f64,
    pub total_profit: f64,
}

#[derive(Debug, Clone)]
pub struct Propagation {
    pub rates: RetentionRates,
    pub waves: Vec<Wave>,
    pub years: Vec<YearActivity>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RowLabel {
    Total,
    Year(i32),
}

impl Serialize for RowLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowLabel::Total => serializer.serialize_str("Total"),
            RowLabel::Year(year) => serializer.serialize_i32(*year),
        }
    }
}

impl std::fmt::Display for RowLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowLabel::Total => f.write_str("Total"),
            RowLabel::Year(year) => write!(f, "{year}"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub year: RowLabel,
    pub service_customers: i64,
    pub repeat_purchases: i64,
    pub total_profit: i64,
}

/// Result table. The first row is always the totals row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub rows: Vec<TableRow>,
}

impl Table {
    pub const COLUMNS: [&'static str; 4] = [
        "Year",
        "Service customers",
        "Repeat purchases",
        "Total profit",
    ];

    pub fn totals(&self) -> &TableRow {
        &self.rows[0]
    }

    pub fn year_rows(&self) -> &[TableRow] {
        &self.rows[1..]
    }

    pub fn row_for_year(&self, year: i32) -> Option<&TableRow> {
        self.year_rows()
            .iter()
            .find(|row| row.year == RowLabel::Year(year))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub satisfaction_score: i32,
    pub band: SatisfactionBand,
    pub rates: RetentionRates,
    pub start_year: i32,
    pub end_year: i32,
    pub table: Table,
}
