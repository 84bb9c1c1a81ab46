mod engine;
mod export;
mod types;

pub use engine::{
    MAX_EXACT_COUNT, MIN_CONTRIBUTION, assemble_table, propagate, rates, round_count, simulate,
    simulate_report,
};
pub use export::{CSV_FILENAME, render_text, to_csv};
pub use types::{
    DEFAULT_END_YEAR, DEFAULT_START_YEAR, Inputs, Propagation, RetentionRates, RowLabel,
    SatisfactionBand, SimulationError, SimulationReport, Table, TableRow, Wave, YearActivity,
};
