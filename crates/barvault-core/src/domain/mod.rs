mod bar;
mod period;
mod symbol;

pub use bar::{Bar, BarSeries, MAX_VOLUME};
pub use period::AggregationPeriod;
pub use symbol::Symbol;

time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");
