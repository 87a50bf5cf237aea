//! Hourly weather ingest (spec.md §3/§4.2, component C2).
//!
//! Parses the CSV format from spec.md §6.2, validates it, and exposes an
//! hourly [`crate::fwi::FwiWeather`] series plus a noon-keyed daily series
//! per scenario id. The six FWI indices themselves are not recomputed from
//! scratch here — FFMC/DMC/DC are prognostic (each day's value depends on
//! the previous day's) so the input file already carries them — but
//! ISI/BUI/FWI, which are *derived* from the other indices on the same
//! row, are passed through [`crate::fwi::check_isi`]/`check_bui`/`check_fwi`
//! so a disagreement between the stored and recomputed value is logged
//! rather than silently trusted (spec.md §4.1).

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::error::WeatherInputError;
use crate::fwi::{check_bui, check_fwi, check_isi, Dc, Dmc, Ffmc, FwiWeather};
use crate::units::{Celsius, Degrees, KilometresPerHour, Millimetres, Percent, Wind};

/// Identifies one Monte-Carlo scenario's weather ensemble (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScenarioId(pub u32);

/// A calendar day, used as the key for the daily series and the
/// `[min_day, max_day]` span.
pub type Day = NaiveDate;
/// Hour of day, `0..=23`.
pub type Hour = u32;

/// One parsed row of the weather CSV (spec.md §6.2 header, exact order).
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherRow {
    /// `Scenario` column.
    #[serde(rename = "Scenario")]
    pub scenario: u32,
    /// `Date` column, `"YYYY-MM-DD HH:MM:SS"`.
    #[serde(rename = "Date")]
    pub date: String,
    /// `PREC`, 1h accumulated precipitation, mm.
    #[serde(rename = "PREC")]
    pub prec: f64,
    /// `TEMP`, °C.
    #[serde(rename = "TEMP")]
    pub temp: f64,
    /// `RH`, %.
    #[serde(rename = "RH")]
    pub rh: f64,
    /// `WS`, km/h.
    #[serde(rename = "WS")]
    pub ws: f64,
    /// `WD`, ° compass.
    #[serde(rename = "WD")]
    pub wd: f64,
    /// `FFMC`.
    #[serde(rename = "FFMC")]
    pub ffmc: f64,
    /// `DMC`.
    #[serde(rename = "DMC")]
    pub dmc: f64,
    /// `DC`.
    #[serde(rename = "DC")]
    pub dc: f64,
    /// `ISI`.
    #[serde(rename = "ISI")]
    pub isi: f64,
    /// `BUI`.
    #[serde(rename = "BUI")]
    pub bui: f64,
    /// `FWI`.
    #[serde(rename = "FWI")]
    pub fwi: f64,
}

const EXPECTED_HEADER: [&str; 13] = [
    "Scenario", "Date", "PREC", "TEMP", "RH", "WS", "WD", "FFMC", "DMC", "DC", "ISI", "BUI", "FWI",
];

fn parse_date(scenario: u32, raw: &str) -> Result<NaiveDateTime, WeatherInputError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map_err(|_| {
        WeatherInputError::MalformedHeader(format!(
            "scenario {scenario}: unparseable date {raw:?}"
        ))
    })
}

fn row_to_weather(row: &WeatherRow) -> FwiWeather {
    let ws = row.ws;
    let ffmc = Ffmc::from_value(row.ffmc);
    let isi = check_isi(row.isi, KilometresPerHour::new(ws), ffmc);
    let dmc = Dmc::from_value(row.dmc);
    let dc = Dc::from_value(row.dc);
    let bui = check_bui(row.bui, dmc, dc);
    let fwi = check_fwi(row.fwi, isi, bui);
    FwiWeather {
        temperature: Celsius::new(row.temp),
        rh: Percent::clamped(row.rh),
        wind: Wind {
            direction: Degrees::new(row.wd),
            speed: KilometresPerHour::new(ws),
        },
        precipitation: Millimetres::new(row.prec),
        ffmc,
        dmc,
        dc,
        isi,
        bui,
        fwi,
    }
}

/// One scenario's weather ensemble: an hourly series plus a noon daily
/// series (spec.md §3 `FireWeather stream`).
#[derive(Debug, Clone, Default)]
struct ScenarioWeather {
    hourly: BTreeMap<NaiveDateTime, FwiWeather>,
    daily: BTreeMap<Day, FwiWeather>,
}

/// Ordered hourly weather for every scenario id, spanning a shared
/// `[min_day, max_day]` (spec.md §3 `FireWeather stream`, component C2).
#[derive(Debug, Clone)]
pub struct FireWeatherStream {
    scenarios: BTreeMap<ScenarioId, ScenarioWeather>,
    min_day: Day,
    max_day: Day,
}

impl FireWeatherStream {
    /// Parse and validate rows already grouped by nothing in particular
    /// (order within a scenario matters; scenarios may be interleaved).
    ///
    /// `yesterday_precip` seeds the 24h accumulation for whichever day's
    /// trailing window runs off the start of the data (spec.md §4.2).
    ///
    /// # Errors
    /// See [`WeatherInputError`] variants; raised on malformed dates,
    /// non-hourly spacing, negative precipitation, a year-boundary
    /// crossing, or scenarios disagreeing on their day range.
    pub fn from_rows(rows: &[WeatherRow], yesterday_precip: f64) -> Result<Self, WeatherInputError> {
        if rows.is_empty() {
            return Err(WeatherInputError::Empty);
        }

        let mut by_scenario: BTreeMap<u32, Vec<(NaiveDateTime, &WeatherRow)>> = BTreeMap::new();
        for row in rows {
            let ts = parse_date(row.scenario, &row.date)?;
            if row.prec < 0.0 {
                return Err(WeatherInputError::NegativePrecipitation {
                    scenario: row.scenario,
                    at: ts,
                });
            }
            by_scenario.entry(row.scenario).or_default().push((ts, row));
        }

        let mut scenarios = BTreeMap::new();
        let mut shared_range: Option<(Day, Day)> = None;

        for (scenario_id, mut entries) in by_scenario {
            entries.sort_by_key(|(ts, _)| *ts);

            for pair in entries.windows(2) {
                let (prev_ts, _) = pair[0];
                let (next_ts, _) = pair[1];
                let expected = prev_ts + chrono::Duration::hours(1);
                if next_ts != expected {
                    return Err(WeatherInputError::NonSequentialHours {
                        scenario: scenario_id,
                        expected,
                        found: next_ts,
                    });
                }
            }

            let first_year = entries.first().expect("non-empty group").0.year();
            let last_year = entries.last().expect("non-empty group").0.year();
            if first_year != last_year {
                return Err(WeatherInputError::CrossesYearBoundary { scenario: scenario_id });
            }

            let min_day = entries.first().expect("non-empty group").0.date();
            let max_day = entries.last().expect("non-empty group").0.date();
            match shared_range {
                None => shared_range = Some((min_day, max_day)),
                Some((smin, smax)) if smin == min_day && smax == max_day => {}
                Some(_) => {
                    return Err(WeatherInputError::MismatchedDayRange { scenario: scenario_id });
                }
            }

            let precip_by_hour: BTreeMap<NaiveDateTime, f64> =
                entries.iter().map(|(ts, row)| (*ts, row.prec)).collect();

            let mut hourly = BTreeMap::new();
            for (ts, row) in &entries {
                hourly.insert(*ts, row_to_weather(row));
            }

            let mut daily = BTreeMap::new();
            let mut day = min_day;
            loop {
                if let Some(noon) = day.and_hms_opt(12, 0, 0) {
                    if let Some(weather) = hourly.get(&noon) {
                        let mut weather = *weather;
                        weather.precipitation = Millimetres::new(trailing_24h_precip(
                            &precip_by_hour,
                            noon,
                            yesterday_precip,
                        ));
                        daily.insert(day, weather);
                    }
                }
                if day >= max_day {
                    break;
                }
                day = day.succ_opt().unwrap_or(max_day);
            }

            scenarios.insert(ScenarioId(scenario_id), ScenarioWeather { hourly, daily });
        }

        let (min_day, max_day) = shared_range.expect("non-empty rows guarantee a range");
        Ok(Self {
            scenarios,
            min_day,
            max_day,
        })
    }

    /// Validate a CSV header matches spec.md §6.2 exactly (column names and
    /// order). Intended to be called against `csv::Reader::headers()`
    /// before deserializing rows, for a clearer error than a generic serde
    /// failure on the first data row.
    ///
    /// # Errors
    /// Returns [`WeatherInputError::MalformedHeader`] if the columns or
    /// their order don't match.
    pub fn validate_header(header: &csv::StringRecord) -> Result<(), WeatherInputError> {
        let actual: Vec<&str> = header.iter().collect();
        if actual != EXPECTED_HEADER {
            return Err(WeatherInputError::MalformedHeader(format!(
                "expected {EXPECTED_HEADER:?}, found {actual:?}"
            )));
        }
        Ok(())
    }

    /// Earliest day covered by every scenario in this stream.
    #[must_use]
    pub fn min_date(&self) -> Day {
        self.min_day
    }

    /// Latest day covered by every scenario in this stream.
    #[must_use]
    pub fn max_date(&self) -> Day {
        self.max_day
    }

    /// The hourly weather for `scenario` at `(day, hour)`.
    #[must_use]
    pub fn at(&self, scenario: ScenarioId, day: Day, hour: Hour) -> Option<FwiWeather> {
        let ts = day.and_hms_opt(hour, 0, 0)?;
        self.scenarios.get(&scenario)?.hourly.get(&ts).copied()
    }

    /// The noon-snapshot daily weather for `scenario` on `day`.
    #[must_use]
    pub fn daily(&self, scenario: ScenarioId, day: Day) -> Option<FwiWeather> {
        self.scenarios.get(&scenario)?.daily.get(&day).copied()
    }

    /// Every scenario id present in this stream.
    #[must_use]
    pub fn scenario_ids(&self) -> Vec<ScenarioId> {
        self.scenarios.keys().copied().collect()
    }
}

/// Sum of the 24 hourly precip values ending at (and including) `noon`,
/// falling back to `yesterday_seed` once for any missing hours at the
/// start of the stream (spec.md §4.2).
fn trailing_24h_precip(
    by_hour: &BTreeMap<NaiveDateTime, f64>,
    noon: NaiveDateTime,
    yesterday_seed: f64,
) -> f64 {
    let window_start = noon - chrono::Duration::hours(23);
    let mut sum = 0.0;
    let mut missing = 0u32;
    let mut t = window_start;
    while t <= noon {
        match by_hour.get(&t) {
            Some(p) => sum += p,
            None => missing += 1,
        }
        t += chrono::Duration::hours(1);
    }
    if missing > 0 {
        sum += yesterday_seed;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(scenario: u32, date: &str, prec: f64) -> WeatherRow {
        WeatherRow {
            scenario,
            date: date.to_string(),
            prec,
            temp: 20.0,
            rh: 40.0,
            ws: 10.0,
            wd: 180.0,
            ffmc: 88.0,
            dmc: 25.0,
            dc: 200.0,
            isi: 8.0,
            bui: 40.0,
            fwi: 15.0,
        }
    }

    #[test]
    fn builds_hourly_and_daily_series() {
        let rows: Vec<_> = (0..24)
            .map(|h| row(0, &format!("2024-06-01 {h:02}:00:00"), 0.0))
            .collect();
        let stream = FireWeatherStream::from_rows(&rows, 0.0).unwrap();
        assert_eq!(stream.min_date(), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(stream.max_date(), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert!(stream.at(ScenarioId(0), stream.min_date(), 12).is_some());
        assert!(stream.daily(ScenarioId(0), stream.min_date()).is_some());
    }

    #[test]
    fn rejects_non_hourly_gap() {
        let rows = vec![
            row(0, "2024-06-01 00:00:00", 0.0),
            row(0, "2024-06-01 02:00:00", 0.0),
        ];
        let err = FireWeatherStream::from_rows(&rows, 0.0).unwrap_err();
        assert!(matches!(err, WeatherInputError::NonSequentialHours { .. }));
    }

    #[test]
    fn rejects_negative_precipitation() {
        let rows = vec![row(0, "2024-06-01 00:00:00", -1.0)];
        let err = FireWeatherStream::from_rows(&rows, 0.0).unwrap_err();
        assert!(matches!(err, WeatherInputError::NegativePrecipitation { .. }));
    }

    #[test]
    fn rejects_mismatched_day_ranges_across_scenarios() {
        let rows = vec![
            row(0, "2024-06-01 12:00:00", 0.0),
            row(1, "2024-06-02 12:00:00", 0.0),
        ];
        let err = FireWeatherStream::from_rows(&rows, 0.0).unwrap_err();
        assert!(matches!(err, WeatherInputError::MismatchedDayRange { .. }));
    }

    #[test]
    fn rejects_year_boundary_crossing() {
        let rows = vec![
            row(0, "2024-12-31 23:00:00", 0.0),
            row(0, "2025-01-01 00:00:00", 0.0),
        ];
        let err = FireWeatherStream::from_rows(&rows, 0.0).unwrap_err();
        assert!(matches!(err, WeatherInputError::CrossesYearBoundary { .. }));
    }

    #[test]
    fn validate_header_matches_spec_order() {
        let good = csv::StringRecord::from(EXPECTED_HEADER.to_vec());
        assert!(FireWeatherStream::validate_header(&good).is_ok());
        let bad = csv::StringRecord::from(vec!["Scenario", "Date"]);
        assert!(FireWeatherStream::validate_header(&bad).is_err());
    }
}
