use crate::errors::{ForecastError, ForecastResult};
use crate::models::{EntityKey, EntitySeries, PriceRecord, SeriesRow, SourceColumns, WeatherField};
use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

const DATE_COLUMNS: [&str; 2] = ["tanggal", "date"];
const COMMODITY_COLUMNS: [&str; 2] = ["komoditas", "commodity"];
const REGION_COLUMNS: [&str; 2] = ["wilayah", "region"];
const PRICE_COLUMNS: [&str; 2] = ["harga", "price"];
const RAINFALL_COLUMN: &str = "rr";
const RAMADAN_COLUMN: &str = "dum_ramadan";
const IDUL_FITRI_COLUMN: &str = "dum_idulfitri";
const CHRISTMAS_NEW_YEAR_COLUMN: &str = "dum_natal_newyr";
const IMPUTATION_FLAG_COLUMN: &str = "imputasi_flag";

/// Counters collected while cleaning the dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub invalid_price_rows: usize,
    pub invalid_date_rows: usize,
    pub missing_entity_rows: usize,
    pub duplicate_dates_collapsed: usize,
    pub missing_weather: [usize; 3],
}

/// Column positions resolved from the CSV header.
struct ColumnMap {
    date: usize,
    commodity: usize,
    region: usize,
    price: usize,
    weather: [Option<usize>; 3],
    rainfall: Option<usize>,
    ramadan: Option<usize>,
    idul_fitri: Option<usize>,
    christmas_new_year: Option<usize>,
    imputation_flag: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> ForecastResult<Self> {
        Ok(Self {
            date: require_column(headers, &DATE_COLUMNS)?,
            commodity: require_column(headers, &COMMODITY_COLUMNS)?,
            region: require_column(headers, &REGION_COLUMNS)?,
            price: require_column(headers, &PRICE_COLUMNS)?,
            weather: WeatherField::ALL.map(|field| find_column(headers, field.column())),
            rainfall: find_column(headers, RAINFALL_COLUMN),
            ramadan: find_column(headers, RAMADAN_COLUMN),
            idul_fitri: find_column(headers, IDUL_FITRI_COLUMN),
            christmas_new_year: find_column(headers, CHRISTMAS_NEW_YEAR_COLUMN),
            imputation_flag: find_column(headers, IMPUTATION_FLAG_COLUMN),
        })
    }

    fn source_columns(&self) -> SourceColumns {
        SourceColumns {
            weather: self.weather.map(|column| column.is_some()),
            rainfall: self.rainfall.is_some(),
            ramadan: self.ramadan.is_some(),
            idul_fitri: self.idul_fitri.is_some(),
            christmas_new_year: self.christmas_new_year.is_some(),
            imputation_flag: self.imputation_flag.is_some(),
        }
    }
}

fn find_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
}

fn require_column(headers: &StringRecord, names: &[&str]) -> ForecastResult<usize> {
    names
        .iter()
        .find_map(|name| find_column(headers, name))
        .ok_or_else(|| {
            ForecastError::Dataset(format!(
                "dataset is missing required column {}",
                names.join("/")
            ))
        })
}

/// Historical price series for every commodity/region pair, loaded once and
/// shared read-only.
#[derive(Debug, Default)]
pub struct SeriesStore {
    entities: BTreeMap<EntityKey, Arc<EntitySeries>>,
    commodities: Vec<String>,
    regions: Vec<String>,
    source_columns: SourceColumns,
    report: IngestionReport,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> ForecastResult<Self> {
        let mut store = Self::new();
        store.load(path)?;
        Ok(store)
    }

    /// Replaces the store contents with the dataset at `path`.
    pub fn load(&mut self, path: impl AsRef<Path>) -> ForecastResult<()> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            ForecastError::Dataset(format!("failed to open {}: {}", path.display(), err))
        })?;
        self.load_from_reader(BufReader::new(file))?;
        info!(
            "Loaded {} price row(s) for {} series from {}",
            self.report.rows_kept,
            self.entities.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load_from_reader<R: Read>(&mut self, reader: R) -> ForecastResult<()> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);
        let columns = ColumnMap::from_headers(csv_reader.headers()?)?;

        let mut report = IngestionReport::default();
        let mut records = Vec::new();
        for row in csv_reader.records() {
            let row = row?;
            report.rows_read += 1;
            if let Some(record) = parse_record(&row, &columns, &mut report) {
                records.push(record);
            }
        }

        let dropped = report.invalid_price_rows + report.invalid_date_rows + report.missing_entity_rows;
        if dropped > 0 {
            warn!(
                "Dropped {} of {} dataset row(s): {} invalid price, {} invalid date, {} missing commodity/region",
                dropped,
                report.rows_read,
                report.invalid_price_rows,
                report.invalid_date_rows,
                report.missing_entity_rows
            );
        }

        *self = Self::build(records, columns.source_columns(), report);
        Ok(())
    }

    /// Builds a store from already parsed records.
    pub fn from_records(records: Vec<PriceRecord>, source_columns: SourceColumns) -> Self {
        let rows_read = records.len();
        let valid: Vec<PriceRecord> = records
            .into_iter()
            .filter(|record| record.price.is_finite() && record.price > 0.0)
            .map(|mut record| {
                // Non-finite readings count as missing and get imputed.
                for reading in record.weather.iter_mut().chain([&mut record.rainfall]) {
                    *reading = reading.filter(|value| value.is_finite());
                }
                record
            })
            .collect();
        let report = IngestionReport {
            rows_read,
            invalid_price_rows: rows_read - valid.len(),
            ..Default::default()
        };
        Self::build(valid, source_columns, report)
    }

    fn build(
        records: Vec<PriceRecord>,
        source_columns: SourceColumns,
        mut report: IngestionReport,
    ) -> Self {
        let mut grouped: BTreeMap<EntityKey, Vec<PriceRecord>> = BTreeMap::new();
        for record in records {
            grouped.entry(record.key()).or_default().push(record);
        }

        let global_means = weather_means(grouped.values().flatten());
        let mut entities = BTreeMap::new();
        let mut commodities = BTreeSet::new();
        let mut regions = BTreeSet::new();

        for (key, mut records) in grouped {
            records.sort_by_key(|record| record.date);
            let before = records.len();
            let records = collapse_duplicate_dates(records);
            let collapsed = before - records.len();
            if collapsed > 0 {
                warn!(
                    "{} had {} duplicate date row(s); keeping the last row per date",
                    key, collapsed
                );
                report.duplicate_dates_collapsed += collapsed;
            }

            let entity_means = weather_means(records.iter());
            let fill: [f64; 3] = [0usize, 1, 2].map(|idx| {
                entity_means[idx].or(global_means[idx]).unwrap_or(0.0)
            });

            let rows: Vec<SeriesRow> = records
                .iter()
                .map(|record| {
                    let mut weather = [0.0; 3];
                    let mut weather_imputed = [false; 3];
                    for field in WeatherField::ALL {
                        let idx = field.index();
                        match record.weather[idx] {
                            Some(value) => weather[idx] = value,
                            None => {
                                weather_imputed[idx] = source_columns.has_weather(field);
                                weather[idx] = if source_columns.has_weather(field) {
                                    fill[idx]
                                } else {
                                    0.0
                                };
                            }
                        }
                    }
                    for idx in 0..3 {
                        if weather_imputed[idx] {
                            report.missing_weather[idx] += 1;
                        }
                    }
                    SeriesRow {
                        date: record.date,
                        price: record.price,
                        weather,
                        weather_imputed,
                        rainfall: record.rainfall,
                        ramadan: record.ramadan,
                        idul_fitri: record.idul_fitri,
                        christmas_new_year: record.christmas_new_year,
                        imputation_flag: record
                            .imputation_flag
                            .unwrap_or_else(|| weather_imputed.iter().any(|flag| *flag)),
                    }
                })
                .collect();

            report.rows_kept += rows.len();
            commodities.insert(key.commodity.clone());
            regions.insert(key.region.clone());
            entities.insert(key.clone(), Arc::new(EntitySeries { key, rows }));
        }

        Self {
            entities,
            commodities: commodities.into_iter().collect(),
            regions: regions.into_iter().collect(),
            source_columns,
            report,
        }
    }

    pub fn series(&self, key: &EntityKey) -> ForecastResult<Arc<EntitySeries>> {
        self.entities
            .get(key)
            .filter(|series| !series.is_empty())
            .cloned()
            .ok_or_else(|| ForecastError::data_not_found(key))
    }

    pub fn commodities(&self) -> &[String] {
        &self.commodities
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn has_commodity(&self, commodity: &str) -> bool {
        self.commodities.binary_search_by(|c| c.as_str().cmp(commodity)).is_ok()
    }

    pub fn has_region(&self, region: &str) -> bool {
        self.regions.binary_search_by(|r| r.as_str().cmp(region)).is_ok()
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.entities.keys()
    }

    pub fn all_series(&self) -> impl Iterator<Item = &Arc<EntitySeries>> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn total_rows(&self) -> usize {
        self.entities.values().map(|series| series.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn source_columns(&self) -> SourceColumns {
        self.source_columns
    }

    pub fn ingestion_report(&self) -> &IngestionReport {
        &self.report
    }
}

/// Keeps the last record for each date of a date-sorted slice.
fn collapse_duplicate_dates(records: Vec<PriceRecord>) -> Vec<PriceRecord> {
    let mut unique: Vec<PriceRecord> = Vec::with_capacity(records.len());
    for record in records {
        match unique.last_mut() {
            Some(last) if last.date == record.date => *last = record,
            _ => unique.push(record),
        }
    }
    unique
}

fn weather_means<'a>(records: impl Iterator<Item = &'a PriceRecord>) -> [Option<f64>; 3] {
    let mut sums = [0.0; 3];
    let mut counts = [0usize; 3];
    for record in records {
        for (idx, value) in record.weather.iter().enumerate() {
            if let Some(value) = value {
                sums[idx] += value;
                counts[idx] += 1;
            }
        }
    }
    [0usize, 1, 2].map(|idx| (counts[idx] > 0).then(|| sums[idx] / counts[idx] as f64))
}

fn parse_record(
    row: &StringRecord,
    columns: &ColumnMap,
    report: &mut IngestionReport,
) -> Option<PriceRecord> {
    let field = move |idx: usize| row.get(idx).map(str::trim).unwrap_or("");
    let optional = move |idx: Option<usize>| idx.map(field).filter(|raw| !raw.is_empty());

    let commodity = field(columns.commodity);
    let region = field(columns.region);
    if commodity.is_empty() || region.is_empty() {
        report.missing_entity_rows += 1;
        return None;
    }

    let Some(date) = parse_date(field(columns.date)) else {
        report.invalid_date_rows += 1;
        return None;
    };

    let price = match parse_number(field(columns.price)) {
        Some(price) if price > 0.0 => price,
        _ => {
            report.invalid_price_rows += 1;
            return None;
        }
    };

    let mut record = PriceRecord::new(date, commodity, region, price);
    record.weather = columns
        .weather
        .map(|column| optional(column).and_then(parse_number));
    record.rainfall = optional(columns.rainfall).and_then(parse_number);
    record.ramadan = optional(columns.ramadan).map_or(false, parse_flag);
    record.idul_fitri = optional(columns.idul_fitri).map_or(false, parse_flag);
    record.christmas_new_year = optional(columns.christmas_new_year).map_or(false, parse_flag);
    record.imputation_flag = optional(columns.imputation_flag).map(parse_flag);
    Some(record)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|datetime| datetime.date())
        })
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_flag(raw: &str) -> bool {
    if raw.eq_ignore_ascii_case("true") {
        return true;
    }
    parse_number(raw).map_or(false, |value| value != 0.0)
}
