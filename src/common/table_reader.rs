use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use duckdb::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::grouping::TaggedReading;
use super::types::{Crop, CycleContext, DateRange, EntityId, Reading};
use crate::error::{Result, StatsError};

/// Default schema created by [`DuckDbStore::init_schema`].
pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS cycles (
    cycle_id INTEGER PRIMARY KEY,
    description VARCHAR,
    start_date DATE NOT NULL,
    end_date DATE NOT NULL
);
CREATE TABLE IF NOT EXISTS crops (
    crop_id INTEGER PRIMARY KEY,
    cycle_id INTEGER NOT NULL,
    name VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS humidity_readings (
    bed_id INTEGER NOT NULL,
    recorded_at TIMESTAMP NOT NULL,
    humidity DOUBLE
);
CREATE TABLE IF NOT EXISTS manual_irrigation (
    crop_id INTEGER NOT NULL,
    started_at TIMESTAMP NOT NULL,
    stopped_at TIMESTAMP,
    volume DOUBLE
);
CREATE TABLE IF NOT EXISTS valve_irrigation (
    crop_id INTEGER NOT NULL,
    started_at TIMESTAMP NOT NULL,
    volume DOUBLE
);
";

/// Location of one kind of reading: table plus entity/timestamp/value columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSpec {
    pub table: String,
    pub entity_col: String,
    pub timestamp_col: String,
    pub value_col: String,
}

impl TableSpec {
    pub fn new(table: &str, entity_col: &str, timestamp_col: &str, value_col: &str) -> Self {
        Self {
            table: table.to_string(),
            entity_col: entity_col.to_string(),
            timestamp_col: timestamp_col.to_string(),
            value_col: value_col.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (what, name) in [
            ("table", &self.table),
            ("entity column", &self.entity_col),
            ("timestamp column", &self.timestamp_col),
            ("value column", &self.value_col),
        ] {
            if name.trim().is_empty() {
                return Err(StatsError::InvalidInput(format!("{} name cannot be empty", what)));
            }
        }
        Ok(())
    }
}

impl Default for TableSpec {
    fn default() -> Self {
        Self::new("readings", "entity_id", "timestamp", "value")
    }
}

/// Read-only access to readings, parameterized by entity id.
pub trait ReadingSource {
    /// Readings of one entity whose date lies in `range`, ordered by timestamp.
    /// Fails with `InvalidInput` if the entity is unknown.
    fn readings(&self, entity_id: EntityId, range: &DateRange) -> Result<Vec<Reading>>;

    /// All entity ids present in the source, ascending.
    fn entity_ids(&self) -> Result<Vec<EntityId>>;

    /// Readings of several entities in `range`, tagged with their entity.
    /// Entities without readings contribute nothing; no id is rejected.
    fn tagged_readings(&self, entity_ids: &[EntityId], range: &DateRange) -> Result<Vec<TaggedReading>>;
}

/// Cycle and crop metadata.
pub trait CycleCatalog {
    /// Fails with `InvalidInput` if the cycle does not exist.
    fn cycle(&self, cycle_id: EntityId) -> Result<CycleContext>;

    /// Crops of a cycle ordered by name.
    fn crops(&self, cycle_id: EntityId) -> Result<Vec<Crop>>;
}

/// A DuckDB database holding readings and cycle metadata.
pub struct DuckDbStore {
    conn: Connection,
}

impl DuckDbStore {
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening DuckDB database at {}", path.display());
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create the default tables if they do not exist.
    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// A reading source over one or more tables. Readings of all tables
    /// are merged.
    pub fn source(&self, tables: Vec<TableSpec>) -> TableSource<'_> {
        TableSource {
            conn: &self.conn,
            tables,
        }
    }

    pub fn catalog<'a>(&'a self, cycles_table: &str, crops_table: &str) -> DuckDbCatalog<'a> {
        DuckDbCatalog {
            conn: &self.conn,
            cycles_table: cycles_table.to_string(),
            crops_table: crops_table.to_string(),
        }
    }
}

/// [`ReadingSource`] backed by DuckDB tables.
pub struct TableSource<'a> {
    conn: &'a Connection,
    tables: Vec<TableSpec>,
}

impl TableSource<'_> {
    /// Query one table for `(entity, epoch_ms, value)` rows in range,
    /// optionally restricted to one entity. NULL and NaN values are skipped.
    fn read_table(
        &self,
        spec: &TableSpec,
        entity_id: Option<EntityId>,
        range: &DateRange,
    ) -> Result<Vec<TaggedReading>> {
        let mut sql = format!(
            "SELECT CAST(\"{entity}\" AS BIGINT), epoch_ms(CAST(\"{ts}\" AS TIMESTAMP)), CAST(\"{val}\" AS DOUBLE) \
             FROM \"{table}\" \
             WHERE CAST(\"{ts}\" AS DATE) BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)",
            entity = escape_identifier(&spec.entity_col),
            ts = escape_identifier(&spec.timestamp_col),
            val = escape_identifier(&spec.value_col),
            table = escape_identifier(&spec.table),
        );
        if entity_id.is_some() {
            sql.push_str(&format!(" AND \"{}\" = ?", escape_identifier(&spec.entity_col)));
        }
        sql.push_str(&format!(" ORDER BY \"{}\"", escape_identifier(&spec.timestamp_col)));

        let start = format_date(range.start);
        let end = format_date(range.end);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = match entity_id {
            Some(id) => stmt.query(params![start, end, id])?,
            None => stmt.query(params![start, end])?,
        };

        let mut readings = Vec::new();
        let mut skipped = 0usize;
        while let Some(row) = rows.next()? {
            let entity: Option<i64> = row.get(0)?;
            let millis: Option<i64> = row.get(1)?;
            let value: Option<f64> = row.get(2)?;

            let (Some(entity), Some(millis), Some(value)) = (entity, millis, value) else {
                skipped += 1;
                continue;
            };
            if value.is_nan() {
                skipped += 1;
                continue;
            }
            let Some(timestamp) = timestamp_from_millis(millis) else {
                skipped += 1;
                continue;
            };

            readings.push(TaggedReading {
                entity_id: entity,
                reading: Reading::new(timestamp, value),
            });
        }

        debug!(
            table = %spec.table,
            rows = readings.len(),
            skipped,
            "Read readings"
        );
        Ok(readings)
    }
}

impl ReadingSource for TableSource<'_> {
    fn readings(&self, entity_id: EntityId, range: &DateRange) -> Result<Vec<Reading>> {
        if !self.entity_ids()?.contains(&entity_id) {
            return Err(StatsError::InvalidInput(format!("Unknown entity id {}", entity_id)));
        }
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let mut readings: Vec<Reading> = Vec::new();
        for spec in &self.tables {
            readings.extend(
                self.read_table(spec, Some(entity_id), range)?
                    .into_iter()
                    .map(|t| t.reading),
            );
        }
        readings.sort_by_key(|r| r.timestamp);
        Ok(readings)
    }

    fn entity_ids(&self) -> Result<Vec<EntityId>> {
        let mut ids = Vec::new();
        for spec in &self.tables {
            let sql = format!(
                "SELECT DISTINCT CAST(\"{entity}\" AS BIGINT) FROM \"{table}\" WHERE \"{entity}\" IS NOT NULL",
                entity = escape_identifier(&spec.entity_col),
                table = escape_identifier(&spec.table),
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params![], |row| row.get::<_, i64>(0))?;
            for id in rows {
                ids.push(id?);
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn tagged_readings(&self, entity_ids: &[EntityId], range: &DateRange) -> Result<Vec<TaggedReading>> {
        if range.is_empty() || entity_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tagged = Vec::new();
        for spec in &self.tables {
            tagged.extend(
                self.read_table(spec, None, range)?
                    .into_iter()
                    .filter(|t| entity_ids.contains(&t.entity_id)),
            );
        }
        tagged.sort_by_key(|t| (t.entity_id, t.reading.timestamp));
        Ok(tagged)
    }
}

/// [`CycleCatalog`] backed by DuckDB tables with the default column names.
pub struct DuckDbCatalog<'a> {
    conn: &'a Connection,
    cycles_table: String,
    crops_table: String,
}

impl CycleCatalog for DuckDbCatalog<'_> {
    fn cycle(&self, cycle_id: EntityId) -> Result<CycleContext> {
        let sql = format!(
            "SELECT description, CAST(start_date AS VARCHAR), CAST(end_date AS VARCHAR) \
             FROM \"{}\" WHERE cycle_id = ?",
            escape_identifier(&self.cycles_table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![cycle_id])?;

        let Some(row) = rows.next()? else {
            return Err(StatsError::InvalidInput(format!("Unknown cycle id {}", cycle_id)));
        };
        let description: Option<String> = row.get(0)?;
        let start: String = row.get(1)?;
        let end: String = row.get(2)?;

        Ok(CycleContext {
            id: cycle_id,
            description: description.unwrap_or_default(),
            start_date: parse_stored_date(&start)?,
            end_date: parse_stored_date(&end)?,
        })
    }

    fn crops(&self, cycle_id: EntityId) -> Result<Vec<Crop>> {
        let sql = format!(
            "SELECT CAST(crop_id AS BIGINT), name FROM \"{}\" WHERE cycle_id = ? ORDER BY name, crop_id",
            escape_identifier(&self.crops_table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![cycle_id], |row| {
            Ok(Crop {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        let mut crops = Vec::new();
        for crop in rows {
            crops.push(crop?);
        }
        Ok(crops)
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_stored_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| StatsError::InvalidInput(format!("Stored date '{}' is malformed: {}", raw, e)))
}

fn timestamp_from_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Escape a SQL identifier by doubling any internal double quotes.
fn escape_identifier(name: &str) -> String {
    name.replace('"', "\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn seeded() -> DuckDbStore {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store
            .connection()
            .execute_batch(
                "INSERT INTO cycles VALUES (1, 'Spring tomatoes', DATE '2024-03-01', DATE '2024-03-31');
                 INSERT INTO crops VALUES (10, 1, 'Tomato'), (11, 1, 'Basil'), (12, 2, 'Lettuce');
                 INSERT INTO humidity_readings VALUES
                    (1, TIMESTAMP '2024-03-01 06:00:00', 41.0),
                    (1, TIMESTAMP '2024-03-01 07:30:00', NULL),
                    (1, TIMESTAMP '2024-03-02 06:00:00', 'NaN'::DOUBLE),
                    (1, TIMESTAMP '2024-03-03 23:59:59', 45.5),
                    (1, TIMESTAMP '2024-03-04 00:00:00', 50.0),
                    (2, TIMESTAMP '2024-03-02 12:00:00', 30.0);
                 INSERT INTO manual_irrigation VALUES
                    (10, TIMESTAMP '2024-03-05 08:00:00', TIMESTAMP '2024-03-05 08:20:00', 12.0),
                    (11, TIMESTAMP '2024-04-05 08:00:00', NULL, 99.0);
                 INSERT INTO valve_irrigation VALUES
                    (10, TIMESTAMP '2024-03-06 08:00:00', 18.0),
                    (12, TIMESTAMP '2024-03-06 09:00:00', 7.0);",
            )
            .unwrap();
        store
    }

    fn humidity(store: &DuckDbStore) -> TableSource<'_> {
        store.source(vec![TableSpec::new("humidity_readings", "bed_id", "recorded_at", "humidity")])
    }

    fn irrigation(store: &DuckDbStore) -> TableSource<'_> {
        store.source(vec![
            TableSpec::new("manual_irrigation", "crop_id", "started_at", "volume"),
            TableSpec::new("valve_irrigation", "crop_id", "started_at", "volume"),
        ])
    }

    #[test]
    fn test_readings_filtered_by_entity_and_inclusive_range() {
        let store = seeded();
        let source = humidity(&store);

        let readings = source.readings(1, &DateRange::new(date(1), date(3))).unwrap();
        let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
        // NULL and NaN rows are skipped; 2024-03-04 is outside the range
        assert_eq!(values, vec![41.0, 45.5]);
        assert_eq!(
            readings[1].timestamp,
            date(3).and_hms_opt(23, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let store = seeded();
        let err = humidity(&store)
            .readings(99, &DateRange::new(date(1), date(31)))
            .unwrap_err();
        assert!(matches!(err, StatsError::InvalidInput(_)));
    }

    #[test]
    fn test_inverted_range_returns_nothing() {
        let store = seeded();
        let readings = humidity(&store)
            .readings(1, &DateRange::new(date(10), date(1)))
            .unwrap();
        assert!(readings.is_empty());
    }

    #[test]
    fn test_entity_ids_union_tables() {
        let store = seeded();
        assert_eq!(humidity(&store).entity_ids().unwrap(), vec![1, 2]);
        assert_eq!(irrigation(&store).entity_ids().unwrap(), vec![10, 11, 12]);
    }

    #[test]
    fn test_tagged_readings_merge_tables() {
        let store = seeded();
        let tagged = irrigation(&store)
            .tagged_readings(&[10, 11], &DateRange::new(date(1), date(31)))
            .unwrap();
        let pairs: Vec<(EntityId, f64)> = tagged.iter().map(|t| (t.entity_id, t.reading.value)).collect();
        assert_eq!(pairs, vec![(10, 12.0), (10, 18.0)]);
    }

    #[test]
    fn test_catalog_cycle_and_crops() {
        let store = seeded();
        let catalog = store.catalog("cycles", "crops");

        let cycle = catalog.cycle(1).unwrap();
        assert_eq!(cycle.description, "Spring tomatoes");
        assert_eq!(cycle.range(), DateRange::new(date(1), date(31)));

        let crops = catalog.crops(1).unwrap();
        let names: Vec<&str> = crops.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Basil", "Tomato"]);

        assert!(matches!(catalog.cycle(7), Err(StatsError::InvalidInput(_))));
        assert!(catalog.crops(7).unwrap().is_empty());
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("plain"), "plain");
        assert_eq!(escape_identifier("we\"ird"), "we\"\"ird");
    }
}
