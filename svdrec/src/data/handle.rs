use std::path::Path;

use rusqlite::{params, Connection, OpenFlags};
use svdcore::{SensorId, Side};

use crate::data::calibration::{NoiseSource, NoiseTable};
use crate::data::event::{EventData, ReadStats, SampleRow};
use crate::error::Result;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS samples (
    event     INTEGER NOT NULL,
    sensor    INTEGER NOT NULL,
    is_u      INTEGER NOT NULL,
    strip     INTEGER NOT NULL,
    time      INTEGER NOT NULL,
    amplitude REAL    NOT NULL
);
CREATE INDEX IF NOT EXISTS samples_event ON samples (event);
CREATE TABLE IF NOT EXISTS noise (
    sensor INTEGER NOT NULL,
    is_u   INTEGER NOT NULL,
    strip  INTEGER NOT NULL,
    noise  REAL    NOT NULL,
    PRIMARY KEY (sensor, is_u, strip)
);
";

fn to_index(column: usize, value: i64) -> rusqlite::Result<usize> {
    usize::try_from(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Integer, Box::new(e))
    })
}

/// Readout samples and strip noise calibration kept in a SQLite file.
#[derive(Debug)]
pub struct SampleStore {
    pub connection: Connection,
}

impl SampleStore {
    /// Open for writing, the file is created when it does not exist.
    pub fn new(path: &Path) -> rusqlite::Result<Self> {
        let connection = Connection::open(path)?;
        Ok(Self { connection })
    }

    /// Open an existing store for reading, fails when the file is missing.
    pub fn open_read_only(path: &Path) -> rusqlite::Result<Self> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Ok(Self { connection })
    }

    pub fn in_memory() -> rusqlite::Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self { connection })
    }

    pub fn create_schema(&self) -> rusqlite::Result<()> {
        self.connection.execute_batch(SCHEMA)
    }

    /// All event numbers present, ascending.
    pub fn read_events(&self) -> rusqlite::Result<Vec<u32>> {
        let mut stmt = self.connection.prepare("SELECT DISTINCT event FROM samples ORDER BY event")?;
        let events_iter = stmt.query_map([], |row| row.get::<_, u32>(0))?;
        let mut events = Vec::new();
        for event in events_iter {
            events.push(event?);
        }
        Ok(events)
    }

    pub fn read_rows(&self, event: u32) -> rusqlite::Result<Vec<SampleRow>> {
        let mut stmt = self.connection.prepare(
            "SELECT sensor, is_u, strip, time, amplitude FROM samples WHERE event = ?1 \
             ORDER BY sensor, is_u DESC, strip, time",
        )?;
        let rows_iter = stmt.query_map([event], |row| {
            Ok(SampleRow {
                sensor_id: SensorId::from_packed(row.get(0)?),
                side: Side::from_is_u(row.get(1)?),
                strip: to_index(2, row.get(2)?)?,
                time: to_index(3, row.get(3)?)?,
                amplitude: row.get::<_, f64>(4)? as f32,
            })
        })?;
        let mut rows = Vec::new();
        for row in rows_iter {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Read one event with noise attached, split into sorted per sensor/side scans.
    pub fn read_event<N: NoiseSource + ?Sized>(
        &self,
        event: u32,
        noise: &N,
        zero_suppression_snr: Option<f32>,
        require_noise: bool,
    ) -> Result<(EventData, ReadStats)> {
        let rows = self.read_rows(event)?;
        let (data, stats) = EventData::from_rows(event, rows, noise, zero_suppression_snr, require_noise)?;
        log::debug!(
            "event {}: {} rows, {} scans, {} suppressed, {} without noise",
            event,
            stats.rows,
            data.scans.len(),
            stats.suppressed,
            stats.missing_noise
        );
        Ok((data, stats))
    }

    pub fn read_noise(&self) -> rusqlite::Result<NoiseTable> {
        let mut stmt = self.connection.prepare("SELECT sensor, is_u, strip, noise FROM noise")?;
        let noise_iter = stmt.query_map([], |row| {
            Ok((
                SensorId::from_packed(row.get(0)?),
                Side::from_is_u(row.get(1)?),
                to_index(2, row.get(2)?)?,
                row.get::<_, f64>(3)? as f32,
            ))
        })?;
        let mut table = NoiseTable::new();
        for entry in noise_iter {
            let (sensor, side, strip, noise) = entry?;
            table.insert(sensor, side, strip, noise);
        }
        Ok(table)
    }

    pub fn write_noise(&mut self, table: &NoiseTable) -> rusqlite::Result<()> {
        let tx = self.connection.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT OR REPLACE INTO noise (sensor, is_u, strip, noise) VALUES (?1, ?2, ?3, ?4)")?;
            for (sensor, side, strip, noise) in table.entries() {
                stmt.execute(params![sensor.to_packed(), side.is_u(), strip as i64, noise as f64])?;
            }
        }
        tx.commit()
    }

    pub fn write_event(&mut self, event: &EventData) -> rusqlite::Result<()> {
        let tx = self.connection.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO samples (event, sensor, is_u, strip, time, amplitude) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for row in event.to_rows() {
                stmt.execute(params![
                    event.event,
                    row.sensor_id.to_packed(),
                    row.side.is_u(),
                    row.strip as i64,
                    row.time as i64,
                    row.amplitude as f64
                ])?;
            }
        }
        tx.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::calibration::ConstantNoise;
    use crate::data::event::SensorScan;
    use crate::error::RecError;
    use svdcore::Sample;

    fn event(number: u32) -> EventData {
        let a = SensorId::new(3, 1, 1);
        let b = SensorId::new(4, 2, 1);
        let s = |strip, time, amplitude| Sample::new(strip, time, amplitude, 2.0).unwrap();
        EventData {
            event: number,
            scans: vec![
                SensorScan { sensor_id: a, side: Side::U, samples: vec![s(10, 0, 20.0), s(10, 1, 30.0), s(11, 1, 8.0)] },
                SensorScan { sensor_id: a, side: Side::V, samples: vec![s(3, 2, 15.0)] },
                SensorScan { sensor_id: b, side: Side::U, samples: vec![s(100, 4, 40.0)] },
            ],
        }
    }

    fn store() -> SampleStore {
        let mut store = SampleStore::in_memory().unwrap();
        store.create_schema().unwrap();
        store.write_event(&event(7)).unwrap();
        store.write_event(&event(2)).unwrap();
        store
    }

    #[test]
    fn test_events_listed_in_order() {
        assert_eq!(store().read_events().unwrap(), vec![2, 7]);
    }

    #[test]
    fn test_event_read_back() {
        let store = store();
        let (data, stats) = store.read_event(7, &ConstantNoise(2.0), None, false).unwrap();
        assert_eq!(stats.rows, 5);
        assert_eq!(data, event(7));
    }

    #[test]
    fn test_noise_table_round_trip() {
        let mut store = store();
        let a = SensorId::new(3, 1, 1);
        let mut table = NoiseTable::new();
        table.insert(a, Side::U, 10, 2.0);
        table.insert(a, Side::U, 11, 2.0);
        table.insert(a, Side::V, 3, 2.0);
        store.write_noise(&table).unwrap();

        let loaded = store.read_noise().unwrap();
        assert_eq!(loaded.entries(), table.entries());

        // sensor b has no calibration
        let (data, stats) = store.read_event(7, &loaded, None, false).unwrap();
        assert_eq!(stats.missing_noise, 1);
        assert_eq!(data.scans.len(), 2);

        assert!(matches!(
            store.read_event(7, &loaded, None, true),
            Err(RecError::MissingNoise { strip: 100, .. })
        ));
    }

    #[test]
    fn test_unknown_event_is_empty() {
        let (data, _) = store().read_event(99, &ConstantNoise(1.0), None, false).unwrap();
        assert!(data.scans.is_empty());
    }

    #[test]
    fn test_read_only_open() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.sqlite");
        assert!(SampleStore::open_read_only(&missing).is_err());
        assert!(!missing.exists());

        let path = dir.path().join("samples.sqlite");
        {
            let mut store = SampleStore::new(&path).unwrap();
            store.create_schema().unwrap();
            store.write_event(&event(7)).unwrap();
        }
        let mut store = SampleStore::open_read_only(&path).unwrap();
        assert_eq!(store.read_events().unwrap(), vec![7]);
        assert!(store.write_event(&event(8)).is_err());
    }
}
