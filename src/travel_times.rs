use std::{collections::HashMap, fs::File, io::Read, path::Path};

use crate::error::{Error, Result};

/// Driving time assumed when a station is missing from the matrix.
pub const UNREACHABLE_SECONDS: f64 = 3600.0;

/// Precomputed OSRM driving times, one row per incident and one column per station.
#[derive(Debug, Clone, Default)]
pub struct TravelTimes {
    stations: Vec<String>,
    station_columns: HashMap<String, usize>,
    incident_rows: HashMap<String, usize>,
    cells: Vec<Vec<Option<f64>>>,
}

/// Canonical form of an incident key: trimmed, with integral numbers
/// written without a fractional part so `"17.0"` and `"17"` coincide.
pub fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", value as i64)
        }
        _ => trimmed.to_owned(),
    }
}

fn parse_cell(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| !value.is_nan())
}

impl TravelTimes {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        // short rows leave their trailing stations missing
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let stations: Vec<String> = reader
            .headers()?
            .iter()
            .skip(1)
            .map(|header| header.trim().to_owned())
            .collect();
        if stations.is_empty() {
            return Err(Error::EmptyTravelTimeHeader);
        }

        let mut table = Self {
            station_columns: stations
                .iter()
                .enumerate()
                .map(|(column, station)| (station.to_owned(), column))
                .collect(),
            stations,
            ..Default::default()
        };

        for record in reader.records() {
            let record = record?;
            let Some(key) = record.get(0) else {
                continue;
            };
            let cells = (1..=table.stations.len())
                .map(|column| record.get(column).and_then(parse_cell))
                .collect();
            table.insert_row(normalize_key(key), cells);
        }

        Ok(table)
    }

    fn insert_row(&mut self, key: String, cells: Vec<Option<f64>>) {
        if self.incident_rows.contains_key(&key) {
            log::warn!("Duplicate incident {key} in travel time matrix, keeping the first row");
            return;
        }
        self.incident_rows.insert(key, self.cells.len());
        self.cells.push(cells);
    }

    /// Driving seconds from `station` to the incident keyed by `incident`
    /// (already normalised). `None` if the row, column or cell is missing.
    pub fn lookup(&self, incident: &str, station: &str) -> Option<f64> {
        let row = self.incident_rows.get(incident)?;
        let column = self.station_columns.get(station)?;
        self.cells[*row][*column]
    }

    /// Adds a column filled with `fill` for every station the matrix lacks.
    /// Returns the stations that were added.
    pub fn patch_missing_stations<'a>(
        &mut self,
        stations: impl IntoIterator<Item = &'a str>,
        fill: f64,
    ) -> Vec<String> {
        let mut added = Vec::new();
        for station in stations {
            if self.station_columns.contains_key(station) {
                continue;
            }
            log::info!("Adding missing travel time column {station}");
            self.station_columns
                .insert(station.to_owned(), self.stations.len());
            self.stations.push(station.to_owned());
            self.cells.iter_mut().for_each(|row| row.push(Some(fill)));
            added.push(station.to_owned());
        }
        added
    }

    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    pub fn incident_count(&self) -> usize {
        self.cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATRIX: &str = "incident_index,Alpha,Bravo\n\
                          1,120.5,300\n\
                          2.0,,45\n\
                          3,oops,60\n";

    #[test]
    fn reads_matrix_and_normalizes_keys() {
        let table = TravelTimes::from_reader(MATRIX.as_bytes()).unwrap();

        assert_eq!(table.stations(), ["Alpha", "Bravo"]);
        assert_eq!(table.incident_count(), 3);
        assert_eq!(table.lookup("1", "Alpha"), Some(120.5));
        assert_eq!(table.lookup("2", "Bravo"), Some(45.0));
    }

    #[test]
    fn missing_cells_rows_and_columns_are_none() {
        let table = TravelTimes::from_reader(MATRIX.as_bytes()).unwrap();

        assert_eq!(table.lookup("2", "Alpha"), None);
        assert_eq!(table.lookup("3", "Alpha"), None);
        assert_eq!(table.lookup("9", "Alpha"), None);
        assert_eq!(table.lookup("1", "Charlie"), None);
    }

    #[test]
    fn patching_fills_new_columns_only() {
        let mut table = TravelTimes::from_reader(MATRIX.as_bytes()).unwrap();

        let added = table.patch_missing_stations(["Alpha", "Charlie"], UNREACHABLE_SECONDS);

        assert_eq!(added, vec!["Charlie".to_owned()]);
        assert_eq!(table.lookup("1", "Charlie"), Some(UNREACHABLE_SECONDS));
        assert_eq!(table.lookup("1", "Alpha"), Some(120.5));
    }

    #[test]
    fn short_rows_leave_trailing_stations_missing() {
        let table =
            TravelTimes::from_reader("incident_index,Alpha,Bravo\n1,60\n2,10,20\n".as_bytes())
                .unwrap();

        assert_eq!(table.incident_count(), 2);
        assert_eq!(table.lookup("1", "Alpha"), Some(60.0));
        assert_eq!(table.lookup("1", "Bravo"), None);
        assert_eq!(table.lookup("2", "Bravo"), Some(20.0));
    }

    #[test]
    fn duplicate_incident_keeps_first_row() {
        let table = TravelTimes::from_reader(
            "incident_index,Alpha\n7,10\n7.0,99\n8,5\n".as_bytes(),
        )
        .unwrap();

        assert_eq!(table.incident_count(), 2);
        assert_eq!(table.lookup("7", "Alpha"), Some(10.0));
        assert_eq!(table.lookup("8", "Alpha"), Some(5.0));
    }

    #[test]
    fn header_without_stations_is_rejected() {
        let result = TravelTimes::from_reader("incident_index\n1\n".as_bytes());
        assert!(matches!(result, Err(Error::EmptyTravelTimeHeader)));
    }

    #[test]
    fn key_normalization() {
        assert_eq!(normalize_key(" 42.0 "), "42");
        assert_eq!(normalize_key("42.5"), "42.5");
        assert_eq!(normalize_key("INC-7"), "INC-7");
    }
}
