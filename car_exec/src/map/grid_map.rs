//! # Grid Map
//!
//! A [`GridMap`] rasterises a geographic [`BoundingBox`] into square cells of a fixed size in
//! degrees. Cell `(0, 0)` is the top-left (north-west) corner of the box, `x` counts rows towards
//! the south and `y` counts columns towards the east.
//!
//! Maps are built from a rectangular block of text, one character per cell, where
//! [`BLOCKED_CHAR`] marks an impassable cell and anything else is free.

// ------------------------------------------------------------------------------------------------
// INCLUDES
// ------------------------------------------------------------------------------------------------

use std::{fmt::Display, fs, io, path::Path};

use comms_if::eqpt::GeoPoint;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::geo::{BoundingBox, GeoError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Character marking a blocked cell in the map text.
pub const BLOCKED_CHAR: char = '#';

/// Offsets to the 8 neighbours of a cell, orthogonal first.
const NEIGHBOUR_OFFSETS: [(i32, i32); 8] = [
    (-1, 0),
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 1),
    (1, 1),
    (1, -1),
    (-1, -1),
];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Index of a cell in the map, `x` is the row and `y` the column.
///
/// Cells may lie outside the map (for instance when converted from a point outside the bounding
/// box), use [`GridMap::cell_in_map`] to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

/// A static occupancy grid covering a bounding box.
#[derive(Debug, Clone)]
pub struct GridMap {
    /// The area covered by the map
    bbox: BoundingBox,

    /// Size of a cell along both axes in degrees
    cell_size_deg: f64,

    /// Occupancy of each cell, indexed by `[x, y]`
    cells: Array2<CellState>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState {
    Free,
    Blocked,
}

#[derive(Debug, thiserror::Error)]
pub enum GridMapError {
    #[error("Map text contains no rows")]
    Empty,

    #[error("Map row {row} has {found} cells, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Cell size must be positive and finite, got {0}")]
    InvalidCellSize(f64),

    #[error("Invalid map bounding box: {0}")]
    InvalidBbox(GeoError),

    #[error("Requested cell {0} outside map bounds")]
    OutsideMap(GridCell),

    #[error("An IO operation failed: {0}")]
    IoError(io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GridCell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Display for GridCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for GridCell {
    fn from(xy: (i32, i32)) -> Self {
        Self::new(xy.0, xy.1)
    }
}

impl GridMap {
    /// Build a map from its text representation.
    ///
    /// Empty lines before the first row and after the last row are ignored, as are carriage
    /// returns at the end of each row. All remaining rows must have the same number of cells.
    pub fn parse(text: &str, bbox: BoundingBox, cell_size_deg: f64) -> Result<Self, GridMapError> {
        bbox.validate().map_err(GridMapError::InvalidBbox)?;

        if !(cell_size_deg > 0.0) || !cell_size_deg.is_finite() {
            return Err(GridMapError::InvalidCellSize(cell_size_deg));
        }

        let lines: Vec<&str> = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect();

        // Find the first and last non-empty lines
        let first = match lines.iter().position(|l| !l.is_empty()) {
            Some(i) => i,
            None => return Err(GridMapError::Empty),
        };
        let last = match lines.iter().rposition(|l| !l.is_empty()) {
            Some(i) => i,
            None => return Err(GridMapError::Empty),
        };
        let rows = &lines[first..=last];

        let num_cols = rows[0].chars().count();

        for (i, row) in rows.iter().enumerate() {
            let found = row.chars().count();
            if found != num_cols {
                return Err(GridMapError::RaggedRows {
                    row: i,
                    expected: num_cols,
                    found,
                });
            }
        }

        let cells = Array2::from_shape_fn((rows.len(), num_cols), |(x, y)| {
            match rows[x].chars().nth(y) {
                Some(BLOCKED_CHAR) => CellState::Blocked,
                _ => CellState::Free,
            }
        });

        Ok(Self {
            bbox,
            cell_size_deg,
            cells,
        })
    }

    /// Load a map from a text file, see [`GridMap::parse`].
    pub fn load<P: AsRef<Path>>(
        path: P,
        bbox: BoundingBox,
        cell_size_deg: f64,
    ) -> Result<Self, GridMapError> {
        let text = fs::read_to_string(path).map_err(GridMapError::IoError)?;

        Self::parse(&text, bbox, cell_size_deg)
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn cell_size_deg(&self) -> f64 {
        self.cell_size_deg
    }

    /// Number of rows (cells along `x`).
    pub fn num_rows(&self) -> usize {
        self.cells.nrows()
    }

    /// Number of columns (cells along `y`).
    pub fn num_cols(&self) -> usize {
        self.cells.ncols()
    }

    /// Convert a geographic point into the cell containing it.
    ///
    /// The returned cell may be outside the map.
    pub fn geo_to_xy(&self, point: &GeoPoint) -> GridCell {
        GridCell {
            x: ((self.bbox.top - point.lat) / self.cell_size_deg).round() as i32,
            y: ((point.lon - self.bbox.left) / self.cell_size_deg).round() as i32,
        }
    }

    /// Convert a cell back into a geographic point.
    ///
    /// This is the inverse of [`GridMap::geo_to_xy`] up to one cell size on each axis.
    pub fn xy_to_geo(&self, cell: &GridCell) -> GeoPoint {
        GeoPoint {
            lat: self.bbox.top - cell.x as f64 * self.cell_size_deg,
            lon: self.bbox.left + cell.y as f64 * self.cell_size_deg,
        }
    }

    /// Returns true if the cell is inside the map.
    pub fn cell_in_map(&self, cell: &GridCell) -> bool {
        cell.x >= 0
            && cell.y >= 0
            && (cell.x as usize) < self.num_rows()
            && (cell.y as usize) < self.num_cols()
    }

    /// Get the state of a cell.
    pub fn get(&self, cell: &GridCell) -> Result<CellState, GridMapError> {
        if !self.cell_in_map(cell) {
            return Err(GridMapError::OutsideMap(*cell));
        }

        Ok(self.cells[[cell.x as usize, cell.y as usize]])
    }

    /// Returns true if the cell is in the map and free. Cells outside the map are never free.
    pub fn is_free(&self, cell: &GridCell) -> bool {
        matches!(self.get(cell), Ok(CellState::Free))
    }

    /// Get the free neighbours of a cell with the cost of stepping to each of them.
    ///
    /// Orthogonal steps cost 1 and diagonal steps cost sqrt(2). A diagonal step is only allowed if
    /// both orthogonal cells it passes between are free, so paths never clip the corner of a
    /// blocked cell. Neighbours are always returned in the same order.
    pub fn neighbours(&self, cell: &GridCell) -> Vec<(GridCell, f64)> {
        let mut neighbours = Vec::with_capacity(NEIGHBOUR_OFFSETS.len());

        for &(dx, dy) in NEIGHBOUR_OFFSETS.iter() {
            let next = GridCell::new(cell.x + dx, cell.y + dy);

            if !self.is_free(&next) {
                continue;
            }

            if dx != 0 && dy != 0 {
                let side_a = GridCell::new(cell.x + dx, cell.y);
                let side_b = GridCell::new(cell.x, cell.y + dy);

                if !self.is_free(&side_a) || !self.is_free(&side_b) {
                    continue;
                }

                neighbours.push((next, std::f64::consts::SQRT_2));
            } else {
                neighbours.push((next, 1.0));
            }
        }

        neighbours
    }

    /// Draw the map as text, marking the given path with `*`.
    pub fn render(&self, path: &[GridCell]) -> String {
        let mut rows: Vec<Vec<char>> = self
            .cells
            .outer_iter()
            .map(|row| {
                row.iter()
                    .map(|c| match c {
                        CellState::Blocked => BLOCKED_CHAR,
                        CellState::Free => ' ',
                    })
                    .collect()
            })
            .collect();

        for cell in path.iter().filter(|c| self.cell_in_map(c)) {
            rows[cell.x as usize][cell.y as usize] = '*';
        }

        rows.into_iter()
            .map(|r| r.into_iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const CELL: f64 = 0.0001;

    fn bbox() -> BoundingBox {
        BoundingBox::new(116.0, 116.001, 40.0, 39.999).unwrap()
    }

    #[test]
    fn test_parse() -> Result<(), GridMapError> {
        let map = GridMap::parse("\n\n####\r\n#  #\r\n# ##\r\n\n", bbox(), CELL)?;

        assert_eq!(map.num_rows(), 3);
        assert_eq!(map.num_cols(), 4);
        assert_eq!(map.get(&GridCell::new(0, 0))?, CellState::Blocked);
        assert_eq!(map.get(&GridCell::new(1, 1))?, CellState::Free);
        assert_eq!(map.get(&GridCell::new(2, 1))?, CellState::Free);
        assert_eq!(map.get(&GridCell::new(2, 2))?, CellState::Blocked);
        assert!(matches!(
            map.get(&GridCell::new(3, 0)),
            Err(GridMapError::OutsideMap(_))
        ));
        assert!(!map.is_free(&GridCell::new(-1, 1)));

        assert_eq!(map.render(&[GridCell::new(1, 1)]), "####\n#* #\n# ##");

        Ok(())
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            GridMap::parse("\n\n", bbox(), CELL),
            Err(GridMapError::Empty)
        ));
        assert!(matches!(
            GridMap::parse("###\n##\n###", bbox(), CELL),
            Err(GridMapError::RaggedRows {
                row: 1,
                expected: 3,
                found: 2
            })
        ));
        assert!(matches!(
            GridMap::parse("###", bbox(), 0.0),
            Err(GridMapError::InvalidCellSize(_))
        ));
        assert!(matches!(
            GridMap::parse("###", bbox(), -1.0),
            Err(GridMapError::InvalidCellSize(_))
        ));
    }

    #[test]
    fn test_round_trip() -> Result<(), GridMapError> {
        let text = vec![" ".repeat(10); 10].join("\n");
        let map = GridMap::parse(&text, bbox(), CELL)?;

        for &(lat, lon) in [(40.0, 116.0), (39.99953, 116.00021), (39.99911, 116.00089)].iter() {
            let point = GeoPoint::new(lat, lon);
            let cell = map.geo_to_xy(&point);
            assert!(map.cell_in_map(&cell));

            let back = map.xy_to_geo(&cell);
            assert!((back.lat - point.lat).abs() <= CELL);
            assert!((back.lon - point.lon).abs() <= CELL);
        }

        assert_eq!(map.geo_to_xy(&GeoPoint::new(40.0, 116.0)), GridCell::new(0, 0));
        assert_eq!(map.geo_to_xy(&GeoPoint::new(39.9991, 116.0009)), GridCell::new(9, 9));
        assert!(!map.cell_in_map(&map.geo_to_xy(&GeoPoint::new(39.998, 116.0))));

        Ok(())
    }

    #[test]
    fn test_neighbours() -> Result<(), GridMapError> {
        let map = GridMap::parse("   \n # \n   ", bbox(), CELL)?;

        // The corner cell can only step along the edges, the diagonal would clip the block
        let n = map.neighbours(&GridCell::new(0, 0));
        assert_eq!(n, vec![(GridCell::new(0, 1), 1.0), (GridCell::new(1, 0), 1.0)]);

        let open = GridMap::parse("   \n   \n   ", bbox(), CELL)?;
        let n = open.neighbours(&GridCell::new(1, 1));
        assert_eq!(n.len(), 8);
        assert_eq!(n[4], (GridCell::new(0, 2), std::f64::consts::SQRT_2));

        Ok(())
    }
}
