//! Plans paths through a [`GridMap`], using an A* algorithm.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap, HashSet},
    fmt::Display,
};

use comms_if::eqpt::GeoPoint;
use log::{debug, info};
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

use crate::map::{GridCell, GridMap};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Slope given to segments with no change in column, used when finding turn points.
const VERTICAL_SLOPE: f64 = 99999.99;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PathPlanner {
    params: PathPlannerParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathPlannerParams {
    /// Weight of the straight line distance to the destination in the A* heuristic. Values above
    /// 1 speed the search up at the cost of longer paths.
    pub heuristic_weight: f64,

    /// If true the map is drawn into the log with the planned path marked.
    pub draw_path: bool,
}

/// An ordered sequence of cells, from start to goal inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GridPath(pub Vec<GridCell>);

/// The result of planning a navigation.
#[derive(Debug, Clone)]
pub struct PlannedRoute {
    /// Full cell-by-cell path
    pub path: GridPath,

    /// The turn points of the path, including the origin and destination cells
    pub turn_points: GridPath,

    /// Geographic position of every turn point after the origin, in the order they should be
    /// driven to. The last leg is the destination.
    pub legs: Vec<GeoPoint>,
}

/// Report saved into the session archive for every planned route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathPlannerReport {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub origin_cell: GridCell,
    pub destination_cell: GridCell,
    pub num_expanded_nodes: usize,
    pub path: GridPath,
    pub turn_points: GridPath,
    pub legs: Vec<GeoPoint>,
}

/// Result of the A* search itself.
struct Search {
    path: GridPath,
    num_expanded_nodes: usize,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

/// Which end of a path a cell belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Origin,
    Destination,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("The {which} cell {cell} is outside the map")]
    OutOfBounds { which: Endpoint, cell: GridCell },

    #[error("There is no path between the origin and destination")]
    NoPath,

    #[error("Invalid path cost calculated ({0}), check the heuristic weight")]
    InvalidCost(f64),
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Default for PathPlannerParams {
    fn default() -> Self {
        Self {
            heuristic_weight: 1.0,
            draw_path: false,
        }
    }
}

impl PathPlanner {
    pub fn new(params: PathPlannerParams) -> Self {
        Self { params }
    }

    /// Find a path between the cells containing the origin and the destination.
    ///
    /// The search allows 8-directional movement and never returns a partial path, if the
    /// destination is unreachable [`PlanError::NoPath`] is returned.
    pub fn find_path(
        &self,
        map: &GridMap,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<GridPath, PlanError> {
        let origin_cell = map.geo_to_xy(origin);
        let destination_cell = map.geo_to_xy(destination);

        Ok(self.search(map, origin_cell, destination_cell)?.path)
    }

    /// Plan a full route between the origin and destination.
    ///
    /// This finds the path, reduces it to turn points and converts those back into geographic
    /// legs. The route is logged and a [`PathPlannerReport`] is written to the session archive.
    pub fn plan(
        &self,
        map: &GridMap,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<PlannedRoute, PlanError> {
        let origin_cell = map.geo_to_xy(origin);
        let destination_cell = map.geo_to_xy(destination);

        info!(
            "Planning path from ({}) {} to ({}) {}",
            origin, origin_cell, destination, destination_cell
        );

        let search = self.search(map, origin_cell, destination_cell)?;
        let turn_points = search.path.turn_points();

        let mut legs: Vec<GeoPoint> = turn_points
            .0
            .iter()
            .skip(1)
            .map(|c| map.xy_to_geo(c))
            .collect();

        // Origin and destination share a cell, drive straight at the destination itself
        if legs.is_empty() {
            legs.push(*destination);
        }

        info!(
            "Path found with {} cells and {} turn points after expanding {} nodes",
            search.path.len(),
            turn_points.len(),
            search.num_expanded_nodes
        );
        info!("Turn points (x, y): {}", turn_points);
        for (i, leg) in legs.iter().enumerate() {
            debug!("    Leg {}: ({})", i, leg);
        }

        if self.params.draw_path {
            debug!("Planned path:\n{}", map.render(&search.path.0));
        }

        util::session::save_with_timestamp(
            "path_planner/report.json",
            PathPlannerReport {
                origin: *origin,
                destination: *destination,
                origin_cell,
                destination_cell,
                num_expanded_nodes: search.num_expanded_nodes,
                path: search.path.clone(),
                turn_points: turn_points.clone(),
                legs: legs.clone(),
            },
        );

        Ok(PlannedRoute {
            path: search.path,
            turn_points,
            legs,
        })
    }

    /// A* search between two cells.
    ///
    /// Nodes with equal estimated cost are expanded in the order they were discovered, which
    /// makes the search deterministic.
    fn search(
        &self,
        map: &GridMap,
        origin: GridCell,
        destination: GridCell,
    ) -> Result<Search, PlanError> {
        // Check both ends are in the map
        if !map.cell_in_map(&origin) {
            return Err(PlanError::OutOfBounds {
                which: Endpoint::Origin,
                cell: origin,
            });
        }
        if !map.cell_in_map(&destination) {
            return Err(PlanError::OutOfBounds {
                which: Endpoint::Destination,
                cell: destination,
            });
        }

        // Min-heap ordered by estimated total cost then by discovery order
        let mut open: BinaryHeap<Reverse<(NotNan<f64>, u64, GridCell)>> = BinaryHeap::new();
        let mut cost_so_far: HashMap<GridCell, f64> = HashMap::new();
        let mut came_from: HashMap<GridCell, GridCell> = HashMap::new();
        let mut closed: HashSet<GridCell> = HashSet::new();
        let mut num_discovered: u64 = 0;

        cost_so_far.insert(origin, 0.0);
        open.push(Reverse((
            self.estimate(0.0, &origin, &destination)?,
            num_discovered,
            origin,
        )));

        while let Some(Reverse((_, _, cell))) = open.pop() {
            // A cell may be in the heap several times if a cheaper route to it was found after it
            // was first pushed, only the first pop counts
            if !closed.insert(cell) {
                continue;
            }

            if cell == destination {
                return Ok(Search {
                    path: reconstruct(&came_from, destination),
                    num_expanded_nodes: closed.len(),
                });
            }

            let cell_cost = cost_so_far.get(&cell).copied().unwrap_or(f64::INFINITY);

            for (next, step_cost) in map.neighbours(&cell) {
                if closed.contains(&next) {
                    continue;
                }

                let next_cost = cell_cost + step_cost;

                if next_cost < cost_so_far.get(&next).copied().unwrap_or(f64::INFINITY) {
                    cost_so_far.insert(next, next_cost);
                    came_from.insert(next, cell);

                    num_discovered += 1;
                    open.push(Reverse((
                        self.estimate(next_cost, &next, &destination)?,
                        num_discovered,
                        next,
                    )));
                }
            }
        }

        Err(PlanError::NoPath)
    }

    /// Cost so far plus the weighted straight line distance to the destination, in cells.
    fn estimate(
        &self,
        cost: f64,
        cell: &GridCell,
        destination: &GridCell,
    ) -> Result<NotNan<f64>, PlanError> {
        let dx = (destination.x - cell.x) as f64;
        let dy = (destination.y - cell.y) as f64;

        let total = cost + self.params.heuristic_weight * (dx * dx + dy * dy).sqrt();

        if total.is_infinite() || total < 0.0 {
            return Err(PlanError::InvalidCost(total));
        }

        NotNan::new(total).map_err(|_| PlanError::InvalidCost(total))
    }
}

impl GridPath {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.0
    }

    /// Reduce the path to the cells at which its direction changes.
    ///
    /// The slope `dx/dy` of each segment is compared with the next one, and the cell between them
    /// is kept whenever they differ. The first and last cells are always kept, and paths of two
    /// cells or fewer are returned unchanged.
    pub fn turn_points(&self) -> GridPath {
        let cells = &self.0;

        if cells.len() <= 2 {
            return self.clone();
        }

        let slopes: Vec<f64> = cells
            .windows(2)
            .map(|w| {
                let dx = w[0].x - w[1].x;
                let dy = w[0].y - w[1].y;
                if dy == 0 {
                    VERTICAL_SLOPE
                } else {
                    dx as f64 / dy as f64
                }
            })
            .collect();

        let mut turns = vec![cells[0]];

        for (i, pair) in slopes.windows(2).enumerate() {
            if pair[0] != pair[1] {
                turns.push(cells[i + 1]);
            }
        }

        turns.push(cells[cells.len() - 1]);

        GridPath(turns)
    }
}

impl Display for GridPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cells: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", cells.join(", "))
    }
}

impl From<Vec<(i32, i32)>> for GridPath {
    fn from(cells: Vec<(i32, i32)>) -> Self {
        GridPath(cells.into_iter().map(GridCell::from).collect())
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Origin => write!(f, "origin"),
            Endpoint::Destination => write!(f, "destination"),
        }
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Walk back through the parents of the goal to build the path from start to goal.
fn reconstruct(came_from: &HashMap<GridCell, GridCell>, goal: GridCell) -> GridPath {
    let mut cells = vec![goal];
    let mut current = goal;

    while let Some(parent) = came_from.get(&current) {
        cells.push(*parent);
        current = *parent;
    }

    cells.reverse();

    GridPath(cells)
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geo::BoundingBox;

    const CELL: f64 = 0.0001;

    fn open_map(rows: usize, cols: usize) -> GridMap {
        let text = vec![" ".repeat(cols); rows].join("\n");
        GridMap::parse(&text, bbox(), CELL).unwrap()
    }

    fn bbox() -> BoundingBox {
        BoundingBox::new(116.0, 116.0009, 40.0, 39.9991).unwrap()
    }

    fn geo(map: &GridMap, x: i32, y: i32) -> GeoPoint {
        map.xy_to_geo(&GridCell::new(x, y))
    }

    #[test]
    fn test_turn_points() {
        let path = GridPath::from(vec![(1, 1), (2, 2), (3, 3), (4, 5), (5, 7), (7, 9)]);
        let turns = path.turn_points();

        assert_eq!(turns.0[0], GridCell::new(1, 1));
        assert_eq!(
            GridPath(turns.0[1..].to_vec()),
            GridPath::from(vec![(3, 3), (5, 7), (7, 9)])
        );

        // Colinear paths reduce to their ends
        let straight = GridPath::from(vec![(0, 0), (0, 1), (0, 2), (0, 3)]);
        assert_eq!(straight.turn_points(), GridPath::from(vec![(0, 0), (0, 3)]));

        // Short paths are untouched
        let short = GridPath::from(vec![(0, 0), (5, 5)]);
        assert_eq!(short.turn_points(), short);
        let single = GridPath::from(vec![(2, 2)]);
        assert_eq!(single.turn_points(), single);
    }

    #[test]
    fn test_find_path_diagonal() -> Result<(), PlanError> {
        let map = open_map(10, 10);
        let planner = PathPlanner::new(PathPlannerParams::default());

        let path = planner.find_path(&map, &geo(&map, 0, 0), &geo(&map, 9, 9))?;

        assert_eq!(path.len(), 10);
        assert_eq!(path.0[0], GridCell::new(0, 0));
        assert_eq!(path.0[9], GridCell::new(9, 9));
        assert_eq!(path.turn_points(), GridPath::from(vec![(0, 0), (9, 9)]));

        let route = planner.plan(&map, &geo(&map, 0, 0), &geo(&map, 9, 9))?;
        assert_eq!(route.legs.len(), 1);
        assert_eq!(route.legs[0], map.xy_to_geo(&GridCell::new(9, 9)));

        Ok(())
    }

    #[test]
    fn test_plan_within_one_cell() -> Result<(), PlanError> {
        let map = open_map(10, 10);
        let planner = PathPlanner::new(PathPlannerParams::default());

        let origin = geo(&map, 5, 5);
        let destination = GeoPoint::new(origin.lat - 0.00004, origin.lon + 0.00004);
        assert_eq!(map.geo_to_xy(&destination), GridCell::new(5, 5));

        let route = planner.plan(&map, &origin, &destination)?;

        assert_eq!(route.path, GridPath::from(vec![(5, 5)]));
        assert_eq!(route.legs, vec![destination]);

        Ok(())
    }

    #[test]
    fn test_find_path_around_wall() -> Result<(), PlanError> {
        let text = ["          ", " ######## ", "          ", "          "].join("\n");
        let map = GridMap::parse(&text, bbox(), CELL).unwrap();
        let planner = PathPlanner::new(PathPlannerParams::default());

        let path = planner.find_path(&map, &geo(&map, 0, 4), &geo(&map, 3, 4))?;

        // Every step is to a free neighbour
        for w in path.0.windows(2) {
            assert!(map.is_free(&w[1]));
            assert!((w[0].x - w[1].x).abs() <= 1 && (w[0].y - w[1].y).abs() <= 1);
        }
        assert_eq!(path.0[0], GridCell::new(0, 4));
        assert_eq!(path.0[path.len() - 1], GridCell::new(3, 4));

        // Deterministic
        for _ in 0..5 {
            assert_eq!(planner.find_path(&map, &geo(&map, 0, 4), &geo(&map, 3, 4))?, path);
        }

        Ok(())
    }

    #[test]
    fn test_no_path() {
        let text = ["     ", " ### ", " # # ", " ### ", "     "].join("\n");
        let map = GridMap::parse(&text, bbox(), CELL).unwrap();
        let planner = PathPlanner::new(PathPlannerParams::default());

        assert!(matches!(
            planner.find_path(&map, &geo(&map, 0, 0), &geo(&map, 2, 2)),
            Err(PlanError::NoPath)
        ));
    }

    #[test]
    fn test_out_of_bounds() {
        let map = open_map(10, 10);
        let planner = PathPlanner::new(PathPlannerParams::default());

        let outside = GeoPoint::new(40.1, 116.0);

        assert!(matches!(
            planner.find_path(&map, &outside, &geo(&map, 1, 1)),
            Err(PlanError::OutOfBounds {
                which: Endpoint::Origin,
                ..
            })
        ));
        assert!(matches!(
            planner.find_path(&map, &geo(&map, 1, 1), &outside),
            Err(PlanError::OutOfBounds {
                which: Endpoint::Destination,
                ..
            })
        ));
    }
}
