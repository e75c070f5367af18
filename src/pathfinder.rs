use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::dictionary::TravelModes;
use crate::errors::{MapError, Result};
use crate::map_data::PointId;
use crate::types::LatLong;

/// Via-point marker in a path response.
pub const VIA_TOKEN: &str = "VIA";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Dijkstra,
    AStar,
    BellmanFord,
    FloydWarshall,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Dijkstra,
        Algorithm::AStar,
        Algorithm::BellmanFord,
        Algorithm::FloydWarshall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Dijkstra => "Dijkstra",
            Algorithm::AStar => "A*",
            Algorithm::BellmanFord => "Bellman-Ford",
            Algorithm::FloydWarshall => "Floyd-Warshall",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        Algorithm::ALL
            .iter()
            .find(|algorithm| algorithm.as_str() == s)
            .copied()
            .ok_or_else(|| MapError::Config(format!("unknown algorithm '{}'", s)))
    }
}

/// One route query: start, optional via points, end.
#[derive(Debug, Clone, PartialEq)]
pub struct PathRequest {
    pub algorithm: Algorithm,
    pub modes: TravelModes,
    pub points: Vec<LatLong>,
}

impl PathRequest {
    /// `<algorithm> <ped> <ride> <drive> <pub> <count> <lat lon>*`
    pub fn to_line(&self) -> String {
        let flag = |enabled: bool| if enabled { "1" } else { "0" };
        let mut line = format!(
            "{} {} {} {} {} {}",
            self.algorithm,
            flag(self.modes.pedestrian),
            flag(self.modes.riding),
            flag(self.modes.driving),
            flag(self.modes.public_transport),
            self.points.len()
        );
        for point in &self.points {
            line.push_str(&format!(" {} {}", point.latitude, point.longitude));
        }
        line.push('\n');
        line
    }
}

/// One parsed line of path-finder output.
#[derive(Debug, Clone, PartialEq)]
pub enum PathEvent {
    /// The graph is loaded and requests are accepted.
    Ready,
    Progress(u8),
    TimeMillis(u64),
    /// Path vertex given by node id.
    Node(i64),
    /// Path vertex given by position.
    Coordinate(LatLong),
    /// Continue the path at the next unused via point.
    Via,
    End,
    NoPath,
    /// The process died or its output closed.
    Failed(String),
    Other(String),
}

impl PathEvent {
    pub fn parse(line: &str) -> PathEvent {
        let line = line.trim();
        match line {
            "END" => return PathEvent::End,
            "NO PATH" => return PathEvent::NoPath,
            VIA_TOKEN => return PathEvent::Via,
            _ => {}
        }
        if line.starts_with("Graph loaded") {
            return PathEvent::Ready;
        }
        if let Some(millis) = line
            .strip_prefix("TIME ")
            .and_then(|rest| rest.trim().strip_suffix("ms"))
            .and_then(|value| value.trim().parse().ok())
        {
            return PathEvent::TimeMillis(millis);
        }
        if let Some(percent) = line
            .strip_suffix('%')
            .and_then(|rest| rest.rsplit(|c: char| c.is_whitespace() || c == ':').next())
            .and_then(|value| value.parse::<u8>().ok())
        {
            return PathEvent::Progress(percent.min(100));
        }
        if let Ok(node_id) = line.parse::<i64>() {
            return PathEvent::Node(node_id);
        }
        let mut parts = line.split_whitespace();
        if let (Some(lat), Some(lon), None) = (parts.next(), parts.next(), parts.next()) {
            if let (Ok(latitude), Ok(longitude)) = (lat.parse::<f64>(), lon.parse::<f64>()) {
                return PathEvent::Coordinate(LatLong::new(latitude, longitude));
            }
        }
        PathEvent::Other(line.to_string())
    }

    /// Whether this line can close the answer to a request.
    ///
    /// `NoPath` is not always the last line of a response. When a later
    /// segment of a multi-point request fails, the path finder still prints
    /// the timing line, the vertices of the segments it did solve and `END`.
    /// When the first segment fails it prints `NO PATH` twice. Everything
    /// after the first `NoPath` belongs to the abandoned request and must not
    /// be drawn; [`RouteAssembler`] drops it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PathEvent::End | PathEvent::NoPath | PathEvent::Failed(_))
    }
}

/// Result of one route request.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Found(Vec<LatLong>),
    NotFound,
}

/// Builds the route answering the latest request out of its path events.
///
/// Node ids are resolved to positions by the caller and `VIA` markers are
/// replaced by the request's via points in order. A response that reports
/// `NO PATH` yields a single [`RouteOutcome::NotFound`]; its remaining lines
/// are ignored until [`RouteAssembler::begin`] starts the next request.
#[derive(Debug, Default)]
pub struct RouteAssembler {
    via_points: Vec<LatLong>,
    next_via: usize,
    pending: Vec<LatLong>,
    abandoned: bool,
}

impl RouteAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, via_points: &[LatLong]) {
        self.via_points = via_points.to_vec();
        self.next_via = 0;
        self.pending.clear();
        self.abandoned = false;
    }

    /// Feed one event. Returns the outcome once the response settles it.
    pub fn accept<F>(&mut self, event: &PathEvent, resolve: F) -> Option<RouteOutcome>
    where
        F: Fn(PointId) -> Option<LatLong>,
    {
        if self.abandoned {
            return None;
        }
        match event {
            PathEvent::Node(id) => match resolve(*id) {
                Some(position) => self.pending.push(position),
                None => warn!("Route references unknown node {}", id),
            },
            PathEvent::Coordinate(position) => self.pending.push(*position),
            PathEvent::Via => {
                if let Some(via) = self.via_points.get(self.next_via) {
                    self.pending.push(*via);
                    self.next_via += 1;
                }
            }
            PathEvent::End => {
                self.next_via = 0;
                return Some(RouteOutcome::Found(std::mem::take(&mut self.pending)));
            }
            PathEvent::NoPath => {
                self.abandoned = true;
                self.pending.clear();
                return Some(RouteOutcome::NotFound);
            }
            _ => {}
        }
        None
    }
}

/// Long-lived path-finding process.
///
/// Requests go out on the process's stdin; every output line is parsed and
/// forwarded on the channel returned by [`PathFinder::spawn`]. Nothing here
/// times out or retries.
pub struct PathFinder {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
}

impl PathFinder {
    pub fn spawn(program: PathBuf) -> Result<(Self, Receiver<PathEvent>)> {
        let name = program.display().to_string();
        let mut child = Command::new(&program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| MapError::external(&name, e.to_string()))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MapError::external(&name, "no stdout handle"))?;

        let (event_tx, event_rx) = mpsc::channel();
        let reader_name = name.clone();
        let reader = thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) => {
                        debug!("path finder: {}", line);
                        if event_tx.send(PathEvent::parse(&line)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        error!("Reading from {} failed: {}", reader_name, e);
                        let _ = event_tx.send(PathEvent::Failed(e.to_string()));
                        return;
                    }
                }
            }
            let _ = event_tx.send(PathEvent::Failed(format!(
                "{} closed its output",
                reader_name
            )));
        });

        info!("Started path finder {}", name);
        Ok((
            Self {
                program: name,
                child,
                stdin,
                reader: Some(reader),
            },
            event_rx,
        ))
    }

    pub fn send(&mut self, request: &PathRequest) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MapError::external(&self.program, "stdin is closed"))?;
        stdin
            .write_all(request.to_line().as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|e| {
                error!("Sending request to {} failed: {}", self.program, e);
                MapError::external(&self.program, e.to_string())
            })
    }
}

impl Drop for PathFinder {
    fn drop(&mut self) {
        self.stdin.take();
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_layout() {
        let request = PathRequest {
            algorithm: Algorithm::AStar,
            modes: TravelModes::walking(),
            points: vec![LatLong::new(31.23, 121.47), LatLong::new(31.24, 121.5)],
        };
        assert_eq!(request.to_line(), "A* 1 0 0 0 2 31.23 121.47 31.24 121.5\n");
    }

    #[test]
    fn algorithm_names_round_trip() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.as_str().parse::<Algorithm>().unwrap(), algorithm);
        }
        assert!("BFS".parse::<Algorithm>().is_err());
    }

    #[test]
    fn parses_response_markers() {
        assert_eq!(PathEvent::parse("END"), PathEvent::End);
        assert_eq!(PathEvent::parse("NO PATH\r"), PathEvent::NoPath);
        assert_eq!(PathEvent::parse("VIA"), PathEvent::Via);
        assert_eq!(PathEvent::parse("TIME 153ms"), PathEvent::TimeMillis(153));
        assert_eq!(PathEvent::parse("Loading graph: 42%"), PathEvent::Progress(42));
        assert_eq!(PathEvent::parse("Graph loaded in 812ms"), PathEvent::Ready);
        assert_eq!(PathEvent::parse("2400147761"), PathEvent::Node(2400147761));
        assert_eq!(
            PathEvent::parse("31.2304 121.4737"),
            PathEvent::Coordinate(LatLong::new(31.2304, 121.4737))
        );
        assert_eq!(
            PathEvent::parse("Unknown algorithm"),
            PathEvent::Other("Unknown algorithm".to_string())
        );
        assert!(PathEvent::parse("END").is_terminal());
        assert!(!PathEvent::parse("VIA").is_terminal());
    }

    fn assemble(assembler: &mut RouteAssembler, lines: &[&str]) -> Vec<RouteOutcome> {
        lines
            .iter()
            .filter_map(|line| {
                assembler.accept(&PathEvent::parse(line), |id| {
                    Some(LatLong::new(id as f64, id as f64))
                })
            })
            .collect()
    }

    #[test]
    fn assembles_route_with_via_points() {
        let mut assembler = RouteAssembler::new();
        let via = LatLong::new(31.235, 121.475);
        assembler.begin(&[via]);
        let outcomes = assemble(&mut assembler, &["TIME 12ms", "1", "VIA", "31.5 121.5", "END"]);
        assert_eq!(
            outcomes,
            vec![RouteOutcome::Found(vec![
                LatLong::new(1.0, 1.0),
                via,
                LatLong::new(31.5, 121.5),
            ])]
        );
    }

    #[test]
    fn failed_segment_discards_the_rest_of_the_response() {
        let mut assembler = RouteAssembler::new();
        assembler.begin(&[]);
        let outcomes = assemble(&mut assembler, &["NO PATH", "TIME 3ms", "42", "43", "END"]);
        assert_eq!(outcomes, vec![RouteOutcome::NotFound]);

        // First segment failing prints NO PATH twice.
        assembler.begin(&[]);
        let outcomes = assemble(&mut assembler, &["NO PATH", "TIME 1ms", "NO PATH"]);
        assert_eq!(outcomes, vec![RouteOutcome::NotFound]);

        // The next request starts clean.
        assembler.begin(&[]);
        let outcomes = assemble(&mut assembler, &["TIME 2ms", "7", "8", "END"]);
        assert_eq!(
            outcomes,
            vec![RouteOutcome::Found(vec![
                LatLong::new(7.0, 7.0),
                LatLong::new(8.0, 8.0),
            ])]
        );
    }

    #[test]
    fn unresolved_nodes_are_left_out() {
        let mut assembler = RouteAssembler::new();
        assembler.begin(&[]);
        let outcome = ["5", "6", "END"]
            .iter()
            .filter_map(|line| {
                assembler.accept(&PathEvent::parse(line), |id| {
                    (id == 5).then(|| LatLong::new(1.0, 2.0))
                })
            })
            .next();
        assert_eq!(outcome, Some(RouteOutcome::Found(vec![LatLong::new(1.0, 2.0)])));
    }
}
