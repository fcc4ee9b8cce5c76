//! Shortest-path resolution over the graph of migration steps.
//!
//! Every step is an edge from its down version to its up version. The
//! resolver runs a uniform-cost search (each step costs 1, so the result
//! has the fewest steps, not the smallest version distance) and then walks
//! back from the destination, at each version picking the incoming edge
//! whose source is closest to the origin. Ties go to the step supplied
//! first, so callers control the outcome through registration order.
//!
//! Downgrades are resolved as an upgrade from the target to the current
//! version with reverse edges enabled during the search; the reconstructed
//! edges are then returned in execution (descending) order.

use super::types::{MigrationDirection, PathError, PathProblem, StepEdge};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::debug;

/// An ordered path of steps between two versions.
#[derive(Debug, Clone)]
pub struct ResolvedPath<T> {
    pub direction: MigrationDirection,
    /// Version the path starts from.
    pub from: i64,
    /// Version the path ends at.
    pub to: i64,
    /// Steps in execution order.
    pub steps: Vec<T>,
}

impl<T> ResolvedPath<T> {
    fn empty(at: i64) -> Self {
        Self {
            direction: MigrationDirection::Up,
            from: at,
            to: at,
            steps: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Resolve the minimal path of steps from `current` to `target`.
///
/// - `current = None` means nothing has been applied; the search starts at
///   the lowest down version among `steps` (0 when there are none) and the
///   result is never a downgrade.
/// - `target = None` means "as high as possible": the destination is the
///   highest version reachable from the start. This never downgrades.
/// - A `target` below the start resolves a downgrade path.
///
/// An empty path is a successful "already there".
pub fn resolve_path<T>(
    steps: &[T],
    current: Option<i64>,
    target: Option<i64>,
) -> Result<ResolvedPath<T>, PathError>
where
    T: StepEdge + Clone,
{
    let start = current.unwrap_or_else(|| steps.iter().map(|s| s.down_version()).min().unwrap_or(0));

    // Nothing applied yet means nothing to revert.
    if let (None, Some(t)) = (current, target) {
        if t <= start {
            return Ok(ResolvedPath::empty(t));
        }
    }

    let (direction, lower, upper) = match target {
        Some(t) if t < start => (MigrationDirection::Down, Some(t), Some(start)),
        _ => (MigrationDirection::Up, Some(start), target),
    };

    let graph = VersionGraph::new(steps, lower, upper);

    let destination = match (direction, target) {
        (MigrationDirection::Up, Some(t)) => t,
        (MigrationDirection::Up, None) => match graph.highest_reachable(start) {
            Some(v) => v,
            None if graph.is_empty() || graph.touches(start, MigrationDirection::Up) => {
                return Ok(ResolvedPath::empty(start));
            }
            // Steps exist but none leaves the start; report against the top
            // of the graph.
            None => graph.highest_version().unwrap_or(start),
        },
        // Downgrades always carry a target.
        (MigrationDirection::Down, _) => target.unwrap_or(start),
    };

    if destination == start {
        return Ok(ResolvedPath::empty(start));
    }

    // Downgrades search upward from the target back to the start.
    let (origin, goal, reverse) = match direction {
        MigrationDirection::Up => (start, destination, false),
        MigrationDirection::Down => (destination, start, true),
    };

    let distances = graph.search(origin, reverse);
    let walked = if distances.contains_key(&goal) {
        graph.walk_back(origin, goal, &distances)
    } else {
        None
    };

    let mut problems = Vec::new();
    if walked.is_none() {
        problems.push(PathProblem::NoPath {
            from: start,
            to: destination,
        });
    }
    if !graph.is_empty() && !graph.touches(start, direction) {
        problems.push(PathProblem::StartDisconnected { version: start });
    }
    if !problems.is_empty() {
        debug!(from = start, to = destination, ?problems, "Path resolution failed");
        return Err(PathError { problems });
    }

    // Walking back yields edges from the goal downward, which is already
    // the execution order of a downgrade.
    let mut indices = walked.unwrap_or_default();
    if direction == MigrationDirection::Up {
        indices.reverse();
    }

    debug!(
        from = start,
        to = destination,
        %direction,
        length = indices.len(),
        "Resolved migration path"
    );

    Ok(ResolvedPath {
        direction,
        from: start,
        to: destination,
        steps: indices.into_iter().map(|i| steps[i].clone()).collect(),
    })
}

/// In-range edges indexed by version, keeping caller order within each bucket.
struct VersionGraph<'a, T> {
    steps: &'a [T],
    edge_count: usize,
    outgoing: HashMap<i64, Vec<usize>>,
    incoming: HashMap<i64, Vec<usize>>,
}

impl<'a, T: StepEdge> VersionGraph<'a, T> {
    /// Edges leaving the range are dropped: a down version below `lower` or
    /// an up version above `upper`. A missing bound is unconstrained.
    fn new(steps: &'a [T], lower: Option<i64>, upper: Option<i64>) -> Self {
        let mut outgoing: HashMap<i64, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<i64, Vec<usize>> = HashMap::new();
        let mut edge_count = 0;

        for (i, step) in steps.iter().enumerate() {
            let below = lower.is_some_and(|l| step.down_version() < l);
            let above = upper.is_some_and(|u| step.up_version() > u);
            if below || above {
                continue;
            }

            outgoing.entry(step.down_version()).or_default().push(i);
            incoming.entry(step.up_version()).or_default().push(i);
            edge_count += 1;
        }

        Self {
            steps,
            edge_count,
            outgoing,
            incoming,
        }
    }

    fn is_empty(&self) -> bool {
        self.edge_count == 0
    }

    fn highest_version(&self) -> Option<i64> {
        self.incoming.keys().copied().max()
    }

    /// Highest version above `start` that forward steps reach from it.
    fn highest_reachable(&self, start: i64) -> Option<i64> {
        self.search(start, false)
            .into_keys()
            .filter(|v| *v > start)
            .max()
    }

    /// Whether any in-range edge leaves (upgrade) or arrives at (downgrade) `version`.
    fn touches(&self, version: i64, direction: MigrationDirection) -> bool {
        match direction {
            MigrationDirection::Up => self.outgoing.contains_key(&version),
            MigrationDirection::Down => self.incoming.contains_key(&version),
        }
    }

    fn down(&self, edge: usize) -> i64 {
        self.steps[edge].down_version()
    }

    fn up(&self, edge: usize) -> i64 {
        self.steps[edge].up_version()
    }

    /// Uniform-cost search from `origin`. Returns the final distance of
    /// every version reached.
    fn search(&self, origin: i64, reverse: bool) -> HashMap<i64, usize> {
        let mut distances: HashMap<i64, usize> = HashMap::new();
        let mut visited: HashSet<i64> = HashSet::new();
        let mut queue = BinaryHeap::new();

        distances.insert(origin, 0);
        queue.push(Reverse((0usize, origin)));

        while let Some(Reverse((distance, version))) = queue.pop() {
            if !visited.insert(version) {
                continue;
            }

            let forward = self
                .outgoing
                .get(&version)
                .into_iter()
                .flatten()
                .map(|&e| self.up(e));
            let backward = self
                .incoming
                .get(&version)
                .into_iter()
                .flatten()
                .filter(|_| reverse)
                .map(|&e| self.down(e));

            for next in forward.chain(backward) {
                let candidate = distance + 1;
                let improves = distances.get(&next).map_or(true, |&known| candidate < known);
                if improves {
                    distances.insert(next, candidate);
                    queue.push(Reverse((candidate, next)));
                }
            }
        }

        distances
    }

    /// Reconstruct a path from `goal` back to `origin`, returning edge
    /// indices in walk order (goal first).
    ///
    /// Depth-first over incoming edges, closest source first. Versions that
    /// cannot reach `origin` are remembered so each is explored once.
    fn walk_back(&self, origin: i64, goal: i64, distances: &HashMap<i64, usize>) -> Option<Vec<usize>> {
        if goal == origin {
            return Some(Vec::new());
        }

        let mut path = Vec::new();
        let mut on_path = HashSet::from([goal]);
        let mut dead = HashSet::new();
        let mut frames = vec![(goal, self.candidates(goal, distances).into_iter())];

        loop {
            let (frontier, next) = match frames.last_mut() {
                Some((version, candidates)) => (*version, candidates.next()),
                None => return None,
            };

            match next {
                Some(edge) => {
                    let source = self.down(edge);
                    if source == origin {
                        path.push(edge);
                        return Some(path);
                    }
                    if dead.contains(&source) || !on_path.insert(source) {
                        continue;
                    }
                    path.push(edge);
                    frames.push((source, self.candidates(source, distances).into_iter()));
                }
                None => {
                    frames.pop();
                    on_path.remove(&frontier);
                    dead.insert(frontier);
                    // The goal frame has no edge of its own.
                    path.pop();
                }
            }
        }
    }

    /// Incoming edges of `frontier` whose source was reached, closest
    /// source first, then caller order.
    fn candidates(&self, frontier: i64, distances: &HashMap<i64, usize>) -> Vec<usize> {
        let mut candidates: Vec<(usize, usize)> = self
            .incoming
            .get(&frontier)
            .into_iter()
            .flatten()
            .filter(|&&e| self.down(e) != frontier)
            .filter_map(|&e| distances.get(&self.down(e)).map(|&d| (d, e)))
            .collect();
        candidates.sort_unstable();
        candidates.into_iter().map(|(_, e)| e).collect()
    }
}
