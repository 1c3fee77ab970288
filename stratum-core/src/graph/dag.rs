//! Directed Acyclic Graph
//!
//! A generic container for the dependency graph. Each slot stores a value
//! plus both directions of adjacency:
//!
//! - `dependencies`: the vertices this vertex must wait for during creation
//! - `dependents`: the vertices waiting on this vertex
//!
//! Edges are stored as `vertex -> dependency`. Adjacency uses ordered sets so
//! that iteration order (and therefore topological order and rendering) is
//! deterministic for a given insertion order.
//!
//! # Algorithms
//!
//! - Topological ordering uses Kahn's algorithm over the dependency edges.
//! - Cycle detection uses Tarjan's strongly connected components; each
//!   non-trivial component is reported as a vertex sequence following the
//!   edges inside the component.
//! - [`Dag::schedule`] turns the edges into walk-ordering constraints for a
//!   particular operation, which may keep, reverse, or drop each edge.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexSet;

/// Identifier of a vertex within one [`Dag`].
///
/// Identifiers are indices scoped to the graph that issued them; they are
/// never reused after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(usize);

impl VertexId {
    /// Get the raw index.
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    dependencies: IndexSet<VertexId>,
    dependents: IndexSet<VertexId>,
}

/// How a single edge `vertex -> dependency` constrains a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOrder {
    /// The dependency runs before the vertex.
    Forward,
    /// The vertex runs before the dependency.
    Reverse,
    /// No ordering constraint.
    Ignore,
}

/// A generic directed graph of values.
#[derive(Debug)]
pub struct Dag<V> {
    slots: Vec<Option<Slot<V>>>,
    len: usize,
}

impl<V> Dag<V> {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
        }
    }

    /// Add a vertex to the graph.
    pub fn add_vertex(&mut self, value: V) -> VertexId {
        let id = VertexId(self.slots.len());
        self.slots.push(Some(Slot {
            value,
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
        }));
        self.len += 1;
        id
    }

    /// Remove a vertex from the graph.
    ///
    /// Also removes all edges involving this vertex.
    pub fn remove_vertex(&mut self, id: VertexId) -> Option<V> {
        let slot = self.slots.get_mut(id.0)?.take()?;
        self.len -= 1;

        // Remove this vertex from its dependencies' dependent lists
        for dep in &slot.dependencies {
            if let Some(Some(other)) = self.slots.get_mut(dep.0) {
                other.dependents.shift_remove(&id);
            }
        }

        // Remove this vertex from its dependents' dependency lists
        for dependent in &slot.dependents {
            if let Some(Some(other)) = self.slots.get_mut(dependent.0) {
                other.dependencies.shift_remove(&id);
            }
        }

        Some(slot.value)
    }

    /// Get a reference to a vertex's value.
    pub fn get(&self, id: VertexId) -> Option<&V> {
        self.slot(id).map(|slot| &slot.value)
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.slot(id).is_some()
    }

    /// Get the total number of vertices in the graph.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live vertex ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| VertexId(index))
    }

    /// Live vertices in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (VertexId, &V)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|slot| (VertexId(index), &slot.value)))
    }

    /// Add an edge: `vertex` depends on `dependency`.
    ///
    /// Returns `true` if the edge was not present before. Edges naming a
    /// missing vertex are ignored.
    pub fn connect(&mut self, vertex: VertexId, dependency: VertexId) -> bool {
        if !self.contains(vertex) || !self.contains(dependency) {
            return false;
        }
        let added = match self.slots[vertex.0].as_mut() {
            Some(slot) => slot.dependencies.insert(dependency),
            None => false,
        };
        if let Some(slot) = self.slots[dependency.0].as_mut() {
            slot.dependents.insert(vertex);
        }
        added
    }

    /// Remove an edge.
    pub fn disconnect(&mut self, vertex: VertexId, dependency: VertexId) {
        if let Some(Some(slot)) = self.slots.get_mut(vertex.0) {
            slot.dependencies.shift_remove(&dependency);
        }
        if let Some(Some(slot)) = self.slots.get_mut(dependency.0) {
            slot.dependents.shift_remove(&vertex);
        }
    }

    pub fn has_edge(&self, vertex: VertexId, dependency: VertexId) -> bool {
        self.slot(vertex)
            .map(|slot| slot.dependencies.contains(&dependency))
            .unwrap_or(false)
    }

    /// Vertices that `id` depends on.
    pub fn dependencies(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.slot(id)
            .into_iter()
            .flat_map(|slot| slot.dependencies.iter().copied())
    }

    /// Vertices that depend on `id`.
    pub fn dependents(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.slot(id)
            .into_iter()
            .flat_map(|slot| slot.dependents.iter().copied())
    }

    /// All edges as `(vertex, dependency)` pairs.
    pub fn edges(&self) -> Vec<(VertexId, VertexId)> {
        self.ids()
            .flat_map(|id| self.dependencies(id).map(move |dep| (id, dep)))
            .collect()
    }

    /// Perform a topological sort of the whole graph.
    ///
    /// Returns vertices in order such that dependencies come before
    /// dependents, or the cycles that prevent such an order.
    pub fn topological_order(&self) -> Result<Vec<VertexId>, Vec<Vec<VertexId>>> {
        let order = self.schedule(|_, _| EdgeOrder::Forward).topological_order();
        if order.len() == self.len {
            Ok(order)
        } else {
            Err(self.cycles())
        }
    }

    /// Find every cycle in the graph.
    ///
    /// Each cycle is reported once, as the sequence of vertices visited by
    /// following dependency edges from the lowest id in the cycle.
    pub fn cycles(&self) -> Vec<Vec<VertexId>> {
        let mut tarjan = Tarjan::new(self.slots.len());
        for id in self.ids() {
            if tarjan.index[id.0].is_none() {
                tarjan.visit(self, id);
            }
        }

        let mut cycles = Vec::new();
        for component in tarjan.components {
            let self_loop = component.len() == 1 && self.has_edge(component[0], component[0]);
            if component.len() > 1 || self_loop {
                cycles.push(self.trace_cycle(&component));
            }
        }
        cycles.sort();
        cycles
    }

    /// Order the members of a strongly connected component along its edges.
    fn trace_cycle(&self, component: &[VertexId]) -> Vec<VertexId> {
        let members: HashSet<VertexId> = component.iter().copied().collect();
        let Some(start) = component.iter().min().copied() else {
            return Vec::new();
        };
        let mut sequence = vec![start];
        let mut seen: HashSet<VertexId> = HashSet::from([start]);
        let mut current = start;

        while let Some(next) = self
            .dependencies(current)
            .find(|dep| members.contains(dep) && !seen.contains(dep))
        {
            sequence.push(next);
            seen.insert(next);
            current = next;
        }

        // Members not on the traced path still belong to the cycle.
        let mut rest: Vec<VertexId> = component
            .iter()
            .copied()
            .filter(|id| !seen.contains(id))
            .collect();
        rest.sort();
        sequence.extend(rest);
        sequence
    }

    /// Compute walk-ordering constraints from the graph's edges.
    ///
    /// `order` is asked once per edge `(vertex, dependency)` and decides
    /// whether the edge keeps creation order, reverses it, or is dropped.
    pub fn schedule<F>(&self, mut order: F) -> Schedule
    where
        F: FnMut(VertexId, VertexId) -> EdgeOrder,
    {
        let mut schedule = Schedule {
            vertices: self.ids().collect(),
            waits_on: HashMap::new(),
            unblocks: HashMap::new(),
        };
        for (vertex, dependency) in self.edges() {
            match order(vertex, dependency) {
                EdgeOrder::Forward => schedule.constrain(dependency, vertex),
                EdgeOrder::Reverse => schedule.constrain(vertex, dependency),
                EdgeOrder::Ignore => {}
            }
        }
        schedule
    }

    fn slot(&self, id: VertexId) -> Option<&Slot<V>> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }
}

impl<V> Default for Dag<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordering constraints for one walk.
///
/// `waits_on[v]` lists the vertices that must finish before `v` starts;
/// `unblocks[v]` is the inverse relation.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    vertices: Vec<VertexId>,
    waits_on: HashMap<VertexId, IndexSet<VertexId>>,
    unblocks: HashMap<VertexId, IndexSet<VertexId>>,
}

impl Schedule {
    fn constrain(&mut self, before: VertexId, after: VertexId) {
        self.waits_on.entry(after).or_default().insert(before);
        self.unblocks.entry(before).or_default().insert(after);
    }

    /// Every vertex taking part in the walk.
    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    /// Vertices that must finish before `id` starts.
    pub fn waits_on(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.waits_on
            .get(&id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Vertices waiting on `id`.
    pub fn unblocks(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.unblocks
            .get(&id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Number of vertices `id` waits on.
    pub fn in_degree(&self, id: VertexId) -> usize {
        self.waits_on.get(&id).map_or(0, IndexSet::len)
    }

    /// All `(before, after)` constraints.
    pub fn constraints(&self) -> Vec<(VertexId, VertexId)> {
        self.vertices
            .iter()
            .flat_map(|&after| self.waits_on(after).map(move |before| (before, after)))
            .collect()
    }

    /// A sequential order honoring every constraint.
    ///
    /// Vertices caught in a constraint cycle are left out of the result.
    pub fn topological_order(&self) -> Vec<VertexId> {
        let mut in_degree: HashMap<VertexId, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        let mut result = Vec::with_capacity(self.vertices.len());

        for &id in &self.vertices {
            let degree = self.in_degree(id);
            in_degree.insert(id, degree);
            if degree == 0 {
                queue.push_back(id);
            }
        }

        // Kahn's algorithm
        while let Some(id) = queue.pop_front() {
            result.push(id);

            for next in self.unblocks(id) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        result
    }
}

struct Tarjan {
    counter: usize,
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<VertexId>,
    components: Vec<Vec<VertexId>>,
}

impl Tarjan {
    fn new(capacity: usize) -> Self {
        Self {
            counter: 0,
            index: vec![None; capacity],
            lowlink: vec![0; capacity],
            on_stack: vec![false; capacity],
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    /// Depth-first search from `root`, driven by an explicit frame stack.
    fn visit<V>(&mut self, dag: &Dag<V>, root: VertexId) {
        let mut frames = vec![self.enter(dag, root)];

        while let Some(frame) = frames.last_mut() {
            let id = frame.id;
            if let Some(&dep) = frame.dependencies.get(frame.next) {
                frame.next += 1;
                match self.index[dep.0] {
                    None => frames.push(self.enter(dag, dep)),
                    Some(dep_index) if self.on_stack[dep.0] => {
                        self.lowlink[id.0] = self.lowlink[id.0].min(dep_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some(parent) = frames.last() {
                self.lowlink[parent.id.0] = self.lowlink[parent.id.0].min(self.lowlink[id.0]);
            }

            if Some(self.lowlink[id.0]) == self.index[id.0] {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack[member.0] = false;
                    component.push(member);
                    if member == id {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }

    fn enter<V>(&mut self, dag: &Dag<V>, id: VertexId) -> Frame {
        self.index[id.0] = Some(self.counter);
        self.lowlink[id.0] = self.counter;
        self.counter += 1;
        self.stack.push(id);
        self.on_stack[id.0] = true;

        Frame {
            id,
            dependencies: dag.dependencies(id).collect(),
            next: 0,
        }
    }
}

/// A vertex whose dependencies are still being searched.
struct Frame {
    id: VertexId,
    dependencies: Vec<VertexId>,
    next: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(len: usize) -> (Dag<&'static str>, Vec<VertexId>) {
        let names = ["a", "b", "c", "d", "e"];
        let mut dag = Dag::new();
        let ids: Vec<_> = names[..len].iter().map(|n| dag.add_vertex(*n)).collect();
        for pair in ids.windows(2) {
            // each vertex depends on its predecessor
            dag.connect(pair[1], pair[0]);
        }
        (dag, ids)
    }

    #[test]
    fn add_and_remove_vertices() {
        let mut dag = Dag::new();
        let a = dag.add_vertex("a");
        let b = dag.add_vertex("b");
        dag.connect(b, a);

        assert_eq!(dag.len(), 2);

        assert_eq!(dag.remove_vertex(a), Some("a"));
        assert_eq!(dag.len(), 1);
        assert!(dag.get(a).is_none());
        assert_eq!(dag.dependencies(b).count(), 0);
    }

    #[test]
    fn add_and_remove_edges() {
        let mut dag = Dag::new();
        let a = dag.add_vertex("a");
        let b = dag.add_vertex("b");

        assert!(dag.connect(b, a));
        assert!(!dag.connect(b, a));
        assert!(dag.has_edge(b, a));
        assert_eq!(dag.dependents(a).collect::<Vec<_>>(), vec![b]);

        dag.disconnect(b, a);
        assert!(!dag.has_edge(b, a));
        assert_eq!(dag.dependents(a).count(), 0);
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let (dag, ids) = chain(4);
        let order = dag.topological_order().unwrap();
        assert_eq!(order, ids);
    }

    #[test]
    fn cycle_is_reported_in_edge_order() {
        let mut dag = Dag::new();
        let a = dag.add_vertex("a");
        let b = dag.add_vertex("b");
        let c = dag.add_vertex("c");
        dag.connect(a, b);
        dag.connect(b, c);
        dag.connect(c, a);

        let cycles = dag.topological_order().unwrap_err();
        assert_eq!(cycles, vec![vec![a, b, c]]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut dag = Dag::new();
        let a = dag.add_vertex("a");
        dag.connect(a, a);
        assert_eq!(dag.cycles(), vec![vec![a]]);
    }

    #[test]
    fn long_chains_have_no_cycles() {
        let mut dag = Dag::new();
        let ids: Vec<_> = (0..100_000usize).map(|n| dag.add_vertex(n)).collect();
        for pair in ids.windows(2) {
            dag.connect(pair[1], pair[0]);
        }

        assert!(dag.cycles().is_empty());
        let order = dag.topological_order().unwrap();
        assert_eq!(order.first(), ids.first());
        assert_eq!(order.last(), ids.last());
    }

    #[test]
    fn reversed_schedule_inverts_order() {
        let (dag, ids) = chain(3);
        let schedule = dag.schedule(|_, _| EdgeOrder::Reverse);
        let order = schedule.topological_order();
        assert_eq!(order, ids.iter().rev().copied().collect::<Vec<_>>());
    }

    #[test]
    fn ignored_edges_leave_no_constraint() {
        let (dag, ids) = chain(3);
        let schedule = dag.schedule(|vertex, _| {
            if vertex == ids[2] {
                EdgeOrder::Ignore
            } else {
                EdgeOrder::Forward
            }
        });
        assert_eq!(schedule.in_degree(ids[2]), 0);
        assert_eq!(schedule.constraints(), vec![(ids[0], ids[1])]);
    }
}
