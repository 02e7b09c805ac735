//! Schedule builder with dependency graph
//!
//! Constructs system execution schedule via topological sort. Edges come
//! from two sources: explicit `before`/`after` ordering constraints, and
//! component-access conflicts between systems with no declared order. The
//! strict `prepare(true)` path treats an unordered conflict as an error
//! instead of silently picking an order for it.

use rustc_hash::FxHashMap;
use std::collections::{HashMap, VecDeque};

use crate::error::{EcsError, Result, SchedulePrepareError};
use crate::system::{BoxedSystem, System, SystemAccess, SystemId};
use crate::World;

/// A condition gating whether a system runs on a given frame. Evaluated once
/// per frame, against the world state as it stood at the start of the
/// frame, before any system in that frame has run.
pub type RunCondition = Box<dyn Fn(&World) -> bool + Send + Sync>;

/// System node in dependency graph
#[derive(Debug, Clone)]
pub struct SystemNode {
    pub id: SystemId,
    pub access: SystemAccess,
}

/// Dependency graph for systems
pub struct SystemGraph {
    pub nodes: Vec<SystemNode>,
    pub edges: FxHashMap<SystemId, Vec<SystemId>>,
    pub reverse_edges: FxHashMap<SystemId, Vec<SystemId>>,
}

impl SystemGraph {
    /// Build a graph from systems, explicit ordering edges, and (when
    /// `auto_resolve_conflicts` is set) conflict edges synthesized between
    /// any unordered pair of systems with overlapping access. When it is
    /// unset, an unordered conflicting pair is an error instead.
    fn build(systems: &[BoxedSystem], ordering_edges: &[(SystemId, SystemId)], auto_resolve_conflicts: bool) -> Result<Self> {
        let mut nodes = Vec::with_capacity(systems.len());
        let mut edges: FxHashMap<SystemId, Vec<SystemId>> = FxHashMap::default();
        let mut reverse_edges: FxHashMap<SystemId, Vec<SystemId>> = FxHashMap::default();

        for (i, system) in systems.iter().enumerate() {
            let id = SystemId(i as u32);
            let access = system.access();
            nodes.push(SystemNode { id, access });
            edges.insert(id, Vec::new());
            reverse_edges.insert(id, Vec::new());
        }

        for &(from, to) in ordering_edges {
            edges.get_mut(&from).unwrap().push(to);
            reverse_edges.get_mut(&to).unwrap().push(from);
        }

        let connected = |a: SystemId, b: SystemId, edges: &FxHashMap<SystemId, Vec<SystemId>>| {
            edges.get(&a).is_some_and(|v| v.contains(&b)) || edges.get(&b).is_some_and(|v| v.contains(&a))
        };

        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let id_a = nodes[i].id;
                let id_b = nodes[j].id;

                if !nodes[i].access.conflicts_with(&nodes[j].access) || connected(id_a, id_b, &edges) {
                    continue;
                }

                if auto_resolve_conflicts {
                    edges.get_mut(&id_a).unwrap().push(id_b);
                    reverse_edges.get_mut(&id_b).unwrap().push(id_a);
                } else {
                    return Err(SchedulePrepareError::AccessConflict(systems[i].name().to_string(), systems[j].name().to_string()).into());
                }
            }
        }

        Ok(Self { nodes, edges, reverse_edges })
    }

    /// Topological sort (Kahn's algorithm)
    pub fn topological_sort(&self) -> Result<Vec<SystemId>> {
        let mut in_degree: FxHashMap<SystemId, usize> = FxHashMap::default();
        let mut queue = VecDeque::new();
        let mut result = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            in_degree.insert(node.id, self.reverse_edges.get(&node.id).map_or(0, |v| v.len()));
        }

        for node in &self.nodes {
            if in_degree[&node.id] == 0 {
                queue.push_back(node.id);
            }
        }

        while let Some(id) = queue.pop_front() {
            result.push(id);

            if let Some(neighbors) = self.edges.get(&id) {
                for &neighbor in neighbors {
                    let degree = in_degree.get_mut(&neighbor).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            return Err(EcsError::SystemCycleDetected);
        }

        Ok(result)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Stage of systems that can run concurrently
#[derive(Debug, Clone)]
pub struct Stage {
    pub systems: Vec<SystemId>,
}

impl Stage {
    pub fn new() -> Self {
        Self { systems: Vec::new() }
    }

    /// Try to add a system to this stage: rejected if it conflicts in
    /// access, or is directly ordered, with anything already in the stage.
    pub fn try_add(&mut self, system_id: SystemId, access: &SystemAccess, graph: &SystemGraph) -> bool {
        for &existing_id in &self.systems {
            let existing_node = graph.nodes.iter().find(|n| n.id == existing_id).unwrap();

            if access.conflicts_with(&existing_node.access) {
                return false;
            }

            let ordered = graph.edges.get(&existing_id).is_some_and(|v| v.contains(&system_id))
                || graph.edges.get(&system_id).is_some_and(|v| v.contains(&existing_id));
            if ordered {
                return false;
            }
        }

        self.systems.push(system_id);
        true
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordering constraint for a system, referenced by name
#[derive(Debug, Clone)]
pub struct OrderingConstraint {
    pub system_name: String,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// Complete execution schedule
pub struct Schedule {
    pub(crate) systems: Vec<BoxedSystem>,
    pub(crate) stages: Vec<Stage>,
    pub(crate) graph: Option<SystemGraph>,
    pub(crate) ordering_constraints: Vec<OrderingConstraint>,
    /// Set name -> member system names, declared via `add_to_set`.
    pub(crate) set_members: HashMap<String, Vec<String>>,
    /// Per-system run conditions, keyed by system name.
    pub(crate) run_conditions: HashMap<String, RunCondition>,
    /// Per-set run conditions, keyed by set name; ANDed with any condition
    /// on the set's individual members.
    pub(crate) set_run_conditions: HashMap<String, RunCondition>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    /// Build a schedule directly from a vector of systems
    pub fn from_systems(systems: Vec<BoxedSystem>) -> Result<Self> {
        Self {
            systems,
            stages: Vec::new(),
            graph: None,
            ordering_constraints: Vec::new(),
            set_members: HashMap::new(),
            run_conditions: HashMap::new(),
            set_run_conditions: HashMap::new(),
        }
        .build()
    }

    /// Create an empty schedule
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            stages: Vec::new(),
            graph: None,
            ordering_constraints: Vec::new(),
            set_members: HashMap::new(),
            run_conditions: HashMap::new(),
            set_run_conditions: HashMap::new(),
        }
    }

    /// Convenience constructor for chaining
    pub fn with_system(mut self, system: BoxedSystem) -> Self {
        self.add_system(system);
        self
    }

    /// Add a system to the schedule definition
    pub fn add_system(&mut self, system: BoxedSystem) {
        self.systems.push(system);
        self.invalidate();
    }

    /// Add a system that must run before another system, named by `before`
    pub fn add_system_before(&mut self, system: BoxedSystem, before: &str) {
        let system_name = system.name().to_string();
        self.systems.push(system);

        if let Some(constraint) = self.ordering_constraints.iter_mut().find(|c| c.system_name == system_name) {
            constraint.before.push(before.to_string());
        } else {
            self.ordering_constraints.push(OrderingConstraint { system_name: system_name.clone(), before: vec![before.to_string()], after: Vec::new() });
        }

        self.invalidate();
    }

    /// Add a system that must run after another system, named by `after`
    pub fn add_system_after(&mut self, system: BoxedSystem, after: &str) {
        let system_name = system.name().to_string();
        self.systems.push(system);

        if let Some(constraint) = self.ordering_constraints.iter_mut().find(|c| c.system_name == system_name) {
            constraint.after.push(after.to_string());
        } else {
            self.ordering_constraints.push(OrderingConstraint { system_name, before: Vec::new(), after: vec![after.to_string()] });
        }

        self.invalidate();
    }

    /// Declare `system_name` a member of `set_name`. A set is just a name
    /// that `add_system_before`/`add_system_after`/`add_set_before`/
    /// `add_set_after` can order against, and that `set_run_if` can gate,
    /// in one shot for every current and future member.
    pub fn add_to_set(&mut self, system_name: &str, set_name: &str) {
        self.set_members.entry(set_name.to_string()).or_default().push(system_name.to_string());
        self.invalidate();
    }

    /// Order every member of `set_name` before every member of `before`
    /// (which may itself be a plain system name or another set).
    pub fn add_set_before(&mut self, set_name: &str, before: &str) {
        self.push_ordering_constraint(set_name, Some(before), None);
    }

    /// Order every member of `set_name` after every member of `after`
    /// (which may itself be a plain system name or another set).
    pub fn add_set_after(&mut self, set_name: &str, after: &str) {
        self.push_ordering_constraint(set_name, None, Some(after));
    }

    fn push_ordering_constraint(&mut self, name: &str, before: Option<&str>, after: Option<&str>) {
        if let Some(constraint) = self.ordering_constraints.iter_mut().find(|c| c.system_name == name) {
            constraint.before.extend(before.map(str::to_string));
            constraint.after.extend(after.map(str::to_string));
        } else {
            self.ordering_constraints.push(OrderingConstraint {
                system_name: name.to_string(),
                before: before.map(str::to_string).into_iter().collect(),
                after: after.map(str::to_string).into_iter().collect(),
            });
        }
        self.invalidate();
    }

    /// Gate a single system: the dispatcher skips its `run` on any frame
    /// where `condition` returns false, still counting it as complete so
    /// its successors in the dependency graph become ready as normal.
    pub fn run_if<F>(&mut self, system_name: &str, condition: F)
    where
        F: Fn(&World) -> bool + Send + Sync + 'static,
    {
        self.run_conditions.insert(system_name.to_string(), Box::new(condition));
    }

    /// Gate every member of `set_name`, current and future, with `condition`.
    /// Combines (AND) with any `run_if` already set on an individual member.
    pub fn set_run_if<F>(&mut self, set_name: &str, condition: F)
    where
        F: Fn(&World) -> bool + Send + Sync + 'static,
    {
        self.set_run_conditions.insert(set_name.to_string(), Box::new(condition));
    }

    /// Every condition gating `id`: its own plus any belonging to a set it
    /// is a member of. The system runs this frame only if all of them do.
    pub(crate) fn run_conditions_for(&self, id: SystemId) -> Vec<&RunCondition> {
        let Some(system) = self.systems.get(id.0 as usize) else {
            return Vec::new();
        };
        let name = system.name();

        let mut conditions: Vec<&RunCondition> = Vec::new();
        if let Some(c) = self.run_conditions.get(name) {
            conditions.push(c);
        }
        for (set_name, members) in &self.set_members {
            if members.iter().any(|m| m == name) {
                if let Some(c) = self.set_run_conditions.get(set_name) {
                    conditions.push(c);
                }
            }
        }
        conditions
    }

    fn invalidate(&mut self) {
        self.graph = None;
        self.stages.clear();
    }

    /// Get mutable reference to a system by name
    pub fn get_system_mut(&mut self, name: &str) -> Option<&mut (dyn System + 'static)> {
        self.systems.iter_mut().find(|sys| sys.name() == name).map(|sys| sys.as_mut())
    }

    /// Finalize schedule (topological sort + stage grouping), auto-resolving
    /// any unordered access conflict by picking an arbitrary order for it.
    pub fn build(mut self) -> Result<Self> {
        self.rebuild()?;
        Ok(self)
    }

    /// Ensure schedule is built (used internally by the executor)
    pub(crate) fn ensure_built(&mut self) -> Result<()> {
        if self.graph.is_none() {
            self.rebuild()?;
        }
        Ok(())
    }

    fn rebuild(&mut self) -> Result<()> {
        self.rebuild_with(false)
    }

    /// Validate and (re)build the schedule. When `check_conflicts` is set,
    /// any two systems that touch the same component with no explicit
    /// `before`/`after` order between them fail with
    /// [`SchedulePrepareError::AccessConflict`] instead of being silently
    /// ordered for you; a dependency cycle fails with
    /// [`SchedulePrepareError::Cycle`] rather than the looser
    /// [`EcsError::SystemCycleDetected`] used by the plain `build()` path.
    pub fn prepare(&mut self, check_conflicts: bool) -> Result<()> {
        self.rebuild_with(check_conflicts)
    }

    /// Resolve a name to the `SystemId`s it denotes: a plain system name
    /// resolves to itself, a set name to the linearised expansion of its
    /// member systems.
    fn resolve_names(&self, name: &str, name_to_id: &HashMap<&str, SystemId>) -> Result<Vec<SystemId>> {
        if let Some(&id) = name_to_id.get(name) {
            return Ok(vec![id]);
        }
        if let Some(members) = self.set_members.get(name) {
            return members
                .iter()
                .map(|m| name_to_id.get(m.as_str()).copied().ok_or_else(|| EcsError::from(SchedulePrepareError::UnknownSet(m.clone()))))
                .collect();
        }
        Err(EcsError::from(SchedulePrepareError::UnknownSet(name.to_string())))
    }

    fn rebuild_with(&mut self, check_conflicts: bool) -> Result<()> {
        let name_to_id: HashMap<&str, SystemId> = self.systems.iter().enumerate().map(|(i, s)| (s.name(), SystemId(i as u32))).collect();

        let mut ordering_edges = Vec::new();
        for constraint in &self.ordering_constraints {
            let froms = self.resolve_names(&constraint.system_name, &name_to_id)?;
            let from_set: std::collections::HashSet<SystemId> = froms.iter().copied().collect();

            for before in &constraint.before {
                let tos = self.resolve_names(before, &name_to_id)?;
                if tos.iter().any(|to| from_set.contains(to)) {
                    return Err(SchedulePrepareError::ParentsWithDeps.into());
                }
                for &from in &froms {
                    for &to in &tos {
                        ordering_edges.push((from, to));
                    }
                }
            }
            for after in &constraint.after {
                let tos = self.resolve_names(after, &name_to_id)?;
                if tos.iter().any(|to| from_set.contains(to)) {
                    return Err(SchedulePrepareError::ParentsWithDeps.into());
                }
                for &from in &froms {
                    for &to in &tos {
                        ordering_edges.push((to, from));
                    }
                }
            }
        }

        let graph = SystemGraph::build(&self.systems, &ordering_edges, !check_conflicts)?;

        let sorted = match graph.topological_sort() {
            Ok(sorted) => sorted,
            Err(_) if check_conflicts => return Err(SchedulePrepareError::Cycle.into()),
            Err(e) => return Err(e),
        };

        let mut stages = Vec::new();
        let mut current_stage = Stage::new();

        for &system_id in &sorted {
            let node = graph.nodes.iter().find(|n| n.id == system_id).unwrap();

            if !current_stage.try_add(system_id, &node.access, &graph) {
                if !current_stage.systems.is_empty() {
                    stages.push(current_stage);
                    current_stage = Stage::new();
                }
                current_stage.systems.push(system_id);
            }
        }

        if !current_stage.systems.is_empty() {
            stages.push(current_stage);
        }

        self.graph = Some(graph);
        self.stages = stages;
        Ok(())
    }

    /// Get stage count
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Get systems in stage
    pub fn stage_system_count(&self, stage_idx: usize) -> usize {
        self.stages.get(stage_idx).map_or(0, |s| s.systems.len())
    }

    /// Total number of registered systems
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Number of nodes in the built dependency graph, or 0 if not yet built
    pub fn node_count(&self) -> usize {
        self.graph.as_ref().map_or(0, |g| g.node_count())
    }

    pub(crate) fn system_mut_by_id(&mut self, id: SystemId) -> Option<&mut BoxedSystem> {
        self.systems.get_mut(id.0 as usize)
    }

    pub(crate) fn stage_plan(&self) -> Vec<&[SystemId]> {
        self.stages.iter().map(|stage| stage.systems.as_slice()).collect()
    }

    pub(crate) fn graph(&self) -> Option<&SystemGraph> {
        self.graph.as_ref()
    }

    /// Get system accesses for dependency analysis
    pub fn get_accesses(&self) -> Vec<SystemAccess> {
        self.systems.iter().map(|s| s.access()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_creation() {
        let stage = Stage::new();
        assert_eq!(stage.systems.len(), 0);
    }

    struct MockSystem {
        name: &'static str,
        reads: Vec<std::any::TypeId>,
        writes: Vec<std::any::TypeId>,
    }

    impl MockSystem {
        fn new(name: &'static str) -> Self {
            Self { name, reads: Vec::new(), writes: Vec::new() }
        }
    }

    impl crate::system::System for MockSystem {
        fn run(&mut self, _world: &mut crate::World) -> crate::error::Result<()> {
            Ok(())
        }
        fn name(&self) -> &'static str {
            self.name
        }
        fn access(&self) -> crate::system::SystemAccess {
            crate::system::SystemAccess { reads: self.reads.clone(), writes: self.writes.clone() }
        }
    }

    #[test]
    fn test_lazy_rebuild() {
        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(MockSystem::new("a")));

        assert!(schedule.graph.is_none(), "Graph should be None after add_system");

        schedule.ensure_built().expect("Failed to build");

        assert!(schedule.graph.is_some(), "Graph should be Some after ensure_built");

        schedule.add_system(Box::new(MockSystem::new("b")));

        assert!(schedule.graph.is_none(), "Graph should be invalidated after adding new system");
    }

    #[test]
    fn build_auto_orders_conflicting_systems_into_separate_stages() {
        let ty = std::any::TypeId::of::<u32>();
        let mut a = MockSystem::new("a");
        a.writes.push(ty);
        let mut b = MockSystem::new("b");
        b.writes.push(ty);

        let schedule = Schedule::new().with_system(Box::new(a)).with_system(Box::new(b)).build().expect("build should auto-resolve the conflict");

        assert_eq!(schedule.stage_count(), 2);
    }

    #[test]
    fn prepare_strict_rejects_unordered_conflict() {
        let ty = std::any::TypeId::of::<u32>();
        let mut a = MockSystem::new("a");
        a.writes.push(ty);
        let mut b = MockSystem::new("b");
        b.writes.push(ty);

        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(a));
        schedule.add_system(Box::new(b));

        let err = schedule.prepare(true).unwrap_err();
        assert!(matches!(err, EcsError::SchedulePrepareError(SchedulePrepareError::AccessConflict(_, _))));
    }

    #[test]
    fn prepare_strict_accepts_explicitly_ordered_conflict() {
        let ty = std::any::TypeId::of::<u32>();
        let mut a = MockSystem::new("a");
        a.writes.push(ty);
        let mut b = MockSystem::new("b");
        b.writes.push(ty);

        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(a));
        schedule.add_system_after(Box::new(b), "a");

        schedule.prepare(true).expect("explicit ordering should satisfy the strict check");
        assert_eq!(schedule.stage_count(), 2);
    }

    #[test]
    fn unknown_ordering_name_is_reported() {
        let mut schedule = Schedule::new();
        schedule.add_system_before(Box::new(MockSystem::new("a")), "missing");

        let err = schedule.prepare(false).unwrap_err();
        assert!(matches!(err, EcsError::SchedulePrepareError(SchedulePrepareError::UnknownSet(_))));
    }

    #[test]
    fn set_ordering_expands_to_every_member_pair() {
        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(MockSystem::new("input_a")));
        schedule.add_system(Box::new(MockSystem::new("input_b")));
        schedule.add_system(Box::new(MockSystem::new("physics_a")));
        schedule.add_system(Box::new(MockSystem::new("physics_b")));

        schedule.add_to_set("input_a", "InputSet");
        schedule.add_to_set("input_b", "InputSet");
        schedule.add_to_set("physics_a", "PhysicsSet");
        schedule.add_to_set("physics_b", "PhysicsSet");
        schedule.add_set_before("InputSet", "PhysicsSet");

        schedule.prepare(false).expect("set ordering should resolve cleanly");
        let graph = schedule.graph().unwrap();

        let id = |name: &str| SystemId(schedule.systems.iter().position(|s| s.name() == name).unwrap() as u32);
        for input in ["input_a", "input_b"] {
            for physics in ["physics_a", "physics_b"] {
                assert!(graph.edges.get(&id(input)).unwrap().contains(&id(physics)), "{input} should precede {physics}");
            }
        }
    }

    #[test]
    fn set_ordering_into_its_own_member_is_rejected() {
        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(MockSystem::new("a")));
        schedule.add_system(Box::new(MockSystem::new("b")));
        schedule.add_to_set("a", "GroupSet");
        schedule.add_to_set("b", "GroupSet");
        schedule.add_set_before("GroupSet", "a");

        let err = schedule.prepare(false).unwrap_err();
        assert!(matches!(err, EcsError::SchedulePrepareError(SchedulePrepareError::ParentsWithDeps)));
    }

    #[test]
    fn run_conditions_combine_system_and_set_level_gates() {
        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(MockSystem::new("a")));
        schedule.add_to_set("a", "Gated");
        schedule.run_if("a", |_world: &crate::World| true);
        schedule.set_run_if("Gated", |_world: &crate::World| false);

        schedule.prepare(false).unwrap();
        let id = SystemId(0);
        let conditions = schedule.run_conditions_for(id);
        assert_eq!(conditions.len(), 2);

        let world = crate::World::new();
        assert!(!conditions.iter().all(|c| c(&world)));
    }
}
