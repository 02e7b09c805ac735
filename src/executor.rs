//! Frame executor: profiler, sync point, and the parallel dispatch loop.

use crate::command::CommandBuffer;
use crate::entity::Entity;
use crate::error::Result;
use crate::schedule::Schedule;
use crate::system::{BoxedSystem, SystemId};
use crate::World;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// System execution profiler
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub call_count: u64,
}

/// System profiler for collecting timing data
pub struct SystemProfiler {
    timings: HashMap<SystemId, Vec<Duration>>,
    call_counts: HashMap<SystemId, u64>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            call_counts: HashMap::new(),
        }
    }

    pub fn record_execution(&mut self, id: SystemId, duration: Duration) {
        self.timings.entry(id).or_default().push(duration);
        self.call_counts.entry(id).and_modify(|c| *c += 1).or_insert(1);
    }

    pub fn get_stats(&self, id: SystemId) -> Option<SystemStats> {
        let timings = self.timings.get(&id)?;
        if timings.is_empty() {
            return None;
        }

        let min = *timings.iter().min().unwrap_or(&Duration::ZERO);
        let max = *timings.iter().max().unwrap_or(&Duration::ZERO);
        let avg = timings.iter().sum::<Duration>() / timings.len() as u32;

        Some(SystemStats { min, max, avg, call_count: *self.call_counts.get(&id).unwrap_or(&0) })
    }

    pub fn clear(&mut self) {
        self.timings.clear();
        self.call_counts.clear();
    }
}

impl Default for SystemProfiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw pointer wrapper asserting the pointee is only ever touched by one
/// worker at a time, per the schedule's conflict/ordering graph.
struct SendPtr<T>(*mut T);
unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}
impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for SendPtr<T> {}

/// Frame executor
pub struct Executor {
    pub schedule: Schedule,
    pub profiler: SystemProfiler,
}

impl Executor {
    /// Create new executor
    pub fn new(schedule: Schedule) -> Self {
        Self { schedule, profiler: SystemProfiler::new() }
    }

    /// Execute one frame: systems dispatch as soon as every predecessor in
    /// the dependency graph has completed, not in lockstep stage barriers.
    /// Two systems run concurrently only when the graph has no edge between
    /// them in either direction, which `Schedule::prepare`/`build` guarantee
    /// means their component access doesn't conflict either.
    pub fn execute_frame(&mut self, world: &mut World) -> Result<()> {
        self.schedule.ensure_built()?;

        let (edges, mut in_degree, total) = {
            let graph = self.schedule.graph().expect("ensure_built populates the graph");
            let mut in_degree = HashMap::with_capacity(graph.nodes.len());
            for node in &graph.nodes {
                in_degree.insert(node.id, graph.reverse_edges.get(&node.id).map_or(0, |v| v.len()));
            }
            (graph.edges.clone(), in_degree, graph.nodes.len())
        };

        if total == 0 {
            return Ok(());
        }

        // Run conditions are evaluated once, up front, against the world as
        // it stood before any system in this frame has touched it — not
        // re-checked mid-frame, since systems may run concurrently with no
        // declared access to whatever a condition reads.
        let skip: HashSet<SystemId> = {
            let graph = self.schedule.graph().expect("ensure_built populates the graph");
            let world_ref: &World = world;
            graph
                .nodes
                .iter()
                .filter_map(|node| {
                    let conditions = self.schedule.run_conditions_for(node.id);
                    let should_run = conditions.iter().all(|c| c(world_ref));
                    (!should_run).then_some(node.id)
                })
                .collect()
        };

        let ready: Vec<SystemId> = in_degree.iter().filter(|(_, &degree)| degree == 0).map(|(&id, _)| id).collect();

        let systems_ptr = SendPtr(self.schedule.systems.as_mut_ptr());
        let world_ptr = SendPtr(world as *mut World);
        let (tx, rx) = mpsc::channel::<(SystemId, Option<Result<Duration>>)>();

        let mut first_error = None;

        rayon::scope(|scope| {
            let dispatch = |scope: &rayon::Scope, id: SystemId| {
                if skip.contains(&id) {
                    let _ = tx.send((id, None));
                    return;
                }
                let tx = tx.clone();
                scope.spawn(move |_| {
                    // SAFETY: the schedule's dependency graph puts an edge between any
                    // two systems with conflicting access, so the set of systems ever
                    // "ready" to run concurrently always touches disjoint component
                    // data and never aliases the same entry in `systems_ptr`.
                    let system: &mut BoxedSystem = unsafe { &mut *systems_ptr.0.add(id.0 as usize) };
                    let world: &mut World = unsafe { &mut *world_ptr.0 };
                    let start = Instant::now();
                    let result = system.run(world);
                    let elapsed = start.elapsed();
                    let _ = tx.send((id, Some(result.map(|_| elapsed))));
                });
            };

            for &id in &ready {
                dispatch(scope, id);
            }

            let mut remaining = total;
            while remaining > 0 {
                let (id, outcome) = rx.recv().expect("a dispatched system dropped its completion sender");
                remaining -= 1;

                match outcome {
                    Some(Ok(elapsed)) => self.profiler.record_execution(id, elapsed),
                    Some(Err(e)) if first_error.is_none() => first_error = Some(e),
                    Some(Err(_)) => {}
                    None => {}
                }

                if let Some(successors) = edges.get(&id) {
                    for &succ in successors {
                        let degree = in_degree.get_mut(&succ).unwrap();
                        *degree -= 1;
                        if *degree == 0 {
                            dispatch(scope, succ);
                        }
                    }
                }
            }
        });

        self.barrier(world)?;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Flush anything the frame deferred: entities reserved via `Commands`
    /// and the commands queued against them, now that no system is still
    /// running.
    fn barrier(&mut self, world: &mut World) -> Result<()> {
        world.flush()
    }
}

/// Synchronization point between stages
pub struct SyncPoint {
    pub command_buffers: Vec<CommandBuffer>,
    pub despawn_queue: Vec<Entity>,
}

impl SyncPoint {
    /// Create new sync point
    pub fn new() -> Self {
        Self { command_buffers: Vec::new(), despawn_queue: Vec::new() }
    }

    /// Add command buffer to flush
    pub fn add_command_buffer(&mut self, buffer: CommandBuffer) {
        self.command_buffers.push(buffer);
    }

    /// Queue entity for despawn
    pub fn queue_despawn(&mut self, entity: Entity) {
        self.despawn_queue.push(entity);
    }

    /// Flush all commands to world
    pub fn flush(&mut self, world: &mut World) -> Result<()> {
        for &entity in self.despawn_queue.iter().rev() {
            world.despawn(entity).ok();
        }
        self.despawn_queue.clear();

        for buffer in self.command_buffers.drain(..) {
            world.flush_commands(buffer)?;
        }

        Ok(())
    }
}

impl Default for SyncPoint {
    fn default() -> Self {
        Self::new()
    }
}

use std::fs::File;
use std::io::Write as _;

/// Debug information about scheduling
#[derive(Debug, Clone)]
pub struct ScheduleDebugInfo {
    pub stage_count: usize,
    pub total_systems: usize,
    pub systems_per_stage: Vec<usize>,
}

impl ScheduleDebugInfo {
    /// Create from schedule
    pub fn from_schedule(schedule: &Schedule) -> Self {
        let stage_count = schedule.stage_count();
        let total_systems = schedule.node_count();
        let systems_per_stage = (0..stage_count).map(|i| schedule.stage_system_count(i)).collect();

        Self { stage_count, total_systems, systems_per_stage }
    }

    /// Print debug info
    pub fn print_debug(&self) {
        println!("Schedule Debug Info:");
        println!("  Total systems: {}", self.total_systems);
        println!("  Stages: {}", self.stage_count);
        for (i, &count) in self.systems_per_stage.iter().enumerate() {
            println!("    Stage {i}: {count} systems");
        }
    }

    /// Export as JSON (simplified)
    pub fn export_json(&self, filename: &str) -> std::io::Result<()> {
        let mut file = File::create(filename)?;
        write!(file, "{{")?;
        write!(file, "\"stage_count\":{},", self.stage_count)?;
        write!(file, "\"total_systems\":{},", self.total_systems)?;
        write!(file, "\"systems_per_stage\":[")?;
        for (i, &count) in self.systems_per_stage.iter().enumerate() {
            if i > 0 {
                write!(file, ",")?;
            }
            write!(file, "{count}")?;
        }
        write!(file, "]")?;
        write!(file, "}}")?;
        Ok(())
    }
}
