// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Render graph: a directed graph of typed-slot nodes with sub-graphs, run
//! by a single-pass topological runner that submits accumulated command
//! lists to a device queue.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::entity::Entity;
use crate::error::{EdgeError, GraphError, Result};
use crate::world::World;

pub type NodeLabel = &'static str;

/// The type of value that flows across a slot edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    Buffer,
    Texture,
    Sampler,
    Entity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub u64);

/// A value produced on an output slot and consumed on a matching input slot.
#[derive(Debug, Clone)]
pub enum SlotValue {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    Sampler(SamplerHandle),
    Entity(Entity),
}

impl SlotValue {
    pub fn slot_type(&self) -> SlotType {
        match self {
            SlotValue::Buffer(_) => SlotType::Buffer,
            SlotValue::Texture(_) => SlotType::Texture,
            SlotValue::Sampler(_) => SlotType::Sampler,
            SlotValue::Entity(_) => SlotType::Entity,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SlotInfo {
    pub name: &'static str,
    pub slot_type: SlotType,
}

impl SlotInfo {
    pub fn new(name: &'static str, slot_type: SlotType) -> Self {
        Self { name, slot_type }
    }
}

/// An opaque recorded sequence of device commands. Stands in for a real
/// GPU command list so the runner and its tests need no GPU binding.
#[derive(Debug, Default, Clone)]
pub struct CommandList {
    pub commands: Vec<String>,
}

impl CommandList {
    pub fn push(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }
}

/// The GPU device collaborator: command-list creation and queue submission.
/// Excluded from this crate's scope is the actual binding; only the
/// interface contract is modeled.
pub trait RenderDevice: Send + Sync {
    fn create_command_list(&self) -> CommandList {
        CommandList::default()
    }

    fn submit(&self, lists: Vec<CommandList>);
}

/// A recording fake device: stores what was submitted instead of talking to
/// a GPU, for use by tests and any environment without a real device.
#[derive(Default)]
pub struct RecordingDevice {
    pub submitted: std::sync::Mutex<Vec<Vec<CommandList>>>,
}

impl RenderDevice for RecordingDevice {
    fn submit(&self, lists: Vec<CommandList>) {
        self.submitted.lock().unwrap().push(lists);
    }
}

/// A sub-graph invocation a node requests; consumed by the runner after the
/// node returns rather than called back into re-entrantly.
pub struct RunSubGraph {
    pub name: &'static str,
    pub inputs: Vec<SlotValue>,
    pub view_entity: Option<Entity>,
}

/// Per-node execution context: the inputs gathered for this run, slots for
/// this node to fill in, and any sub-graph invocations it queues.
pub struct GraphContext {
    inputs: Vec<SlotValue>,
    output_infos: Vec<SlotInfo>,
    outputs: Vec<Option<SlotValue>>,
    run_sub_graphs: Vec<RunSubGraph>,
}

impl GraphContext {
    fn new(input_slots: &[SlotInfo], inputs: Vec<SlotValue>, output_infos: Vec<SlotInfo>) -> Self {
        debug_assert_eq!(input_slots.len(), inputs.len());
        let output_count = output_infos.len();
        Self { inputs, output_infos, outputs: vec![None; output_count], run_sub_graphs: Vec::new() }
    }

    pub fn input(&self, index: usize) -> Option<&SlotValue> {
        self.inputs.get(index)
    }

    /// Set a declared output slot by name. Errors if the slot doesn't exist
    /// or the value's type doesn't match the slot's declared type.
    pub fn set_output(&mut self, name: &str, value: SlotValue) -> Result<()> {
        let index = self.output_infos.iter().position(|s| s.name == name).ok_or(EdgeError::SlotMissing)?;
        if self.output_infos[index].slot_type != value.slot_type() {
            return Err(EdgeError::SlotTypeMismatch.into());
        }
        self.outputs[index] = Some(value);
        Ok(())
    }

    pub fn run_sub_graph(&mut self, name: &'static str, inputs: Vec<SlotValue>, view_entity: Option<Entity>) {
        self.run_sub_graphs.push(RunSubGraph { name, inputs, view_entity });
    }
}

/// Render-side command accumulation handed to nodes alongside `GraphContext`.
pub struct RenderContext<'d> {
    device: &'d dyn RenderDevice,
    command_lists: Vec<CommandList>,
}

impl<'d> RenderContext<'d> {
    fn new(device: &'d dyn RenderDevice) -> Self {
        Self { device, command_lists: Vec::new() }
    }

    pub fn device(&self) -> &dyn RenderDevice {
        self.device
    }

    pub fn push_command_list(&mut self, list: CommandList) {
        self.command_lists.push(list);
    }
}

/// A single render-graph node.
pub trait Node: Send + Sync {
    fn input_slots(&self) -> Vec<SlotInfo> {
        Vec::new()
    }

    fn output_slots(&self) -> Vec<SlotInfo> {
        Vec::new()
    }

    fn run(&self, graph_ctx: &mut GraphContext, render_ctx: &mut RenderContext, world: &World) -> Result<()>;
}

/// Label reserved for the graph's externally-supplied input node.
pub const GRAPH_INPUT: NodeLabel = "__graph_input__";

struct GraphInputNode {
    output_infos: Vec<SlotInfo>,
}

impl Node for GraphInputNode {
    fn output_slots(&self) -> Vec<SlotInfo> {
        self.output_infos.clone()
    }

    fn run(&self, _graph_ctx: &mut GraphContext, _render_ctx: &mut RenderContext, _world: &World) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct SlotEdge {
    output_node: NodeLabel,
    output_index: usize,
    input_node: NodeLabel,
    input_index: usize,
}

#[derive(Default)]
struct NodeEdges {
    input_node_edges: Vec<NodeLabel>,
    output_node_edges: Vec<NodeLabel>,
    input_slot_edges: Vec<SlotEdge>,
    output_slot_edges: Vec<SlotEdge>,
}

struct NodeState {
    node: Box<dyn Node>,
    input_slots: Vec<SlotInfo>,
    output_slots: Vec<SlotInfo>,
    edges: NodeEdges,
}

/// A directed graph of render nodes connected by ordering and typed-slot
/// edges, plus any number of named sub-graphs it can invoke.
#[derive(Default)]
pub struct RenderGraph {
    nodes: FxHashMap<NodeLabel, NodeState>,
    sub_graphs: FxHashMap<&'static str, RenderGraph>,
    input_node: Option<NodeLabel>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node<N: Node + 'static>(&mut self, label: NodeLabel, node: N) {
        let input_slots = node.input_slots();
        let output_slots = node.output_slots();
        self.nodes.insert(label, NodeState { node: Box::new(node), input_slots, output_slots, edges: NodeEdges::default() });
    }

    /// Declare the graph's externally-supplied input slots. Bound once per
    /// `RenderGraphRunner::run` call to the caller's `inputs`.
    pub fn set_input(&mut self, output_infos: Vec<SlotInfo>) {
        self.add_node(GRAPH_INPUT, GraphInputNode { output_infos });
        self.input_node = Some(GRAPH_INPUT);
    }

    pub fn add_node_edge(&mut self, output_node: NodeLabel, input_node: NodeLabel) -> Result<()> {
        if output_node == input_node || !self.nodes.contains_key(output_node) || !self.nodes.contains_key(input_node) {
            return Err(EdgeError::NodesMissing.into());
        }

        self.nodes.get_mut(output_node).unwrap().edges.output_node_edges.push(input_node);
        self.nodes.get_mut(input_node).unwrap().edges.input_node_edges.push(output_node);
        Ok(())
    }

    pub fn add_slot_edge(&mut self, output_node: NodeLabel, output_slot: &str, input_node: NodeLabel, input_slot: &str) -> Result<()> {
        let output_index = self.nodes.get(output_node).ok_or(EdgeError::NodesMissing)?.output_slots.iter().position(|s| s.name == output_slot).ok_or(EdgeError::SlotMissing)?;
        let input_index = self.nodes.get(input_node).ok_or(EdgeError::NodesMissing)?.input_slots.iter().position(|s| s.name == input_slot).ok_or(EdgeError::SlotMissing)?;

        let out_type = self.nodes[output_node].output_slots[output_index].slot_type;
        let in_type = self.nodes[input_node].input_slots[input_index].slot_type;
        if out_type != in_type {
            return Err(EdgeError::SlotTypeMismatch.into());
        }

        let occupied = self.nodes[input_node].edges.input_slot_edges.iter().any(|e| e.input_index == input_index);
        if occupied {
            return Err(EdgeError::InputSlotOccupied.into());
        }

        let edge = SlotEdge { output_node, output_index, input_node, input_index };
        self.nodes.get_mut(output_node).unwrap().edges.output_slot_edges.push(edge);
        self.nodes.get_mut(input_node).unwrap().edges.input_slot_edges.push(edge);
        Ok(())
    }

    pub fn add_sub_graph(&mut self, name: &'static str, graph: RenderGraph) -> Result<()> {
        if self.sub_graphs.contains_key(name) {
            return Err(GraphError::SubGraphExists.into());
        }
        self.sub_graphs.insert(name, graph);
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Runs a `RenderGraph` to completion: topological order, per-node input
/// gathering, sub-graph dispatch, then a final flush and device submission.
pub struct RenderGraphRunner;

impl RenderGraphRunner {
    pub fn run(graph: &RenderGraph, device: &dyn RenderDevice, world: &World, inputs: Vec<SlotValue>, finalize: impl FnOnce(&mut CommandList)) -> Result<()> {
        let mut render_ctx = RenderContext::new(device);
        Self::run_subgraph(graph, device, world, &mut render_ctx, inputs, None)?;

        let mut final_list = device.create_command_list();
        finalize(&mut final_list);
        render_ctx.push_command_list(final_list);

        device.submit(std::mem::take(&mut render_ctx.command_lists));
        Ok(())
    }

    fn run_subgraph(
        graph: &RenderGraph,
        device: &dyn RenderDevice,
        world: &World,
        render_ctx: &mut RenderContext,
        inputs: Vec<SlotValue>,
        _view_entity: Option<Entity>,
    ) -> Result<()> {
        let mut in_degree: FxHashMap<NodeLabel, usize> = FxHashMap::default();
        for (&label, state) in &graph.nodes {
            in_degree.insert(label, state.edges.input_node_edges.len() + state.edges.input_slot_edges.len());
        }

        let mut queue: VecDeque<NodeLabel> = in_degree.iter().filter(|(_, &d)| d == 0).map(|(&l, _)| l).collect();
        let mut produced: FxHashMap<(NodeLabel, usize), SlotValue> = FxHashMap::default();
        let mut pending_sub_graphs = Vec::new();
        let mut visited = 0usize;

        if let Some(input_label) = graph.input_node {
            for (i, value) in inputs.into_iter().enumerate() {
                produced.insert((input_label, i), value);
            }
        }

        while let Some(label) = queue.pop_front() {
            visited += 1;
            let state = &graph.nodes[label];

            let mut gathered = Vec::with_capacity(state.input_slots.len());
            for i in 0..state.input_slots.len() {
                let edge = state.edges.input_slot_edges.iter().find(|e| e.input_index == i).ok_or(EdgeError::SlotMissing)?;
                let value = produced.get(&(edge.output_node, edge.output_index)).cloned_from_slot()?;
                gathered.push(value);
            }

            let mut graph_ctx = GraphContext::new(&state.input_slots, gathered, state.output_slots.clone());
            state.node.run(&mut graph_ctx, render_ctx, world)?;

            for (i, value) in graph_ctx.outputs.into_iter().enumerate() {
                let value = value.ok_or(EdgeError::SlotMissing)?;
                produced.insert((label, i), value);
            }

            pending_sub_graphs.extend(graph_ctx.run_sub_graphs);

            for &succ in &state.edges.output_node_edges {
                let degree = in_degree.get_mut(succ).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(succ);
                }
            }
            for edge in &state.edges.output_slot_edges {
                let degree = in_degree.get_mut(&edge.input_node).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(edge.input_node);
                }
            }
        }

        if visited != graph.nodes.len() {
            return Err(GraphError::Cycle.into());
        }

        for sub in pending_sub_graphs {
            match graph.sub_graphs.get(sub.name) {
                Some(sub_graph) => Self::run_subgraph(sub_graph, device, world, render_ctx, sub.inputs, sub.view_entity)?,
                None => eprintln!("render graph: unknown sub-graph '{}', skipping", sub.name),
            }
        }

        Ok(())
    }
}

trait ClonedFromSlot {
    fn cloned_from_slot(self) -> Result<SlotValue>;
}

impl ClonedFromSlot for Option<&SlotValue> {
    fn cloned_from_slot(self) -> Result<SlotValue> {
        self.cloned().ok_or_else(|| EdgeError::SlotMissing.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ProducesBuffer;
    impl Node for ProducesBuffer {
        fn output_slots(&self) -> Vec<SlotInfo> {
            vec![SlotInfo::new("buf", SlotType::Buffer)]
        }
        fn run(&self, graph_ctx: &mut GraphContext, render_ctx: &mut RenderContext, _world: &World) -> Result<()> {
            render_ctx.push_command_list(CommandList { commands: vec!["A".into()] });
            graph_ctx.set_output("buf", SlotValue::Buffer(BufferHandle(1)))
        }
    }

    struct BufferToTexture;
    impl Node for BufferToTexture {
        fn input_slots(&self) -> Vec<SlotInfo> {
            vec![SlotInfo::new("buf", SlotType::Buffer)]
        }
        fn output_slots(&self) -> Vec<SlotInfo> {
            vec![SlotInfo::new("tex", SlotType::Texture)]
        }
        fn run(&self, graph_ctx: &mut GraphContext, render_ctx: &mut RenderContext, _world: &World) -> Result<()> {
            assert!(matches!(graph_ctx.input(0), Some(SlotValue::Buffer(_))));
            render_ctx.push_command_list(CommandList { commands: vec!["B".into()] });
            graph_ctx.set_output("tex", SlotValue::Texture(TextureHandle(2)))
        }
    }

    struct ConsumesTexture;
    impl Node for ConsumesTexture {
        fn input_slots(&self) -> Vec<SlotInfo> {
            vec![SlotInfo::new("tex", SlotType::Texture)]
        }
        fn run(&self, graph_ctx: &mut GraphContext, render_ctx: &mut RenderContext, _world: &World) -> Result<()> {
            assert!(matches!(graph_ctx.input(0), Some(SlotValue::Texture(_))));
            render_ctx.push_command_list(CommandList { commands: vec!["C".into()] });
            Ok(())
        }
    }

    fn build_abc_graph() -> RenderGraph {
        let mut graph = RenderGraph::new();
        graph.add_node("A", ProducesBuffer);
        graph.add_node("B", BufferToTexture);
        graph.add_node("C", ConsumesTexture);
        graph.add_slot_edge("A", "buf", "B", "buf").unwrap();
        graph.add_slot_edge("B", "tex", "C", "tex").unwrap();
        graph
    }

    #[test]
    fn runner_invokes_nodes_in_topological_order_and_submits() {
        let graph = build_abc_graph();
        let device = RecordingDevice::default();
        let world = World::new();

        for _ in 0..2 {
            RenderGraphRunner::run(&graph, &device, &world, Vec::new(), |list| list.push("flush")).unwrap();
        }

        let submitted = device.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 2);
        for batch in submitted.iter() {
            let commands: Vec<&str> = batch.iter().flat_map(|l| l.commands.iter()).map(|s| s.as_str()).collect();
            assert_eq!(commands, vec!["A", "B", "C", "flush"]);
        }
    }

    #[test]
    fn slot_type_mismatch_is_rejected() {
        let mut graph = RenderGraph::new();
        graph.add_node("A", ProducesBuffer);
        graph.add_node("C", ConsumesTexture);
        let err = graph.add_slot_edge("A", "buf", "C", "tex").unwrap_err();
        assert!(matches!(err, crate::error::EcsError::EdgeError(EdgeError::SlotTypeMismatch)));
    }

    #[test]
    fn input_slot_cannot_be_wired_twice() {
        let mut graph = RenderGraph::new();
        graph.add_node("A", ProducesBuffer);
        graph.add_node("A2", ProducesBuffer);
        graph.add_node("B", BufferToTexture);
        graph.add_slot_edge("A", "buf", "B", "buf").unwrap();
        let err = graph.add_slot_edge("A2", "buf", "B", "buf").unwrap_err();
        assert!(matches!(err, crate::error::EcsError::EdgeError(EdgeError::InputSlotOccupied)));
    }

    #[test]
    fn node_cannot_be_its_own_predecessor() {
        let mut graph = RenderGraph::new();
        graph.add_node("A", ProducesBuffer);
        let err = graph.add_node_edge("A", "A").unwrap_err();
        assert!(matches!(err, crate::error::EcsError::EdgeError(EdgeError::NodesMissing)));
    }
}
