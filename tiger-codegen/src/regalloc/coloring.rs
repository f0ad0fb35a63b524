//! Interference-graph coloring with iterated coalescing.
//!
//! One run over a procedure builds the interference graph from liveness,
//! then alternates simplify / coalesce / freeze / potential-spill until the
//! graph is empty, and finally assigns colors off the selection stack.
//! Nodes that can't be colored are reported as actual spills; the caller
//! rewrites the program and runs again.
//!
//! Physical registers take part as precolored nodes with infinite degree:
//! never simplified, never spilled, never coalesced away. But a virtual
//! node may be coalesced *into* one when George's test says it is safe, and
//! Briggs's test covers virtual-virtual pairs.

use crate::inst::Inst;
use crate::isa::TargetIsa;
use crate::regalloc::liveness::Liveness;
use crate::temp::Temp;
use rustc_hash::{FxHashMap, FxHashSet};
use tiger_entity::{EntityRef, SecondaryMap};

/// The outcome of one coloring attempt.
pub(crate) struct ColorResult {
    /// Color (physical-register temp) for every node that got one; total
    /// when `spills` is empty.
    pub colors: FxHashMap<Temp, Temp>,
    /// Actual spills, by ascending temp id.
    pub spills: Vec<Temp>,
}

/// Color the interference graph of `insts`.
pub(crate) fn color(insts: &[Inst], liveness: &Liveness, isa: &dyn TargetIsa) -> ColorResult {
    let mut allocator = Allocator::new(insts, liveness, isa);
    allocator.run();
    allocator.finish()
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum NodeState {
    Precolored,
    Initial,
    Simplify,
    Freeze,
    Spill,
    Stack,
    Coalesced,
    Colored,
    Spilled,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum MoveState {
    Worklist,
    Active,
    Coalesced,
    Constrained,
    Frozen,
}

struct Allocator<'a> {
    k: usize,
    num_physical: usize,
    allocatable: &'a [Temp],

    state: FxHashMap<Temp, NodeState>,
    initial: Vec<Temp>,
    simplify_wl: Vec<Temp>,
    freeze_wl: Vec<Temp>,
    spill_wl: Vec<Temp>,
    select_stack: Vec<Temp>,
    coalesced_nodes: Vec<Temp>,
    spilled_nodes: Vec<Temp>,

    adj_set: FxHashSet<(Temp, Temp)>,
    adj_list: FxHashMap<Temp, Vec<Temp>>,
    degree: SecondaryMap<Temp, usize>,
    occurrences: SecondaryMap<Temp, usize>,

    moves: Vec<(Temp, Temp)>,
    move_state: Vec<MoveState>,
    move_list: FxHashMap<Temp, Vec<usize>>,
    worklist_moves: Vec<usize>,

    alias: FxHashMap<Temp, Temp>,
    color: FxHashMap<Temp, Temp>,
}

impl<'a> Allocator<'a> {
    fn new(insts: &[Inst], liveness: &Liveness, isa: &'a dyn TargetIsa) -> Self {
        let mut this = Allocator {
            k: isa.allocatable().len(),
            num_physical: isa.register_info().len(),
            allocatable: isa.allocatable(),
            state: FxHashMap::default(),
            initial: Vec::new(),
            simplify_wl: Vec::new(),
            freeze_wl: Vec::new(),
            spill_wl: Vec::new(),
            select_stack: Vec::new(),
            coalesced_nodes: Vec::new(),
            spilled_nodes: Vec::new(),
            adj_set: FxHashSet::default(),
            adj_list: FxHashMap::default(),
            degree: SecondaryMap::new(),
            occurrences: SecondaryMap::new(),
            moves: Vec::new(),
            move_state: Vec::new(),
            move_list: FxHashMap::default(),
            worklist_moves: Vec::new(),
            alias: FxHashMap::default(),
            color: FxHashMap::default(),
        };
        this.build(insts, liveness);
        this
    }

    fn build(&mut self, insts: &[Inst], liveness: &Liveness) {
        for inst in insts {
            for &t in inst.defs().iter().chain(inst.uses()) {
                self.touch(t);
                self.occurrences[t] += 1;
            }
        }

        for (i, inst) in insts.iter().enumerate() {
            let mut live: FxHashSet<Temp> = liveness.live_out(i).clone();
            if let Inst::Move { dst, src, .. } = inst {
                // The copy's source does not conflict with its
                // destination here; that is the coalescing opportunity.
                live.remove(src);
                let m = self.moves.len();
                self.moves.push((*dst, *src));
                self.move_state.push(MoveState::Worklist);
                self.move_list.entry(*dst).or_default().push(m);
                if dst != src {
                    self.move_list.entry(*src).or_default().push(m);
                }
                self.worklist_moves.push(m);
            }
            for &d in inst.defs() {
                for &l in &live {
                    self.add_edge(l, d);
                }
            }
        }
    }

    fn touch(&mut self, t: Temp) {
        if self.state.contains_key(&t) {
            return;
        }
        if self.is_precolored(t) {
            self.state.insert(t, NodeState::Precolored);
            self.color.insert(t, t);
        } else {
            self.state.insert(t, NodeState::Initial);
            self.initial.push(t);
        }
    }

    fn is_precolored(&self, t: Temp) -> bool {
        t.index() < self.num_physical
    }

    fn node_degree(&self, t: Temp) -> usize {
        if self.is_precolored(t) {
            usize::MAX
        } else {
            self.degree[t]
        }
    }

    fn add_edge(&mut self, u: Temp, v: Temp) {
        if u == v || self.adj_set.contains(&(u, v)) {
            return;
        }
        self.adj_set.insert((u, v));
        self.adj_set.insert((v, u));
        if !self.is_precolored(u) {
            self.adj_list.entry(u).or_default().push(v);
            self.degree[u] += 1;
        }
        if !self.is_precolored(v) {
            self.adj_list.entry(v).or_default().push(u);
            self.degree[v] += 1;
        }
    }

    /// Neighbors of `n` still in the graph.
    fn adjacent(&self, n: Temp) -> Vec<Temp> {
        match self.adj_list.get(&n) {
            Some(list) => list
                .iter()
                .copied()
                .filter(|t| {
                    !matches!(self.state[t], NodeState::Stack | NodeState::Coalesced)
                })
                .collect(),
            None => Vec::new(),
        }
    }

    fn node_moves(&self, n: Temp) -> Vec<usize> {
        match self.move_list.get(&n) {
            Some(list) => list
                .iter()
                .copied()
                .filter(|&m| {
                    matches!(self.move_state[m], MoveState::Worklist | MoveState::Active)
                })
                .collect(),
            None => Vec::new(),
        }
    }

    fn move_related(&self, n: Temp) -> bool {
        !self.node_moves(n).is_empty()
    }

    fn run(&mut self) {
        self.make_worklist();
        loop {
            if !self.simplify_wl.is_empty() {
                self.simplify();
            } else if !self.worklist_moves.is_empty() {
                self.coalesce();
            } else if !self.freeze_wl.is_empty() {
                self.freeze();
            } else if !self.spill_wl.is_empty() {
                self.select_spill();
            } else {
                break;
            }
        }
        self.assign_colors();
    }

    fn make_worklist(&mut self) {
        for n in std::mem::take(&mut self.initial) {
            if self.degree[n] >= self.k {
                self.state.insert(n, NodeState::Spill);
                self.spill_wl.push(n);
            } else if self.move_related(n) {
                self.state.insert(n, NodeState::Freeze);
                self.freeze_wl.push(n);
            } else {
                self.state.insert(n, NodeState::Simplify);
                self.simplify_wl.push(n);
            }
        }
    }

    fn simplify(&mut self) {
        let n = self.simplify_wl.pop().expect("empty simplify worklist");
        self.state.insert(n, NodeState::Stack);
        self.select_stack.push(n);
        for m in self.adjacent(n) {
            self.decrement_degree(m);
        }
    }

    fn decrement_degree(&mut self, m: Temp) {
        if self.is_precolored(m) {
            return;
        }
        let d = self.degree[m];
        self.degree[m] = d - 1;
        if d == self.k {
            let mut nodes = self.adjacent(m);
            nodes.push(m);
            self.enable_moves(&nodes);
            // A node can sit at degree k transiently while `combine` is
            // rebuilding edges; only a spill-worklist node changes lists.
            if self.state[&m] == NodeState::Spill {
                remove_node(&mut self.spill_wl, m);
                if self.move_related(m) {
                    self.state.insert(m, NodeState::Freeze);
                    self.freeze_wl.push(m);
                } else {
                    self.state.insert(m, NodeState::Simplify);
                    self.simplify_wl.push(m);
                }
            }
        }
    }

    fn enable_moves(&mut self, nodes: &[Temp]) {
        for &n in nodes {
            for m in self.node_moves(n) {
                if self.move_state[m] == MoveState::Active {
                    self.move_state[m] = MoveState::Worklist;
                    self.worklist_moves.push(m);
                }
            }
        }
    }

    fn get_alias(&self, n: Temp) -> Temp {
        let mut n = n;
        while self.state[&n] == NodeState::Coalesced {
            n = self.alias[&n];
        }
        n
    }

    fn coalesce(&mut self) {
        let m = self.worklist_moves.pop().expect("empty move worklist");
        if self.move_state[m] != MoveState::Worklist {
            return;
        }
        let (x, y) = self.moves[m];
        let x = self.get_alias(x);
        let y = self.get_alias(y);
        let (u, v) = if self.is_precolored(y) { (y, x) } else { (x, y) };

        if u == v {
            self.move_state[m] = MoveState::Coalesced;
            self.add_work_list(u);
        } else if self.is_precolored(v) || self.adj_set.contains(&(u, v)) {
            self.move_state[m] = MoveState::Constrained;
            self.add_work_list(u);
            self.add_work_list(v);
        } else if (self.is_precolored(u) && self.adjacent(v).iter().all(|&t| self.george(t, u)))
            || (!self.is_precolored(u) && self.briggs(u, v))
        {
            self.move_state[m] = MoveState::Coalesced;
            self.combine(u, v);
            self.add_work_list(u);
        } else {
            self.move_state[m] = MoveState::Active;
        }
    }

    /// George: `t` already tolerates `u`: it is insignificant, precolored,
    /// or interferes with `u` anyway.
    fn george(&self, t: Temp, u: Temp) -> bool {
        self.is_precolored(t) || self.degree[t] < self.k || self.adj_set.contains(&(t, u))
    }

    /// Briggs: the combined node would have fewer than `k` significant
    /// neighbors.
    fn briggs(&self, u: Temp, v: Temp) -> bool {
        let mut nodes: FxHashSet<Temp> = self.adjacent(u).into_iter().collect();
        nodes.extend(self.adjacent(v));
        let significant = nodes
            .iter()
            .filter(|&&n| self.node_degree(n) >= self.k)
            .count();
        significant < self.k
    }

    fn add_work_list(&mut self, u: Temp) {
        if !self.is_precolored(u)
            && !self.move_related(u)
            && self.degree[u] < self.k
            && self.state[&u] == NodeState::Freeze
        {
            remove_node(&mut self.freeze_wl, u);
            self.state.insert(u, NodeState::Simplify);
            self.simplify_wl.push(u);
        }
    }

    fn combine(&mut self, u: Temp, v: Temp) {
        match self.state[&v] {
            NodeState::Freeze => remove_node(&mut self.freeze_wl, v),
            NodeState::Spill => remove_node(&mut self.spill_wl, v),
            s => unreachable!("coalescing node {} in state {:?}", v, s),
        }
        self.state.insert(v, NodeState::Coalesced);
        self.coalesced_nodes.push(v);
        self.alias.insert(v, u);
        let v_moves = self.move_list.get(&v).cloned().unwrap_or_default();
        self.move_list.entry(u).or_default().extend(v_moves);
        self.enable_moves(&[v]);
        for t in self.adjacent(v) {
            self.add_edge(t, u);
            self.decrement_degree(t);
        }
        if self.node_degree(u) >= self.k && self.state[&u] == NodeState::Freeze {
            remove_node(&mut self.freeze_wl, u);
            self.state.insert(u, NodeState::Spill);
            self.spill_wl.push(u);
        }
    }

    fn freeze(&mut self) {
        // Lowest id first keeps the output deterministic.
        let u = *self
            .freeze_wl
            .iter()
            .min()
            .expect("empty freeze worklist");
        remove_node(&mut self.freeze_wl, u);
        self.state.insert(u, NodeState::Simplify);
        self.simplify_wl.push(u);
        self.freeze_moves(u);
    }

    fn freeze_moves(&mut self, u: Temp) {
        for m in self.node_moves(u) {
            let (x, y) = self.moves[m];
            let v = if self.get_alias(y) == self.get_alias(u) {
                self.get_alias(x)
            } else {
                self.get_alias(y)
            };
            self.move_state[m] = MoveState::Frozen;
            if self.state.get(&v) == Some(&NodeState::Freeze) && !self.move_related(v) {
                remove_node(&mut self.freeze_wl, v);
                self.state.insert(v, NodeState::Simplify);
                self.simplify_wl.push(v);
            }
        }
    }

    fn select_spill(&mut self) {
        // Spill metric: degree over occurrence count (loop depth is taken
        // as 1). Highest metric spills; ties fall to the lowest temp id.
        let mut best: Option<(Temp, f64)> = None;
        for &n in &self.spill_wl {
            let metric = self.degree[n] as f64 / self.occurrences[n] as f64;
            let better = match best {
                None => true,
                Some((b, m)) => metric > m || (metric == m && n.index() < b.index()),
            };
            if better {
                best = Some((n, metric));
            }
        }
        let (n, _) = best.expect("empty spill worklist");
        remove_node(&mut self.spill_wl, n);
        self.state.insert(n, NodeState::Simplify);
        self.simplify_wl.push(n);
        self.freeze_moves(n);
    }

    fn assign_colors(&mut self) {
        while let Some(n) = self.select_stack.pop() {
            let mut ok_colors: Vec<Temp> = self.allocatable.to_vec();
            if let Some(neighbors) = self.adj_list.get(&n) {
                for &w in neighbors {
                    let w = self.get_alias(w);
                    if matches!(
                        self.state[&w],
                        NodeState::Colored | NodeState::Precolored
                    ) {
                        let c = self.color[&w];
                        ok_colors.retain(|&x| x != c);
                    }
                }
            }
            match ok_colors.first() {
                Some(&c) => {
                    self.state.insert(n, NodeState::Colored);
                    self.color.insert(n, c);
                }
                None => {
                    self.state.insert(n, NodeState::Spilled);
                    self.spilled_nodes.push(n);
                }
            }
        }
        if self.spilled_nodes.is_empty() {
            let coalesced = self.coalesced_nodes.clone();
            for n in coalesced {
                let c = self.color[&self.get_alias(n)];
                self.color.insert(n, c);
            }
        }
    }

    fn finish(self) -> ColorResult {
        let mut spills = self.spilled_nodes;
        spills.sort();
        ColorResult {
            colors: self.color,
            spills,
        }
    }
}

fn remove_node(list: &mut Vec<Temp>, t: Temp) {
    if let Some(pos) = list.iter().position(|&x| x == t) {
        list.swap_remove(pos);
    }
}
