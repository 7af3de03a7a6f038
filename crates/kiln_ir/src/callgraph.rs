//! Static call graph over functions and entry points.

use crate::program::Program;
use crate::stmt::callees;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;

/// Directed caller-to-callee graph keyed by declaration name.
///
/// Calls to names that are not declared functions are left out; reporting
/// them is [`Program::validate`]'s job.
pub struct CallGraph<'p> {
    graph: DiGraphMap<&'p str, ()>,
}

impl<'p> CallGraph<'p> {
    /// Builds the call graph of `program`.
    pub fn build(program: &'p Program) -> Self {
        let mut graph = DiGraphMap::new();
        for function in &program.functions {
            graph.add_node(function.name.as_str());
        }
        for entry in &program.entry_points {
            graph.add_node(entry.name.as_str());
        }
        let bodies = program
            .functions
            .iter()
            .map(|f| (f.name.as_str(), f.body.as_slice()))
            .chain(
                program
                    .entry_points
                    .iter()
                    .map(|e| (e.name.as_str(), e.body.as_slice())),
            );
        for (caller, body) in bodies {
            for callee in callees(body) {
                if let Some(function) = program.function(&callee) {
                    graph.add_edge(caller, function.name.as_str(), ());
                }
            }
        }
        Self { graph }
    }

    /// Returns a function that participates in a cycle, if there is one.
    pub fn find_cycle(&self) -> Option<&'p str> {
        if let Some((node, _, _)) = self.graph.all_edges().find(|(a, b, _)| a == b) {
            return Some(node);
        }
        toposort(&self.graph, None).err().map(|cycle| cycle.node_id())
    }

    /// Returns every declaration reachable from `root`, `root` included, in
    /// depth-first order. Empty if `root` is not in the graph.
    pub fn reachable(&self, root: &str) -> Vec<&'p str> {
        let Some(start) = self.graph.nodes().find(|n| *n == root) else {
            return Vec::new();
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut out = Vec::new();
        while let Some(node) = dfs.next(&self.graph) {
            out.push(node);
        }
        out
    }
}
