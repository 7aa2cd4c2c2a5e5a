//! Fixture analyses for exercising the fixpoint engine in tests.
//!
//! Nothing in here is engine logic; each module pairs a small lattice with one
//! or two analyses shaped like the real clients of the store: lazy string
//! analyses with chained dependencies, a graph reachability fixed point,
//! purity over cyclic call graphs, and an incremental tree walk.

mod palindrome;
mod purity;
mod reachability;
mod tree;

pub use self::{
    palindrome::{
        Palindromeness, SuperPalindromeness, palindrome_analysis, register_palindrome_kinds,
        super_palindrome_analysis, text,
    },
    purity::{CallGraph, Purity, purity_analysis},
    reachability::{
        NodeGraph, ReachableNodes, ReachableNodesCount, TOO_MANY_NODES_REACHABLE, node,
        reachable_nodes_analysis, reachable_nodes_count_analysis,
    },
    tree::{Tree, TreeLevel, tree_level_analysis},
};
