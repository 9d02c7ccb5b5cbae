//! Graphviz rendering of module connectivity.

use std::collections::BTreeSet;
use std::fmt::Write;

const HEADER: &str = "digraph perceiver {\n    rankdir=LR;\n    node [shape=box];\n";

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render `(responder, sender)` pairs as a DOT digraph with one
/// `responder -> sender` edge per pair.
pub fn to_dot(edges: &BTreeSet<(String, String)>) -> String {
    let mut out = String::from(HEADER);
    for (responder, sender) in edges {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "    {} -> {};", quote(responder), quote(sender));
    }
    out.push_str("}\n");
    out
}
