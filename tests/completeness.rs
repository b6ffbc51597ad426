// tests/completeness.rs
// The "is this trace still accumulating data" signal.

mod common;

use common::{account, node, out_msg};
use trace_indexer::core::Trace;

#[test]
fn settled_tree_is_not_in_progress() {
    let mut root = node("root", account(1));
    let mut mid = node("mid", account(2));
    mid.children.push(node("leaf", account(3)));
    root.children.push(mid);
    root.children.push(node("leaf2", account(4)));

    assert!(!root.in_progress());
}

#[test]
fn unmatched_out_msg_anywhere_marks_in_progress() {
    // on the root itself
    let mut root = node("root", account(1));
    root.transaction.out_msgs.push(out_msg(account(9)));
    assert!(root.in_progress());

    // buried in a grandchild
    let mut root = node("root", account(1));
    let mut mid = node("mid", account(2));
    let mut leaf = node("leaf", account(3));
    leaf.transaction.out_msgs.push(out_msg(account(9)));
    mid.children.push(leaf);
    root.children.push(mid);
    assert!(root.in_progress());
}

#[test]
fn clearing_every_unmatched_msg_settles_the_trace() {
    let mut root = node("root", account(1));
    root.transaction.out_msgs.push(out_msg(account(9)));
    let mut child = node("child", account(2));
    child.transaction.out_msgs.push(out_msg(account(9)));
    child.transaction.out_msgs.push(out_msg(account(8)));
    root.children.push(child);

    assert!(root.in_progress());

    // removing some but not all unmatched messages keeps it in progress
    root.transaction.out_msgs.clear();
    assert!(root.in_progress());

    root.children[0].transaction.out_msgs.clear();
    assert!(!root.in_progress());
}

#[test]
fn visit_is_preorder_and_visits_every_node_once() {
    let mut root = node("root", account(1));
    let mut a = node("a", account(2));
    a.children.push(node("c", account(3)));
    root.children.push(a);
    root.children.push(node("b", account(4)));

    let mut order = Vec::new();
    root.visit(|n| order.push(n.transaction.hash.clone()));
    assert_eq!(order, vec!["root", "a", "c", "b"]);
}

#[test]
fn deep_chains_do_not_overflow_the_stack() {
    const DEPTH: usize = 50_000;

    let mut trace = node("leaf", account(1));
    for i in 0..DEPTH {
        let mut parent = node(&format!("n{}", i), account(1));
        parent.children.push(trace);
        trace = parent;
    }

    let mut visited = 0usize;
    trace.visit(|_| visited += 1);
    assert_eq!(visited, DEPTH + 1);
    assert!(!trace.in_progress());

    // dismantle iteratively; the compiler-generated drop glue recurses
    let mut stack: Vec<Trace> = vec![trace];
    while let Some(mut n) = stack.pop() {
        stack.extend(n.children.drain(..));
    }
}
