//! End-to-end adds on healthy clusters: roots, wrapping, pins, determinism.

use std::collections::BTreeMap;

use cairn_dag::reader;
use cairn_types::{AddState, Layout, Node};
use tokio::sync::mpsc;

use crate::adder::Adder;
use crate::entry::{Entry, MemoryEntries};

use super::helpers::{add, all_blocks, assert_replicated, cluster, params, sample_tree, test_data};

// -----------------------------------------------------------------------
// Reference scenarios
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_single_empty_file_is_empty_leaf() {
    let cluster = cluster(3);
    let summary = add(&cluster, params(1, 1), vec![Entry::file("empty.txt", Vec::new())])
        .await
        .unwrap();

    assert_eq!(summary.root, Node::empty_leaf().cid().unwrap());
    assert_eq!(summary.pin.allocations.len(), 1);

    let pins = cluster.pins().await;
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].cid, summary.root);
    assert_eq!(pins[0].allocations, vec![cluster.peers()[0]]);
    assert_replicated(&cluster, &summary.root, 1).await;
}

#[tokio::test]
async fn test_three_files_balanced_width_two_single_peer() {
    let cluster = cluster(1);
    let peer = cluster.peers()[0];
    let params = cairn_types::AddParams {
        chunk_size: 4,
        layout: Layout::Balanced { width: 2 },
        ..params(1, 1)
    };
    let entries = vec![
        Entry::dir("d"),
        Entry::file("d/a", test_data(16)),
        Entry::file("d/b", test_data(15)),
        Entry::file("d/c", test_data(13)),
    ];

    let summary = add(&cluster, params, entries).await.unwrap();

    let blocks = all_blocks(&cluster).await;
    let links = match blocks[&summary.root].node().unwrap() {
        Node::Directory { links } => links,
        other => panic!("expected directory root, got {other:?}"),
    };
    let names: Vec<&str> = links.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    for link in &links {
        // Four leaves under width 2 sit two levels below the file root.
        assert_eq!(reader::file_depth(&blocks, &link.cid).unwrap(), 2);
    }

    let reachable = reader::reachable(&blocks, &summary.root).unwrap();
    for cid in &reachable {
        assert!(cluster.has_block(&peer, cid).await);
    }
    assert_eq!(cluster.stats(&peer).await.stored, summary.report.blocks);
    assert_eq!(summary.report.acks[&peer], summary.report.blocks);
}

// -----------------------------------------------------------------------
// Wrapping
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_single_top_level_directory_is_root() {
    let cluster = cluster(2);
    let summary = add(&cluster, params(1, 2), sample_tree()).await.unwrap();

    let blocks = all_blocks(&cluster).await;
    let listed: Vec<String> = reader::list(&blocks, &summary.root)
        .unwrap()
        .into_iter()
        .map(|l| l.name)
        .collect();
    assert_eq!(listed, vec!["readme.md", "img", "notes.txt"]);
}

#[tokio::test]
async fn test_wrap_adds_enclosing_directory() {
    let cluster = cluster(1);
    let params = cairn_types::AddParams {
        wrap: true,
        ..params(1, 1)
    };
    let summary = add(&cluster, params, vec![Entry::file("a.txt", b"hi".to_vec())])
        .await
        .unwrap();

    let blocks = all_blocks(&cluster).await;
    let a = reader::lookup(&blocks, &summary.root, "a.txt").unwrap().unwrap();
    assert_eq!(a.cid, Node::Raw(b"hi".to_vec()).cid().unwrap());
}

#[tokio::test]
async fn test_several_top_level_entries_are_wrapped() {
    let cluster = cluster(1);
    let entries = vec![
        Entry::file("one", b"1".to_vec()),
        Entry::file("two", b"2".to_vec()),
    ];
    let summary = add(&cluster, params(1, 1), entries).await.unwrap();

    let blocks = all_blocks(&cluster).await;
    assert_eq!(reader::list(&blocks, &summary.root).unwrap().len(), 2);
}

#[tokio::test]
async fn test_empty_stream_is_empty_directory() {
    let cluster = cluster(1);
    let summary = add(&cluster, params(1, 1), Vec::new()).await.unwrap();
    assert_eq!(summary.root, Node::empty_directory().cid().unwrap());
    assert_eq!(cluster.pins().await.len(), 1);
}

// -----------------------------------------------------------------------
// Content and determinism
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_content_reads_back() {
    let cluster = cluster(2);
    let summary = add(&cluster, params(2, 2), sample_tree()).await.unwrap();

    let blocks = all_blocks(&cluster).await;
    let logo = reader::resolve(&blocks, &summary.root, "img/logo.png")
        .unwrap()
        .unwrap();
    assert_eq!(reader::read_file(&blocks, &logo.cid).unwrap(), test_data(1000));
    assert_replicated(&cluster, &summary.root, 2).await;
}

#[tokio::test]
async fn test_same_input_same_root() {
    let first = add(&cluster(1), params(1, 1), sample_tree()).await.unwrap();
    let second = add(&cluster(3), params(1, 3), sample_tree()).await.unwrap();
    assert_eq!(first.root, second.root);
    assert_eq!(first.size, second.size);
}

#[tokio::test]
async fn test_different_chunk_size_changes_root() {
    let a = add(&cluster(1), params(1, 1), sample_tree()).await.unwrap();
    let b = add(
        &cluster(1),
        cairn_types::AddParams {
            chunk_size: 128,
            ..params(1, 1)
        },
        sample_tree(),
    )
    .await
    .unwrap();
    assert_ne!(a.root, b.root);
}

// -----------------------------------------------------------------------
// Pin, state and progress
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_pin_carries_name_and_metadata() {
    let cluster = cluster(3);
    let params = cairn_types::AddParams {
        name: "backup".into(),
        metadata: BTreeMap::from([("owner".to_string(), "ops".to_string())]),
        ..params(2, 3)
    };
    let summary = add(&cluster, params, sample_tree()).await.unwrap();

    let pin = &cluster.pins().await[0];
    assert_eq!(pin, &summary.pin);
    assert_eq!(pin.name, "backup");
    assert_eq!(pin.metadata["owner"], "ops");
    assert_eq!(pin.replication_factor_min, 2);
    assert_eq!(pin.replication_factor_max, 3);
    assert_eq!(pin.allocations, cluster.peers().to_vec());
}

#[tokio::test]
async fn test_state_ends_pinned() {
    let cluster = cluster(1);
    let adder = Adder::new(cluster.clone(), params(1, 1));
    let state = adder.subscribe_state();
    assert_eq!(adder.state(), AddState::Started);

    adder.add(MemoryEntries::new(sample_tree())).await.unwrap();
    assert_eq!(*state.borrow(), AddState::Pinned);
}

#[tokio::test]
async fn test_outputs_follow_finalisation_order() {
    let cluster = cluster(1);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let summary = Adder::new(cluster.clone(), params(1, 1))
        .with_outputs(tx)
        .add(MemoryEntries::new(sample_tree()))
        .await
        .unwrap();

    let mut names = Vec::new();
    let mut last = None;
    while let Some(output) = rx.recv().await {
        names.push(output.name.clone());
        last = Some(output);
    }
    assert_eq!(
        names,
        vec![
            "docs/readme.md",
            "docs/img/logo.png",
            "docs/img",
            "docs/notes.txt",
            "docs",
        ]
    );
    let last = last.unwrap();
    assert_eq!(last.cid, summary.root);
    assert_eq!(last.size, summary.size);
}
