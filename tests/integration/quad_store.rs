//! End-to-end behaviour of the quad store: registration, deletion, pattern
//! lookups and transaction rollback.

#![allow(missing_docs)]

use quadstore::{
    Dim, Node, Quad, QuadError, QuadPattern, QuadStore, Result, StoreOptions, Triple, TxnMode,
    TxnType, DEFAULT_GRAPH_IRI,
};

fn iri(name: &str) -> Node {
    Node::iri(format!("http://example.org/{name}"))
}

fn quad(g: &str, s: &str, p: &str, o: &str) -> Quad {
    Quad::new(iri(g), iri(s), iri(p), iri(o))
}

fn open() -> Result<QuadStore> {
    QuadStore::open(StoreOptions::default())
}

fn collect(store: &QuadStore, pattern: &QuadPattern) -> Result<Vec<Quad>> {
    let txn = store.txn();
    store.find(&txn, pattern)?.collect()
}

#[test]
fn registered_quad_is_found_by_its_full_pattern() -> Result<()> {
    let store = open()?;
    let q = quad("g1", "s1", "p1", "o1");
    let mut txn = store.txn();
    let reg = store.register(&mut txn, &q)?;
    assert!(!reg.existed);
    assert!(store.register(&mut txn, &q)?.existed);

    assert_eq!(collect(&store, &QuadPattern::from(&q))?, vec![q.clone()]);
    assert!(store.contains(&txn, &q)?);
    assert_eq!(store.size(&txn)?, 1);
    Ok(())
}

#[test]
fn deleted_quad_is_gone() -> Result<()> {
    let store = open()?;
    let q = quad("g1", "s1", "p1", "o1");
    let mut txn = store.txn();
    store.register(&mut txn, &q)?;
    assert!(store.delete(&mut txn, &q)?);
    assert!(!store.delete(&mut txn, &q)?);

    assert!(collect(&store, &QuadPattern::from(&q))?.is_empty());
    assert!(!store.contains(&txn, &q)?);
    assert_eq!(store.size(&txn)?, 0);
    Ok(())
}

#[test]
fn wildcard_scan_returns_every_quad_once_in_id_order() -> Result<()> {
    let store = open()?;
    let quads: Vec<Quad> = (0..50)
        .map(|i| quad("g", &format!("s{}", i % 7), "p", &format!("o{i}")))
        .collect();
    let mut txn = store.begin(TxnType::Write)?;
    let mut ids = Vec::new();
    for q in &quads {
        ids.push(store.register(&mut txn, q)?.id);
    }
    txn.commit()?;
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

    let found = collect(&store, &QuadPattern::any())?;
    assert_eq!(found, quads);
    Ok(())
}

#[test]
fn shared_prefix_scenario() -> Result<()> {
    let store = open()?;
    let first = quad("g1", "s1", "p1", "o1");
    let second = quad("g1", "s1", "p1", "o2");
    let mut txn = store.txn();
    store.register(&mut txn, &first)?;
    store.register(&mut txn, &second)?;

    let prefix = QuadPattern::any()
        .graph(iri("g1"))
        .subject(iri("s1"))
        .predicate(iri("p1"));
    assert_eq!(collect(&store, &prefix)?, vec![first.clone(), second.clone()]);
    assert_eq!(
        collect(&store, &QuadPattern::any().object(iri("o1")))?,
        vec![first.clone()]
    );

    store.delete(&mut txn, &first)?;
    assert_eq!(collect(&store, &prefix)?, vec![second]);
    assert!(collect(&store, &QuadPattern::any().object(iri("o1")))?.is_empty());
    Ok(())
}

#[test]
fn bulk_load_sharing_graph_subject_and_predicate() -> Result<()> {
    const N: usize = 10_000;
    let store = open()?;
    let mut txn = store.begin(TxnType::Write)?;
    for i in 0..N {
        store.register(&mut txn, &quad("g", "s", "p", &format!("o{i}")))?;
    }
    txn.commit()?;

    let reader = store.txn();
    assert_eq!(store.size(&reader)?, N as u64);
    let shared = QuadPattern::any()
        .graph(iri("g"))
        .subject(iri("s"))
        .predicate(iri("p"));
    let found = store.find(&reader, &shared)?;
    assert_eq!(found.remaining(), N as u64);
    assert_eq!(found.count(), N);
    assert_eq!(
        collect(&store, &shared.object(iri("o9999")))?,
        vec![quad("g", "s", "p", "o9999")]
    );
    Ok(())
}

#[test]
fn unknown_terms_and_unused_positions_both_match_nothing() -> Result<()> {
    let store = open()?;
    let mut txn = store.txn();
    store.register(&mut txn, &quad("g", "s", "p", "o"))?;

    // Never registered anywhere.
    let unknown = QuadPattern::any().subject(iri("nobody"));
    assert!(collect(&store, &unknown)?.is_empty());

    // Registered, but only ever used as a subject.
    let misplaced = QuadPattern::any().object(iri("s"));
    assert!(collect(&store, &misplaced)?.is_empty());

    // A bound position that matches must not rescue a non-matching one.
    let mixed = QuadPattern::any().graph(iri("g")).object(iri("s"));
    assert!(collect(&store, &mixed)?.is_empty());
    Ok(())
}

#[test]
fn triples_live_in_the_default_graph() -> Result<()> {
    let store = open()?;
    let triple = Triple::new(iri("alice"), iri("knows"), Node::lang_literal("Bob", "en"));
    let mut txn = store.txn();
    store.register_triple(&mut txn, triple.clone())?;
    store.register(&mut txn, &quad("elsewhere", "alice", "knows", "carol"))?;

    let txn = store.txn();
    let in_default: Vec<Triple> = store
        .find_triples(&txn, Some(iri("alice")), None, None)?
        .collect::<Result<_>>()?;
    assert_eq!(in_default, vec![triple.clone()]);

    let as_quads = collect(&store, &QuadPattern::any().graph(Node::iri(DEFAULT_GRAPH_IRI)))?;
    assert_eq!(as_quads, vec![store.as_quad(triple)]);
    Ok(())
}

#[test]
fn custom_default_graph() -> Result<()> {
    let store = QuadStore::open(StoreOptions::new().default_graph("urn:graph:main"))?;
    let mut txn = store.txn();
    let triple = Triple::new(iri("s"), iri("p"), Node::literal("o"));
    store.register_triple(&mut txn, triple.clone())?;
    assert_eq!(
        store.list_nodes(&txn, Dim::Graph)?,
        vec![Node::iri("urn:graph:main")]
    );
    assert!(store.delete_triple(&mut txn, triple)?);
    assert_eq!(store.size(&txn)?, 0);
    Ok(())
}

#[test]
fn list_nodes_tracks_live_terms() -> Result<()> {
    let store = open()?;
    let mut txn = store.txn();
    store.register(&mut txn, &quad("g1", "s1", "p1", "o1"))?;
    store.register(&mut txn, &quad("g2", "s1", "p2", "o2"))?;
    assert_eq!(store.list_nodes(&txn, Dim::Graph)?, vec![iri("g1"), iri("g2")]);
    assert_eq!(store.list_nodes(&txn, Dim::Subject)?, vec![iri("s1")]);

    store.delete(&mut txn, &quad("g1", "s1", "p1", "o1"))?;
    assert_eq!(store.list_nodes(&txn, Dim::Graph)?, vec![iri("g2")]);
    assert_eq!(store.list_nodes(&txn, Dim::Predicate)?, vec![iri("p2")]);
    Ok(())
}

#[test]
fn unused_terms_are_reclaimed_and_their_ids_reused() -> Result<()> {
    let store = open()?;
    let mut txn = store.txn();
    store.register(&mut txn, &quad("g", "s", "p", "o1"))?;
    store.register(&mut txn, &quad("g", "s", "p", "o2"))?;
    assert_eq!(store.term_count(&txn)?, 5);

    store.delete(&mut txn, &quad("g", "s", "p", "o1"))?;
    assert_eq!(store.term_count(&txn)?, 4);

    // The freed term id and quad id are handed out again.
    let reg = store.register(&mut txn, &quad("g", "s", "p", "o3"))?;
    assert_eq!(reg.id.0, 0);
    assert_eq!(store.term_count(&txn)?, 5);
    assert_eq!(
        collect(&store, &QuadPattern::any().subject(iri("s")))?,
        vec![quad("g", "s", "p", "o3"), quad("g", "s", "p", "o2")]
    );
    Ok(())
}

#[test]
fn terms_survive_while_any_position_uses_them() -> Result<()> {
    let store = open()?;
    let mut txn = store.txn();
    // "x" is a subject in one quad and an object in the other.
    store.register(&mut txn, &quad("g", "x", "p", "y"))?;
    store.register(&mut txn, &quad("g", "y", "p", "x"))?;
    store.delete(&mut txn, &quad("g", "x", "p", "y"))?;
    assert_eq!(store.term_count(&txn)?, 4);
    assert_eq!(
        collect(&store, &QuadPattern::any().object(iri("x")))?,
        vec![quad("g", "y", "p", "x")]
    );
    Ok(())
}

#[test]
fn abort_restores_the_previous_state() -> Result<()> {
    let store = open()?;
    let keep = quad("g", "s", "p", "keep");
    let mut txn = store.txn();
    store.register(&mut txn, &keep)?;
    let generation = store.generation();

    txn.begin(TxnType::Write)?;
    store.register(&mut txn, &quad("g", "s", "p", "new"))?;
    store.delete(&mut txn, &keep)?;
    assert_eq!(store.size(&txn)?, 1);
    assert!(!store.contains(&txn, &keep)?);
    txn.abort()?;

    assert_eq!(store.generation(), generation);
    assert_eq!(collect(&store, &QuadPattern::any())?, vec![keep]);
    assert_eq!(store.term_count(&txn)?, 4);
    Ok(())
}

#[test]
fn failed_operations_roll_back_the_implicit_transaction() -> Result<()> {
    let store = QuadStore::open(StoreOptions::new().max_quad_id(1))?;
    let mut txn = store.txn();
    store.register(&mut txn, &quad("g", "s", "p", "o1"))?;
    store.register(&mut txn, &quad("g", "s", "p", "o2"))?;
    let err = store
        .register(&mut txn, &quad("g", "s", "p", "o3"))
        .unwrap_err();
    assert!(matches!(err, QuadError::Range { index: 2, max: 1 }));
    assert!(!txn.is_active());
    assert_eq!(store.size(&txn)?, 2);
    assert_eq!(store.term_count(&txn)?, 5);
    Ok(())
}

#[test]
fn reads_inside_a_write_see_its_own_changes() -> Result<()> {
    let store = open()?;
    let q = quad("g", "s", "p", "o");
    let mut txn = store.begin(TxnType::Write)?;
    store.register(&mut txn, &q)?;
    assert_eq!(store.transaction_mode(&txn), Some(TxnMode::Write));
    let seen: Vec<Quad> = store.find(&txn, &QuadPattern::any())?.collect::<Result<_>>()?;
    assert_eq!(seen, vec![q.clone()]);

    txn.commit()?;
    assert!(store.contains(&store.txn(), &q)?);
    Ok(())
}

#[test]
fn mutations_inside_a_read_are_refused() -> Result<()> {
    let store = open()?;
    let mut txn = store.begin(TxnType::Read)?;
    let err = store
        .register(&mut txn, &quad("g", "s", "p", "o"))
        .unwrap_err();
    assert_eq!(
        err.transaction(),
        Some(quadstore::TransactionError::WriteNotPermitted)
    );
    assert!(txn.is_active());
    txn.end()?;
    Ok(())
}

#[test]
fn dictionary_metrics_follow_options() -> Result<()> {
    let store = open()?;
    let mut txn = store.txn();
    store.register(&mut txn, &quad("g", "s", "p", "o"))?;
    store.register(&mut txn, &quad("g", "s", "p", "o"))?;
    let terms = store.term_metrics().unwrap_or_default();
    assert_eq!(terms.register_calls, 8);
    assert_eq!(terms.register_misses, 4);
    let quads = store.quad_metrics().unwrap_or_default();
    assert_eq!(quads.register_hits, 1);

    let quiet = QuadStore::open(StoreOptions::new().dict_metrics(false))?;
    assert!(quiet.term_metrics().is_none());
    Ok(())
}

#[test]
fn options_load_from_toml() -> Result<()> {
    let options = StoreOptions::from_toml_str(
        r#"
        name = "library"
        default_graph = "urn:graph:books"
        reclaim_terms = false
        "#,
    )?;
    let store = QuadStore::open(options)?;
    assert_eq!(store.options().name, "library");
    assert_eq!(store.default_graph(), &Node::iri("urn:graph:books"));

    let mut txn = store.txn();
    store.register(&mut txn, &quad("g", "s", "p", "o"))?;
    store.delete(&mut txn, &quad("g", "s", "p", "o"))?;
    assert_eq!(store.term_count(&txn)?, 4);
    Ok(())
}
