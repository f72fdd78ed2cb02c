//! Transaction isolation across threads: admission of readers and writers,
//! visibility of staged writes, promotion and forced aborts.

#![allow(missing_docs)]

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use quadstore::{
    Node, Promote, Quad, QuadError, QuadPattern, QuadStore, Result, StoreOptions, TxnMode,
    TxnType,
};

const BLOCKED: Duration = Duration::from_millis(100);

fn quad(o: &str) -> Quad {
    Quad::new(
        Node::iri("urn:g"),
        Node::iri("urn:s"),
        Node::iri("urn:p"),
        Node::literal(o),
    )
}

fn open() -> Result<QuadStore> {
    QuadStore::open(StoreOptions::new().name("isolation"))
}

fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn readers_wait_out_an_uncommitted_writer() -> Result<()> {
    let store = open()?;
    let mut writer = store.begin(TxnType::Write)?;
    store.register(&mut writer, &quad("staged"))?;

    thread::scope(|scope| -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let store = &store;
        let reader = scope.spawn(move || {
            let size = store.size(&store.txn());
            let _ = tx.send(());
            size
        });
        assert!(
            rx.recv_timeout(BLOCKED).is_err(),
            "reader must not run alongside the writer"
        );
        writer.abort()?;
        let size = reader.join().map_err(|_| QuadError::Internal("reader panicked".into()))??;
        assert_eq!(size, 0);
        Ok(())
    })?;
    Ok(())
}

#[test]
fn committed_writes_become_visible() -> Result<()> {
    let store = open()?;
    let mut writer = store.begin(TxnType::Write)?;
    store.register(&mut writer, &quad("one"))?;

    thread::scope(|scope| -> Result<()> {
        let reader = scope.spawn(|| -> Result<Vec<Quad>> {
            let txn = store.txn();
            store.find(&txn, &QuadPattern::any())?.collect()
        });
        thread::sleep(BLOCKED);
        writer.commit()?;
        let seen = reader.join().map_err(|_| QuadError::Internal("reader panicked".into()))??;
        assert_eq!(seen, vec![quad("one")]);
        Ok(())
    })?;
    Ok(())
}

#[test]
fn readers_share_admission() -> Result<()> {
    let store = open()?;
    let first = store.begin(TxnType::Read)?;
    thread::scope(|scope| -> Result<()> {
        let handle = scope.spawn(|| -> Result<u32> {
            let second = store.begin(TxnType::Read)?;
            let readers = store.lock_snapshot().readers;
            drop(second);
            Ok(readers)
        });
        let readers = handle.join().map_err(|_| QuadError::Internal("reader panicked".into()))??;
        assert_eq!(readers, 2);
        Ok(())
    })?;
    drop(first);
    assert_eq!(store.lock_snapshot().readers, 0);
    Ok(())
}

#[test]
fn writer_waits_for_active_readers() -> Result<()> {
    let store = open()?;
    let mut reader = store.begin(TxnType::Read)?;

    thread::scope(|scope| -> Result<()> {
        let writer = scope.spawn(|| -> Result<()> {
            let mut txn = store.begin(TxnType::Write)?;
            store.register(&mut txn, &quad("late"))?;
            txn.commit()
        });
        wait_for(|| store.lock_snapshot().writers_waiting == 1);
        assert_eq!(store.size(&reader)?, 0);
        reader.end()?;
        writer.join().map_err(|_| QuadError::Internal("writer panicked".into()))??;
        Ok(())
    })?;
    assert_eq!(store.size(&store.txn())?, 1);
    assert_eq!(store.generation(), 1);
    Ok(())
}

#[test]
fn isolated_promotion_without_contention() -> Result<()> {
    let store = open()?;
    let mut txn = store.begin(TxnType::ReadPromote)?;
    assert_eq!(store.transaction_mode(&txn), Some(TxnMode::Read));
    assert!(store.register(&mut txn, &quad("x")).is_err());

    assert!(txn.promote(Promote::Isolated)?);
    assert_eq!(store.transaction_mode(&txn), Some(TxnMode::Write));
    assert_eq!(store.transaction_type(&txn), Some(TxnType::ReadPromote));
    store.register(&mut txn, &quad("x"))?;
    txn.commit()?;
    assert!(store.contains(&store.txn(), &quad("x"))?);
    Ok(())
}

#[test]
fn plain_reads_refuse_promotion() -> Result<()> {
    let store = open()?;
    let mut txn = store.begin(TxnType::Read)?;
    assert!(!txn.promote(Promote::ReadCommitted)?);
    assert_eq!(store.transaction_mode(&txn), Some(TxnMode::Read));
    txn.end()?;
    Ok(())
}

#[test]
fn read_committed_promotion_adopts_a_competing_commit() -> Result<()> {
    let store = open()?;
    let mut txn = store.begin(TxnType::ReadCommittedPromote)?;
    let before = txn.version();

    thread::scope(|scope| -> Result<()> {
        let writer = scope.spawn(|| -> Result<()> {
            let mut other = store.begin(TxnType::Write)?;
            store.register(&mut other, &quad("theirs"))?;
            other.commit()
        });
        wait_for(|| store.lock_snapshot().writers_waiting == 1);

        // Either side may take the exclusive slot first; promotion must
        // succeed regardless and observe whatever was committed.
        assert!(txn.promote(Promote::ReadCommitted)?);
        store.register(&mut txn, &quad("ours"))?;
        txn.commit()?;
        writer.join().map_err(|_| QuadError::Internal("writer panicked".into()))??;
        Ok(())
    })?;

    assert_eq!(before, Some(0));
    assert_eq!(store.generation(), 2);
    let reader = store.txn();
    assert!(store.contains(&reader, &quad("theirs"))?);
    assert!(store.contains(&reader, &quad("ours"))?);
    Ok(())
}

#[test]
fn isolated_promotion_either_wins_or_stays_read() -> Result<()> {
    let store = open()?;
    let mut txn = store.begin(TxnType::ReadPromote)?;

    thread::scope(|scope| -> Result<()> {
        let writer = scope.spawn(|| -> Result<()> {
            let mut other = store.begin(TxnType::Write)?;
            store.register(&mut other, &quad("theirs"))?;
            other.commit()
        });
        wait_for(|| store.lock_snapshot().writers_waiting == 1);

        if txn.promote(Promote::Isolated)? {
            // Promoted ahead of the competing writer, which is still waiting.
            store.register(&mut txn, &quad("ours"))?;
            assert!(!store.contains(&txn, &quad("theirs"))?);
            txn.commit()?;
        } else {
            // The competing writer committed first; this one is still a reader.
            assert_eq!(store.transaction_mode(&txn), Some(TxnMode::Read));
            txn.end()?;
        }
        writer.join().map_err(|_| QuadError::Internal("writer panicked".into()))??;
        Ok(())
    })?;
    assert!(store.contains(&store.txn(), &quad("theirs"))?);
    Ok(())
}

#[test]
fn unresolved_writer_is_force_aborted() -> Result<()> {
    let store = open()?;
    let mut txn = store.begin(TxnType::Write)?;
    store.register(&mut txn, &quad("lost"))?;
    let err = txn.end().unwrap_err();
    assert!(matches!(err, QuadError::ForcedAbort));
    assert!(!txn.is_active());
    assert_eq!(store.size(&txn)?, 0);
    assert_eq!(store.generation(), 0);
    Ok(())
}

#[test]
fn dropped_writer_releases_other_threads() -> Result<()> {
    let store = open()?;
    thread::scope(|scope| -> Result<()> {
        scope
            .spawn(|| -> Result<()> {
                let mut txn = store.begin(TxnType::Write)?;
                store.register(&mut txn, &quad("abandoned"))?;
                Ok(())
            })
            .join()
            .map_err(|_| QuadError::Internal("writer panicked".into()))??;
        Ok(())
    })?;
    assert!(!store.lock_snapshot().writer);
    assert_eq!(store.size(&store.txn())?, 0);
    Ok(())
}

#[test]
fn concurrent_writers_serialize() -> Result<()> {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 25;
    let store = open()?;

    thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::new();
        for t in 0..THREADS {
            let store = &store;
            handles.push(scope.spawn(move || -> Result<()> {
                let mut txn = store.txn();
                for i in 0..PER_THREAD {
                    store.register(&mut txn, &quad(&format!("{t}-{i}")))?;
                    let seen = store.size(&txn)?;
                    assert!(seen as usize <= THREADS * PER_THREAD);
                }
                Ok(())
            }));
        }
        for handle in handles {
            handle
                .join()
                .map_err(|_| QuadError::Internal("writer panicked".into()))??;
        }
        Ok(())
    })?;

    let reader = store.txn();
    assert_eq!(store.size(&reader)?, (THREADS * PER_THREAD) as u64);
    assert_eq!(store.generation(), (THREADS * PER_THREAD) as u64);
    let ids: Vec<Quad> = store.find(&reader, &QuadPattern::any())?.collect::<Result<_>>()?;
    assert_eq!(ids.len(), THREADS * PER_THREAD);
    Ok(())
}
