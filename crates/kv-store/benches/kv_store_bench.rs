use criterion::{Criterion, criterion_group, criterion_main};
use kv_store::{InMemoryStore, KvStore, Transaction, WatchGuard};

fn bench_incr(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();

    c.bench_function("kv_store/incr_by", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.incr_by("stock:bench", 1).await.unwrap();
            });
        });
    });
}

fn bench_watch_exec_single_key(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let keys = vec!["stock:bench".to_string()];

    c.bench_function("kv_store/watch_exec_single_key", |b| {
        b.iter(|| {
            rt.block_on(async {
                let guard = store.watch(&keys).await.unwrap();
                let mut txn = Transaction::new();
                txn.incr_by("stock:bench", 1);
                guard.exec(txn).await.unwrap();
            });
        });
    });
}

fn bench_watch_exec_checkout_shape(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let keys: Vec<String> = (0..5).map(|i| format!("stock:{i}")).collect();

    c.bench_function("kv_store/watch_exec_five_items", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut guard = store.watch(&keys).await.unwrap();
                for key in &keys {
                    guard.get(key).await.unwrap();
                }
                let mut txn = Transaction::new();
                for key in &keys {
                    txn.incr_by(key.as_str(), 1);
                }
                txn.hash_set("order:bench", [("status", "created")])
                    .list_push("user:bench:orders", "bench")
                    .delete("cart:bench");
                guard.exec(txn).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_incr,
    bench_watch_exec_single_key,
    bench_watch_exec_checkout_shape
);
criterion_main!(benches);
