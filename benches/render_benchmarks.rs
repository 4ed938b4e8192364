//! Benchmarks for type resolution and statement rendering.
//!
//! Benchmarks cover:
//! - Catalog resolution in a fresh session (enum, domain, composite)
//! - SELECT rendering, single table and joined
//! - Multi-row INSERT with ON CONFLICT
//! - Placeholder numbering
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pgquill::ast::{number_placeholders, Expr, Insert, OnConflict, Order, Row, Select, Table};
use pgquill::catalog::{AttributeRow, CatalogSnapshot, Oid, TypeCatalog, TypeClass, TypeRow};

const MOOD: Oid = 90001;
const EMAIL: Oid = 90010;
const ADDRESS: Oid = 90020;

fn snapshot() -> CatalogSnapshot {
    let mut snapshot = CatalogSnapshot::with_builtins();
    snapshot.insert_type(TypeRow::new(MOOD, "mood", "public", TypeClass::Enum).with_array(90002));
    snapshot.insert_type(TypeRow::new(90002, "_mood", "public", TypeClass::Base).array_of(MOOD));
    snapshot.insert_enum(MOOD, vec!["sad".into(), "ok".into(), "happy".into()]);
    snapshot.insert_type(
        TypeRow::new(EMAIL, "email", "public", TypeClass::Domain).domain_over(25, true),
    );
    snapshot.insert_type(TypeRow::new(ADDRESS, "address", "public", TypeClass::Composite));
    snapshot.insert_attributes(
        ADDRESS,
        vec![
            AttributeRow::new("street", 25, true),
            AttributeRow::new("city", 25, false),
            AttributeRow::new("zip", 23, false),
        ],
    );
    snapshot
}

fn tables(source: &CatalogSnapshot) -> (Table, Table) {
    let mut catalog = TypeCatalog::new();
    let mut resolve = |oid, nullable| {
        catalog
            .resolve(source, oid, nullable)
            .expect("benchmark types resolve")
    };
    let users = Table::new(
        "users",
        vec![
            ("id", resolve(23, false)),
            ("name", resolve(25, true)),
            ("email", resolve(EMAIL, true)),
            ("mood", resolve(MOOD, false)),
            ("home", resolve(ADDRESS, true)),
        ],
    );
    let orders = Table::new(
        "orders",
        vec![
            ("id", resolve(23, false)),
            ("user_id", resolve(23, false)),
            ("total", resolve(1700, false)),
        ],
    );
    (users, orders)
}

// ---------------------------------------------------------------------------
// Benchmark groups
// ---------------------------------------------------------------------------

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    let source = snapshot();

    for (name, oid) in [("int4", 23), ("enum", MOOD), ("domain", EMAIL), ("composite", ADDRESS)] {
        group.bench_with_input(BenchmarkId::new("cold", name), &oid, |b, oid| {
            b.iter(|| {
                let mut catalog = TypeCatalog::new();
                black_box(catalog.resolve(&source, *oid, true))
            });
        });
    }

    group.bench_function("warm_composite", |b| {
        let mut catalog = TypeCatalog::new();
        b.iter(|| black_box(catalog.resolve(&source, ADDRESS, true)));
    });

    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");
    let source = snapshot();
    let (users, orders) = tables(&source);
    let user_id = users.col("id").expect("id column");
    let name = users.col("name").expect("name column");
    let order_user = orders.col("user_id").expect("user_id column");

    group.bench_function("single_table", |b| {
        b.iter(|| {
            Select::from(&users)
                .all_columns()
                .filter(Expr::equals(&name, "alice"))
                .order_by(&user_id, Order::Asc)
                .limit(50)
                .render()
        });
    });

    group.bench_function("join", |b| {
        b.iter(|| {
            Select::from(&users)
                .join(&orders)
                .all_columns()
                .filter(Expr::column(&user_id).eq(&order_user))
                .filter(Expr::within(&name, ["alice", "bob", "carol"]))
                .render()
        });
    });

    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    let source = snapshot();
    let (users, _) = tables(&source);
    let id = users.col("id").expect("id column");
    let name = users.col("name").expect("name column");
    let mood = users.col("mood").expect("mood column");

    for count in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::new("upsert_rows", count), &count, |b, count| {
            b.iter(|| {
                let rows = (0..*count).map(|i| {
                    Row::new()
                        .set(&id, i as i32)
                        .set(&name, format!("user{}", i))
                        .set(&mood, pgquill::marshal::Value::enum_label("ok"))
                });
                Insert::into_table(&users)
                    .rows(rows)
                    .on_conflict(OnConflict::on([&id]).set_excluded(&name))
                    .returning(&id)
                    .render()
            });
        });
    }

    group.finish();
}

fn bench_placeholders(c: &mut Criterion) {
    let mut group = c.benchmark_group("placeholders");
    let sql = "SELECT a, '?' FROM t WHERE a = ? AND b = CAST(? AS inet) AND c = ANY(?) \
               -- trailing ?\nORDER BY a LIMIT ?";

    group.bench_function("number", |b| {
        b.iter(|| number_placeholders(black_box(sql)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_resolution,
    bench_select,
    bench_insert,
    bench_placeholders
);
criterion_main!(benches);
