use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::runtime::Runtime;

use storeops_core::{Money, Principal, ProductId, Role, SupplierId, UserId};
use storeops_infra::{Engine, InMemoryStore};
use storeops_products::{NewProduct, ProductDetails};
use storeops_purchasing::{CreateSupply, SupplyHeader, SupplyLine};
use storeops_sales::CreateSale;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn register(rt: &Runtime, engine: &Engine, initial_qty: i64, min_threshold: i64) -> ProductId {
    rt.block_on(engine.register_product(NewProduct {
        details: ProductDetails {
            name: "Bench Item".to_string(),
            department_id: None,
            supplier_id: None,
            price: Money::new(dec!(1.25)).unwrap(),
            min_threshold,
            grade: None,
            expiry_date: None,
            storage_condition: None,
        },
        initial_qty,
    }))
    .unwrap()
    .id_typed()
}

fn supply(lines: &[ProductId]) -> CreateSupply {
    CreateSupply::new(
        SupplyHeader {
            supplier_id: SupplierId::new(),
            total_cost: None,
        },
        lines
            .iter()
            .map(|product_id| SupplyLine {
                product_id: *product_id,
                quantity: 1,
                unit_price: Money::new(dec!(0.75)).unwrap(),
            })
            .collect(),
        Principal::new(UserId::new(), Role::Manager),
    )
}

fn bench_sale_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("sale_latency");
    let rt = runtime();

    group.bench_function("create_sale", |b| {
        let engine = Engine::new(Arc::new(InMemoryStore::new()));
        let product_id = register(&rt, &engine, i64::MAX / 2, 0);
        let cashier = Principal::new(UserId::new(), Role::Cashier);

        b.iter(|| {
            let cmd = CreateSale::new(product_id, black_box(1), cashier);
            rt.block_on(engine.create_sale(cmd)).unwrap();
        });
    });

    group.bench_function("create_sale_rejected", |b| {
        let engine = Engine::new(Arc::new(InMemoryStore::new()));
        let product_id = register(&rt, &engine, 0, 0);
        let cashier = Principal::new(UserId::new(), Role::Cashier);

        b.iter(|| {
            let cmd = CreateSale::new(product_id, black_box(1), cashier);
            black_box(rt.block_on(engine.create_sale(cmd)).unwrap_err());
        });
    });

    group.finish();
}

fn bench_supply_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("supply_throughput");
    let rt = runtime();

    for items in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*items as u64));
        group.bench_with_input(BenchmarkId::new("create_supply", items), items, |b, &size| {
            let engine = Engine::new(Arc::new(InMemoryStore::new()));
            let products: Vec<ProductId> = (0..size).map(|_| register(&rt, &engine, 0, 0)).collect();

            b.iter(|| {
                black_box(rt.block_on(engine.create_supply(supply(&products))).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_analytics(c: &mut Criterion) {
    let mut group = c.benchmark_group("analytics");
    let rt = runtime();

    for catalog in [100usize, 1_000].iter() {
        let engine = Engine::new(Arc::new(InMemoryStore::new()));
        let cashier = Principal::new(UserId::new(), Role::Cashier);
        let products: Vec<ProductId> = (0..*catalog)
            .map(|i| register(&rt, &engine, 10, (i % 20) as i64))
            .collect();
        for product_id in &products {
            rt.block_on(engine.create_sale(CreateSale::new(*product_id, 1, cashier)))
                .unwrap();
        }

        group.throughput(Throughput::Elements(*catalog as u64));
        group.bench_with_input(BenchmarkId::new("low_stock", catalog), catalog, |b, _| {
            b.iter(|| black_box(rt.block_on(engine.low_stock_products()).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("sales_summary", catalog), catalog, |b, _| {
            b.iter(|| {
                black_box(
                    rt.block_on(engine.sales_summary("1970-01-01", "9999-12-31"))
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_sale_latency,
    bench_supply_throughput,
    bench_analytics
);
criterion_main!(benches);
