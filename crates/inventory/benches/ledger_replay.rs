use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use pansoft_core::{Aggregate, ProductId, SupplyId};
use pansoft_inventory::{
    Movement, MovementPlan, MovementType, RecordMovement, StockLevel, StockPolicy, StockSubject,
    audit_subject, plan_repairs, replay,
};
use rust_decimal::Decimal;

/// Build a valid ledger of `len` movements alternating entrada/salida/ajuste.
fn build_ledger(subject: StockSubject, len: usize) -> (Vec<Movement>, Decimal) {
    let mut level = StockLevel::new(subject, Decimal::ZERO, StockPolicy::default());
    let mut ledger = Vec::with_capacity(len);

    for i in 0..len {
        let (kind, qty) = match i % 3 {
            0 => (MovementType::Entrada, Decimal::new(1250, 2)),
            1 => (MovementType::Salida, Decimal::new(400, 2)),
            _ => (MovementType::Ajuste, level.quantity() + Decimal::ONE),
        };
        let cmd = RecordMovement::new(subject, kind, qty);
        if let Ok(events) = level.handle(&cmd) {
            for m in events {
                level.apply(&m);
                ledger.push(m);
            }
        }
    }

    (ledger, level.quantity())
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_replay");

    for len in [10usize, 100, 1_000, 10_000].iter() {
        let subject = StockSubject::Product(ProductId::new());
        let (ledger, _) = build_ledger(subject, *len);
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &ledger, |b, ledger| {
            b.iter(|| black_box(replay(Decimal::ZERO, ledger)));
        });
    }

    group.finish();
}

fn bench_audit(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_audit");

    for len in [100usize, 1_000, 10_000].iter() {
        let subject = StockSubject::Supply(SupplyId::new());
        let (mut ledger, final_qty) = build_ledger(subject, *len);
        // One corrupt row so the repair planner has work to do.
        if let Some(m) = ledger.get_mut(len / 2) {
            m.quantity_change = Decimal::ZERO;
        }

        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &ledger, |b, ledger| {
            b.iter(|| {
                let audit = audit_subject(subject, final_qty, ledger);
                black_box(plan_repairs(&audit, Utc::now()))
            });
        });
    }

    group.finish();
}

fn bench_order_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("movement_plan");
    group.sample_size(500);

    for lines in [1usize, 10, 50].iter() {
        let subjects: Vec<StockSubject> = (0..*lines)
            .map(|_| StockSubject::Product(ProductId::new()))
            .collect();
        let commands: Vec<RecordMovement> = subjects
            .iter()
            .map(|s| RecordMovement::new(*s, MovementType::Salida, Decimal::new(3, 0)))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(lines), &commands, |b, commands| {
            b.iter(|| {
                let mut plan = MovementPlan::new(StockPolicy::default());
                for s in MovementPlan::subjects_of(commands) {
                    plan.load(s, Decimal::new(100, 0));
                }
                plan.record_all(commands).ok();
                black_box(plan.final_levels())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_replay, bench_audit, bench_order_plan);
criterion_main!(benches);
