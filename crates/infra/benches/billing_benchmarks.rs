use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use talentbill_accounting::LedgerReason;
use talentbill_core::{ClientId, Currency, Money};
use talentbill_infra::store::{InMemoryInvoiceStore, InMemoryPaymentStore};
use talentbill_infra::{InvoiceLifecycle, LedgerBook, ManualInvoiceRequest, Notifier};
use talentbill_invoicing::LineItemInput;

fn usd(units: i64) -> Money {
    Money::from_units(units, Currency::Usd).unwrap()
}

fn manual_request() -> ManualInvoiceRequest {
    ManualInvoiceRequest {
        client_id: ClientId::new(),
        contract_id: None,
        lines: vec![LineItemInput {
            concept: "Campaign".to_string(),
            quantity: 2,
            unit_price: usd(150),
        }],
        discount: Money::zero(Currency::Usd),
        issue_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
        due_days: None,
        period: None,
        notes: None,
    }
}

fn bench_invoice_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoice_creation");
    group.sample_size(1000);

    group.bench_function("create_manual_with_allocation", |b| {
        let (notifier, _bus) = Notifier::in_memory();
        let lifecycle = InvoiceLifecycle::new(
            InMemoryInvoiceStore::arc(),
            Arc::new(InMemoryPaymentStore::new()),
            notifier,
            "INV",
            5,
        );
        let now = Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap();

        b.iter(|| black_box(lifecycle.create_manual(manual_request(), now).unwrap()));
    });

    group.finish();
}

fn bench_ledger_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_replay");

    for size in [10u64, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::new("verify", size), size, |b, &size| {
            let book = LedgerBook::new();
            let now = Utc::now();
            for i in 0..size {
                book.credit(usd(i as i64), LedgerReason::StatementRecognized, "bench", now)
                    .unwrap();
            }

            b.iter(|| black_box(book.verify().unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_invoice_creation, bench_ledger_replay);
criterion_main!(benches);
