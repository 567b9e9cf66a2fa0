//! End-to-end tests through the billing facade.
//!
//! Tests: contract → scheduled invoice → activation → payment → statement →
//! period close, with in-memory stores and the in-memory notification bus.
//!
//! Verifies:
//! - Invoice transitions publish notifications
//! - Statement recomputes leave only the latest figures in the ledger
//! - Period close is one-shot and freezes the month

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    use talentbill_accounting::SaleRecord;
    use talentbill_contracts::{BillingCadence, CommissionTerms, Contract};
    use talentbill_core::{ClientId, Currency, DomainError, Money, Percentage, SaleId};
    use talentbill_events::EventBus;
    use talentbill_invoicing::{InvoiceState, PaymentMethod};

    use crate::collaborators::NotificationEvent;
    use crate::config::BillingConfig;
    use crate::lifecycle::PaymentRequest;
    use crate::service::{BillingService, InMemoryBilling};

    fn usd(units: i64) -> Money {
        Money::from_units(units, Currency::Usd).unwrap()
    }

    fn at(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, m, d, 10, 0, 0).unwrap()
    }

    fn setup() -> (InMemoryBilling, ClientId) {
        let billing = BillingService::in_memory(BillingConfig {
            processor_fee: Percentage::whole(10),
            ..BillingConfig::default()
        });
        let client = ClientId::new();
        billing
            .contracts
            .sign(
                Contract::new(
                    client,
                    CommissionTerms::Flat {
                        percentage: Percentage::whole(40),
                    },
                    BillingCadence::Monthly,
                    usd(200),
                    5,
                    at(1, 1),
                )
                .unwrap(),
            )
            .unwrap();
        (billing, client)
    }

    fn sell(billing: &InMemoryBilling, client_id: ClientId, units: i64, day: u32) {
        billing
            .sales
            .record(SaleRecord {
                id: SaleId::new(),
                client_id,
                amount: usd(units),
                kind: "subscription".to_string(),
                occurred_at: at(10, day),
            })
            .unwrap();
    }

    #[test]
    fn invoice_lifecycle_publishes_notifications() {
        let (billing, client) = setup();
        let sub = billing.bus.subscribe();
        let service = &billing.service;

        let invoice = service
            .create_scheduled_invoice(client, NaiveDate::from_ymd_opt(2025, 10, 5).unwrap(), at(10, 5))
            .unwrap();
        assert_eq!(invoice.state(), InvoiceState::Tracking);
        assert_eq!(invoice.total(), usd(200));

        let report = service.activate_due(at(11, 1)).unwrap();
        assert_eq!(report.transitioned, 1);

        let report = service.mark_overdue_if_past_due(at(11, 7)).unwrap();
        assert_eq!(report.transitioned, 1);

        let (paid, payment) = service
            .record_payment(
                invoice.id_typed(),
                PaymentRequest {
                    amount: usd(200),
                    paid_at: at(11, 8),
                    method: PaymentMethod::Card,
                    reference: Some("ch_123".to_string()),
                },
            )
            .unwrap();
        assert_eq!(paid.state(), InvoiceState::Paid);
        assert!(paid.outstanding().is_zero());
        assert_eq!(paid.payment_ids(), &[payment.id]);
        assert_eq!(service.payments_for_invoice(invoice.id_typed()).unwrap(), vec![payment]);

        let kinds: Vec<String> = sub
            .drain()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "billing.invoice.activated",
                "billing.invoice.overdue",
                "billing.invoice.paid"
            ]
        );
    }

    #[test]
    fn scheduled_invoice_requires_a_contract() {
        let (billing, _) = setup();
        let err = billing
            .service
            .create_scheduled_invoice(
                ClientId::new(),
                NaiveDate::from_ymd_opt(2025, 10, 5).unwrap(),
                at(10, 5),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn month_end_flow_consolidates_latest_figures_once() {
        let (billing, client) = setup();
        let sub = billing.bus.subscribe();
        let service = &billing.service;

        sell(&billing, client, 500, 3);
        service.compute_statement(client, 2025, 10, at(10, 20)).unwrap();

        // Late sale arrives; the recompute replaces the earlier figures.
        sell(&billing, client, 500, 25);
        let statement = service.compute_statement(client, 2025, 10, at(11, 1)).unwrap();
        assert_eq!(statement.gross_sales, usd(1_000));
        assert_eq!(statement.agency_commission, usd(400));
        assert_eq!(statement.processor_commission, usd(40));
        assert_eq!(statement.client_payout, usd(600));
        assert_eq!(statement.agency_net, usd(360));
        assert_eq!(
            service.get_ledger_state(Currency::Usd).unwrap().in_movement,
            usd(360)
        );

        let period = service.close_period(2025, 10, at(11, 2)).unwrap();
        assert!(period.is_closed());
        assert_eq!(period.statement_ids, vec![statement.id]);

        let state = service.get_ledger_state(Currency::Usd).unwrap();
        assert!(state.in_movement.is_zero());
        assert_eq!(state.consolidated, usd(360));

        let err = service.close_period(2025, 10, at(11, 3)).unwrap_err();
        assert_eq!(err, DomainError::PeriodAlreadyClosed("2025-10".to_string()));
        assert_eq!(service.get_ledger_state(Currency::Usd).unwrap(), state);
        assert_eq!(service.period(2025, 10).unwrap().unwrap(), period);

        let err = service.compute_statement(client, 2025, 10, at(11, 4)).unwrap_err();
        assert_eq!(err, DomainError::PeriodClosed("2025-10".to_string()));
        assert_eq!(service.statement(client, 2025, 10).unwrap().unwrap(), statement);

        service.verify_ledger().unwrap();

        let closed: Vec<_> = sub
            .drain()
            .into_iter()
            .map(|e| e.into_payload())
            .filter(|e| matches!(e, NotificationEvent::PeriodClosed { .. }))
            .collect();
        assert_eq!(closed.len(), 1);
    }

    #[test]
    fn close_waits_for_every_selling_client() {
        let (billing, client) = setup();
        let other = ClientId::new();
        sell(&billing, client, 100, 2);
        sell(&billing, other, 100, 2);
        billing
            .service
            .compute_statement(client, 2025, 10, at(11, 1))
            .unwrap();

        let err = billing.service.close_period(2025, 10, at(11, 2)).unwrap_err();
        assert!(matches!(
            err,
            DomainError::PeriodIncomplete { ref missing, .. } if missing == &vec![other.to_string()]
        ));
        assert!(billing.service.period(2025, 10).unwrap().is_none());
    }

    #[test]
    fn service_scheduler_drives_the_worker_loop() {
        let (billing, client) = setup();
        let invoice = billing
            .service
            .create_scheduled_invoice(client, NaiveDate::from_ymd_opt(2025, 10, 5).unwrap(), at(10, 5))
            .unwrap();

        let scheduler = billing.service.scheduler().unwrap();
        let report = scheduler.tick(at(11, 1)).unwrap();
        assert_eq!(report.activation.unwrap().transitioned, 1);
        assert!(report.overdue.is_some());

        let stored = billing.service.invoice(invoice.id_typed()).unwrap().unwrap();
        assert_eq!(stored.state(), InvoiceState::Pending);
    }
}
