use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{Config, RateConfig};
use crate::error::{AppError, AppResult};
use crate::middleware::{require_admin, AuthUser};
use crate::models::{
    ApproveStatus, Bill, BillStatus, BillsQuery, Booking, CheckoutStatus, CreateBillRequest,
    EligibilityResponse, Room, SubmitPaymentRequest, UpdateBillRequest,
};
use crate::services::billing_calculator::{self, BillQuote, MeterReadings};
use crate::services::coordinator::{revalidate, ConsistencyCoordinator};
use crate::services::cycle_guard;
use crate::services::notification_service::{DomainEvent, EventDispatcher, NotificationService};
use crate::services::state_machine::{next_bill_status, BillAction};
use crate::storage::{BillFilter, BookingFilter, PersistenceStore};
use crate::utils::validators::ensure_meter_reading;

fn allows(action: BillAction) -> impl Fn(&Bill) -> AppResult<()> {
    move |b| next_bill_status(b.bill_status, action).map(|_| ())
}

fn apply_quote(bill: &mut Bill, readings: &MeterReadings, quote: BillQuote) {
    bill.w_before = readings.w_before;
    bill.w_after = readings.w_after;
    bill.e_before = readings.e_before;
    bill.e_after = readings.e_after;
    bill.w_units = quote.w_units;
    bill.e_units = quote.e_units;
    bill.water_cost = quote.water_cost;
    bill.electric_cost = quote.electric_cost;
    bill.rent = quote.rent;
    bill.service = quote.service;
    bill.fine = quote.fine;
    bill.total = quote.total;
}

/// Закрывает счёт: пеня по оплаченному счёту не начисляется, итог пересчитывается
fn settle(bill: &mut Bill, now: DateTime<Utc>, fine_per_day: Decimal) {
    bill.paid_at = Some(now);
    bill.fine = billing_calculator::round_money(billing_calculator::fine_for(
        BillStatus::Paid,
        bill.due_date,
        now.date_naive(),
        fine_per_day,
    ));
    bill.total = billing_calculator::round_money(billing_calculator::total_of(
        bill.rent,
        bill.service,
        bill.water_cost,
        bill.electric_cost,
        bill.fine,
    ));
}

/// Предыдущее показание: явное значение из запроса, затем последний счёт
/// комнаты, затем показание при заселении
fn previous_reading(
    label: &str,
    explicit: Option<Decimal>,
    previous_bill: Option<Decimal>,
    baseline: Option<Decimal>,
) -> AppResult<Decimal> {
    explicit.or(previous_bill).or(baseline).ok_or_else(|| {
        AppError::Validation(format!(
            "Нет предыдущего показания счётчика ({}), укажите его явно",
            label
        ))
    })
}

pub struct BillService {
    store: Arc<dyn PersistenceStore>,
    coordinator: ConsistencyCoordinator,
    events: EventDispatcher,
    rates: RateConfig,
    due_day: u32,
}

impl BillService {
    pub fn new(
        store: Arc<dyn PersistenceStore>,
        notifier: Arc<dyn NotificationService>,
        config: &Config,
    ) -> Self {
        Self {
            coordinator: ConsistencyCoordinator::new(store.clone()),
            events: EventDispatcher::new(notifier),
            rates: config.rates.clone(),
            due_day: config.bill_due_day,
            store,
        }
    }

    async fn load(&self, id: Uuid) -> AppResult<Bill> {
        self.store
            .find_bill(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Счёт не найден".to_string()))
    }

    async fn load_room(&self, id: Uuid) -> AppResult<Room> {
        self.store
            .find_room(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Комната не найдена".to_string()))
    }

    async fn customer_of(&self, bill: &Bill) -> AppResult<Option<Uuid>> {
        let Some(booking_id) = bill.booking_id else {
            return Ok(None);
        };
        Ok(self
            .store
            .find_booking(booking_id)
            .await?
            .map(|b| b.customer_id))
    }

    /// Жилец видит только счета по своим бронированиям
    async fn ensure_access(&self, actor: &AuthUser, bill: &Bill) -> AppResult<()> {
        if actor.is_admin() {
            return Ok(());
        }
        match self.customer_of(bill).await? {
            Some(customer_id) if customer_id == actor.user_id => Ok(()),
            _ => Err(AppError::Forbidden),
        }
    }

    fn default_due_date(&self, month: NaiveDate) -> AppResult<NaiveDate> {
        month.with_day(self.due_day).ok_or_else(|| {
            AppError::Internal(format!("Неверный день оплаты: {}", self.due_day))
        })
    }

    pub async fn get_bill(&self, actor: &AuthUser, id: Uuid) -> AppResult<Bill> {
        let bill = self.load(id).await?;
        self.ensure_access(actor, &bill).await?;
        Ok(bill)
    }

    pub async fn list_bills(&self, actor: &AuthUser, query: BillsQuery) -> AppResult<Vec<Bill>> {
        let booking_ids = if actor.is_admin() {
            query.booking_id.map(|id| vec![id])
        } else {
            let own: Vec<Uuid> = self
                .store
                .list_bookings(&BookingFilter {
                    customer_id: Some(actor.user_id),
                    ..Default::default()
                })
                .await?
                .into_iter()
                .map(|b| b.id)
                .collect();
            Some(match query.booking_id {
                Some(id) => own.into_iter().filter(|own_id| *own_id == id).collect(),
                None => own,
            })
        };

        let filter = BillFilter {
            room_id: query.room_id,
            booking_ids,
            month: query.month.map(cycle_guard::billing_month),
            bill_status: query.bill_status,
        };
        self.store.list_bills(&filter).await
    }

    pub async fn check_eligibility(
        &self,
        actor: &AuthUser,
        room_id: Uuid,
        month: NaiveDate,
    ) -> AppResult<EligibilityResponse> {
        require_admin(actor)?;
        let room = self.load_room(room_id).await?;
        let month = cycle_guard::billing_month(month);

        let active: Option<Booking> = self
            .store
            .list_bookings(&BookingFilter {
                room_id: Some(room.id),
                approve_status: Some(ApproveStatus::Approved),
                checkout_status: Some(CheckoutStatus::NotCheckedOut),
                ..Default::default()
            })
            .await?
            .into_iter()
            .next();

        let eligibility = cycle_guard::evaluate(active.as_ref(), month)?;
        let taken = self
            .store
            .list_bills(&BillFilter {
                room_id: Some(room.id),
                month: Some(month),
                ..Default::default()
            })
            .await?
            .first()
            .map(|b| b.id);

        let reason = match (eligibility.reason(), taken) {
            (Some(reason), _) => Some(reason),
            (None, Some(bill_id)) => Some(format!("Счёт за этот месяц уже выставлен ({})", bill_id)),
            (None, None) => None,
        };

        Ok(EligibilityResponse {
            room_id: room.id,
            month,
            cutoff: cycle_guard::cutoff_for(month)?,
            eligible: reason.is_none(),
            reason,
        })
    }

    pub async fn create_bill(
        &self,
        actor: &AuthUser,
        req: CreateBillRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Bill> {
        require_admin(actor)?;
        let month = req
            .month
            .map(cycle_guard::billing_month)
            .ok_or_else(|| AppError::Validation("Расчётный месяц обязателен".to_string()))?;
        ensure_meter_reading("w_after", req.w_after)?;
        ensure_meter_reading("e_after", req.e_after)?;
        for (field, value) in [("w_before", req.w_before), ("e_before", req.e_before)] {
            if let Some(value) = value {
                ensure_meter_reading(field, value)?;
            }
        }
        let due_date = match req.due_date {
            Some(date) => date,
            None => self.default_due_date(month)?,
        };
        let initial_room = self.load_room(req.room_id).await?;

        let mut uow = self.coordinator.begin("create_bill").await?;
        let result = async {
            let fresh = uow.tx().lock_room(initial_room.id).await?;
            let room = revalidate(&initial_room, fresh, |_| Ok(()))?;

            let active = uow.tx().active_booking_for_room(room.id).await?;
            cycle_guard::ensure_eligible(active.as_ref(), month)?;
            cycle_guard::ensure_cycle_free(uow.tx(), room.id, month).await?;
            let booking = active.ok_or_else(|| {
                AppError::Conflict("В комнате нет активного бронирования".to_string())
            })?;

            let previous = uow.tx().latest_bill_before(room.id, month).await?;
            let readings = MeterReadings {
                w_before: previous_reading(
                    "вода",
                    req.w_before,
                    previous.as_ref().map(|b| b.w_after),
                    booking.checkin_water_meter,
                )?,
                w_after: req.w_after,
                e_before: previous_reading(
                    "электричество",
                    req.e_before,
                    previous.as_ref().map(|b| b.e_after),
                    booking.checkin_electric_meter,
                )?,
                e_after: req.e_after,
            };
            let quote = billing_calculator::quote(
                &readings,
                room.rent,
                &self.rates,
                due_date,
                BillStatus::Unpaid,
                now.date_naive(),
            )?;

            let mut bill = Bill {
                id: Uuid::new_v4(),
                room_id: room.id,
                booking_id: Some(booking.id),
                month,
                w_before: Decimal::ZERO,
                w_after: Decimal::ZERO,
                e_before: Decimal::ZERO,
                e_after: Decimal::ZERO,
                w_units: Decimal::ZERO,
                e_units: Decimal::ZERO,
                water_cost: Decimal::ZERO,
                electric_cost: Decimal::ZERO,
                rent: Decimal::ZERO,
                service: Decimal::ZERO,
                fine: Decimal::ZERO,
                total: Decimal::ZERO,
                due_date,
                bill_status: BillStatus::Unpaid,
                payment_slip_url: None,
                paid_at: None,
                version: 0,
                created_at: now,
                updated_at: now,
            };
            apply_quote(&mut bill, &readings, quote);
            uow.tx().insert_bill(&bill).await?;
            Ok::<_, AppError>((bill, booking.customer_id))
        }
        .await;
        let (bill, customer_id) = uow.finish(result).await?;

        tracing::info!(
            "Bill {} issued for room {} month {} total {}",
            bill.id,
            bill.room_id,
            bill.month.format("%Y-%m"),
            bill.total
        );
        self.events.publish(DomainEvent::BillIssued {
            customer_id,
            month: bill.month,
            total: bill.total,
            due_date: bill.due_date,
        });
        Ok(bill)
    }

    /// Перевыставление по новым показаниям; аренда и сбор берутся из счёта
    pub async fn update_bill(
        &self,
        actor: &AuthUser,
        id: Uuid,
        req: UpdateBillRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Bill> {
        require_admin(actor)?;
        ensure_meter_reading("w_after", req.w_after)?;
        ensure_meter_reading("e_after", req.e_after)?;
        for (field, value) in [("w_before", req.w_before), ("e_before", req.e_before)] {
            if let Some(value) = value {
                ensure_meter_reading(field, value)?;
            }
        }

        let bill = self
            .transition(id, BillAction::Edit, "update_bill", |b| {
                cycle_guard::ensure_editable(b)?;
                let readings = MeterReadings {
                    w_before: req.w_before.unwrap_or(b.w_before),
                    w_after: req.w_after,
                    e_before: req.e_before.unwrap_or(b.e_before),
                    e_after: req.e_after,
                };
                let rates = RateConfig {
                    service_fee: b.service,
                    ..self.rates.clone()
                };
                b.due_date = req.due_date.unwrap_or(b.due_date);
                let quote = billing_calculator::quote(
                    &readings,
                    b.rent,
                    &rates,
                    b.due_date,
                    BillStatus::Unpaid,
                    now.date_naive(),
                )?;
                apply_quote(b, &readings, quote);
                Ok(())
            })
            .await?;

        tracing::info!("Bill {} repriced, total {}", bill.id, bill.total);
        Ok(bill)
    }

    pub async fn submit_payment(
        &self,
        actor: &AuthUser,
        id: Uuid,
        req: SubmitPaymentRequest,
    ) -> AppResult<Bill> {
        let slip_url = req.slip_url.trim().to_string();
        if slip_url.is_empty() {
            return Err(AppError::Validation(
                "Ссылка на квитанцию обязательна".to_string(),
            ));
        }
        let initial = self.load(id).await?;
        let customer_id = match self.customer_of(&initial).await? {
            Some(customer_id) if customer_id == actor.user_id => customer_id,
            _ => return Err(AppError::Forbidden),
        };

        let bill = self
            .transition(id, BillAction::SubmitPayment, "submit_payment", |b| {
                b.payment_slip_url = Some(slip_url);
                Ok(())
            })
            .await?;

        tracing::info!("Payment slip submitted for bill {}", bill.id);
        self.events.publish(DomainEvent::PaymentSubmitted {
            customer_id,
            month: bill.month,
        });
        Ok(bill)
    }

    pub async fn verify_payment(
        &self,
        actor: &AuthUser,
        id: Uuid,
        approved: bool,
        now: DateTime<Utc>,
    ) -> AppResult<Bill> {
        require_admin(actor)?;
        let per_day = self.rates.overdue_fine_per_day;
        let bill = if approved {
            self.transition(id, BillAction::VerifyPayment, "verify_payment", |b| {
                settle(b, now, per_day);
                Ok(())
            })
            .await?
        } else {
            self.transition(id, BillAction::RejectPayment, "reject_payment", |b| {
                b.payment_slip_url = None;
                Ok(())
            })
            .await?
        };

        tracing::info!(
            "Payment for bill {} {}",
            bill.id,
            if approved { "verified" } else { "rejected" }
        );
        if let Some(customer_id) = self.customer_of(&bill).await? {
            let event = if approved {
                DomainEvent::PaymentVerified {
                    customer_id,
                    month: bill.month,
                }
            } else {
                DomainEvent::PaymentRejected {
                    customer_id,
                    month: bill.month,
                }
            };
            self.events.publish(event);
        }
        Ok(bill)
    }

    /// Оплата, принятая администратором напрямую
    pub async fn mark_paid(&self, actor: &AuthUser, id: Uuid, now: DateTime<Utc>) -> AppResult<Bill> {
        require_admin(actor)?;
        let per_day = self.rates.overdue_fine_per_day;
        let bill = self
            .transition(id, BillAction::MarkPaid, "mark_paid", |b| {
                settle(b, now, per_day);
                Ok(())
            })
            .await?;

        tracing::info!("Bill {} marked as paid", bill.id);
        if let Some(customer_id) = self.customer_of(&bill).await? {
            self.events.publish(DomainEvent::PaymentVerified {
                customer_id,
                month: bill.month,
            });
        }
        Ok(bill)
    }

    /// Пересчитывает пеню на дату `now` и сохраняет её
    pub async fn refresh_fine(
        &self,
        actor: &AuthUser,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Bill> {
        require_admin(actor)?;
        let per_day = self.rates.overdue_fine_per_day;
        let bill = self
            .transition(id, BillAction::RefreshFine, "refresh_fine", |b| {
                let fine =
                    billing_calculator::fine_for(b.bill_status, b.due_date, now.date_naive(), per_day);
                b.fine = billing_calculator::round_money(fine);
                b.total = billing_calculator::round_money(billing_calculator::total_of(
                    b.rent,
                    b.service,
                    b.water_cost,
                    b.electric_cost,
                    b.fine,
                ));
                Ok(())
            })
            .await?;

        tracing::info!("Bill {} fine refreshed: {}", bill.id, bill.fine);
        Ok(bill)
    }

    /// Переход, который меняет одну строку счёта
    async fn transition<F>(
        &self,
        id: Uuid,
        action: BillAction,
        operation: &'static str,
        mutate: F,
    ) -> AppResult<Bill>
    where
        F: FnOnce(&mut Bill) -> AppResult<()> + Send,
    {
        let initial = self.load(id).await?;
        allows(action)(&initial)?;

        let mut uow = self.coordinator.begin(operation).await?;
        let result = async {
            let fresh = uow.tx().lock_bill(id).await?;
            let mut bill = revalidate(&initial, fresh, allows(action))?;
            mutate(&mut bill)?;
            bill.bill_status = next_bill_status(bill.bill_status, action)?;
            uow.tx().update_bill(&bill).await
        }
        .await;
        uow.finish(result).await
    }
}
