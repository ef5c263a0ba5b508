use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(&self, recipient_id: Uuid, message: &str) -> AppResult<()>;
}

pub struct WebhookNotifier {
    config: Config,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    recipient_id: Uuid,
    message: &'a str,
}

impl WebhookNotifier {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationService for WebhookNotifier {
    async fn notify(&self, recipient_id: Uuid, message: &str) -> AppResult<()> {
        let url = match (&self.config.notify_webhook_url, self.config.notify_enabled) {
            (Some(url), true) => url,
            _ => {
                tracing::info!("Notifications disabled. Message for {}: {}", recipient_id, message);
                return Ok(());
            }
        };

        let response = self
            .client
            .post(url)
            .json(&WebhookPayload {
                recipient_id,
                message,
            })
            .send()
            .await
            .map_err(|e| AppError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Notification webhook error: {} - {}", status, body);
            return Err(AppError::Notification(format!(
                "Notification webhook error: {}",
                status
            )));
        }

        tracing::info!("Notification sent to {}", recipient_id);
        Ok(())
    }
}

/// Событие, которое публикуется после успешной фиксации транзакции
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    BookingApproved { customer_id: Uuid, room_number: String },
    BookingRejected { customer_id: Uuid, room_number: String },
    CheckedIn { customer_id: Uuid, room_number: String },
    CheckoutRequested { customer_id: Uuid, checkout_date: NaiveDate },
    CheckoutApproved { customer_id: Uuid, room_number: String },
    CheckoutRejected { customer_id: Uuid },
    BillIssued {
        customer_id: Uuid,
        month: NaiveDate,
        total: Decimal,
        due_date: NaiveDate,
    },
    PaymentSubmitted { customer_id: Uuid, month: NaiveDate },
    PaymentVerified { customer_id: Uuid, month: NaiveDate },
    PaymentRejected { customer_id: Uuid, month: NaiveDate },
}

impl DomainEvent {
    pub fn recipient(&self) -> Uuid {
        match self {
            DomainEvent::BookingApproved { customer_id, .. }
            | DomainEvent::BookingRejected { customer_id, .. }
            | DomainEvent::CheckedIn { customer_id, .. }
            | DomainEvent::CheckoutRequested { customer_id, .. }
            | DomainEvent::CheckoutApproved { customer_id, .. }
            | DomainEvent::CheckoutRejected { customer_id }
            | DomainEvent::BillIssued { customer_id, .. }
            | DomainEvent::PaymentSubmitted { customer_id, .. }
            | DomainEvent::PaymentVerified { customer_id, .. }
            | DomainEvent::PaymentRejected { customer_id, .. } => *customer_id,
        }
    }

    pub fn message(&self) -> String {
        match self {
            DomainEvent::BookingApproved { room_number, .. } => {
                format!("Бронирование комнаты {} одобрено", room_number)
            }
            DomainEvent::BookingRejected { room_number, .. } => {
                format!("Бронирование комнаты {} отклонено", room_number)
            }
            DomainEvent::CheckedIn { room_number, .. } => {
                format!("Заселение в комнату {} отмечено", room_number)
            }
            DomainEvent::CheckoutRequested { checkout_date, .. } => {
                format!("Заявка на выселение {} принята", checkout_date)
            }
            DomainEvent::CheckoutApproved { room_number, .. } => {
                format!("Выселение из комнаты {} подтверждено", room_number)
            }
            DomainEvent::CheckoutRejected { .. } => "Заявка на выселение отклонена".to_string(),
            DomainEvent::BillIssued {
                month,
                total,
                due_date,
                ..
            } => format!(
                "Счёт за {} на сумму {} выставлен, оплатить до {}",
                month.format("%Y-%m"),
                total,
                due_date
            ),
            DomainEvent::PaymentSubmitted { month, .. } => {
                format!("Квитанция по счёту за {} отправлена на проверку", month.format("%Y-%m"))
            }
            DomainEvent::PaymentVerified { month, .. } => {
                format!("Оплата счёта за {} подтверждена", month.format("%Y-%m"))
            }
            DomainEvent::PaymentRejected { month, .. } => {
                format!("Оплата счёта за {} не подтверждена", month.format("%Y-%m"))
            }
        }
    }
}

/// Рассылает события в фоне; ошибка доставки только логируется
#[derive(Clone)]
pub struct EventDispatcher {
    notifier: Arc<dyn NotificationService>,
}

impl EventDispatcher {
    pub fn new(notifier: Arc<dyn NotificationService>) -> Self {
        Self { notifier }
    }

    pub fn publish(&self, event: DomainEvent) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let recipient = event.recipient();
            if let Err(e) = notifier.notify(recipient, &event.message()).await {
                tracing::error!("Failed to deliver notification to {}: {}", recipient, e);
            }
        });
    }
}
