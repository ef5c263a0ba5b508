//! Атомарное выполнение изменений, затрагивающих несколько строк.
//!
//! Сервис читает строки вне транзакции, проверяет переход, затем открывает
//! `UnitOfWork`, перечитывает строки с блокировкой и проверяет переход ещё раз
//! уже по свежему состоянию. Если между чтениями строку изменила другая
//! операция и переход стал недопустим, операция завершается `Conflict`.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Bill, Booking, Room};
use crate::storage::{PersistenceStore, StoreTransaction};

/// Строка с оптимистичной версией
pub trait Versioned {
    const ENTITY: &'static str;

    fn id(&self) -> Uuid;
    fn version(&self) -> i32;
}

impl Versioned for Room {
    const ENTITY: &'static str = "Комната";

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i32 {
        self.version
    }
}

impl Versioned for Booking {
    const ENTITY: &'static str = "Бронирование";

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i32 {
        self.version
    }
}

impl Versioned for Bill {
    const ENTITY: &'static str = "Счёт";

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i32 {
        self.version
    }
}

#[derive(Clone)]
pub struct ConsistencyCoordinator {
    store: Arc<dyn PersistenceStore>,
}

impl ConsistencyCoordinator {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self { store }
    }

    pub async fn begin(&self, operation: &'static str) -> AppResult<UnitOfWork> {
        let tx = self.store.begin().await.map_err(|e| {
            tracing::error!("Failed to open transaction for {}: {}", operation, e);
            e
        })?;
        Ok(UnitOfWork { tx, operation })
    }
}

pub struct UnitOfWork {
    tx: Box<dyn StoreTransaction>,
    operation: &'static str,
}

impl UnitOfWork {
    pub fn tx(&mut self) -> &mut dyn StoreTransaction {
        self.tx.as_mut()
    }

    /// Фиксирует транзакцию при успехе, иначе откатывает все изменения
    pub async fn finish<T>(self, result: AppResult<T>) -> AppResult<T> {
        match result {
            Ok(value) => {
                self.tx.commit().await.map_err(|e| {
                    tracing::error!("Commit failed for {}: {}", self.operation, e);
                    e
                })?;
                tracing::debug!("Committed {}", self.operation);
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.tx.rollback().await {
                    tracing::error!("Rollback failed for {}: {}", self.operation, rollback_err);
                }
                match &err {
                    AppError::Conflict(msg) => {
                        tracing::warn!("{} aborted with conflict: {}", self.operation, msg)
                    }
                    AppError::Database(e) => {
                        tracing::error!("{} aborted with storage error: {}", self.operation, e)
                    }
                    _ => tracing::debug!("{} aborted: {}", self.operation, err),
                }
                Err(err)
            }
        }
    }
}

/// Проверяет условие перехода на строке, перечитанной внутри транзакции
pub fn revalidate<T, F>(initial: &T, fresh: Option<T>, guard: F) -> AppResult<T>
where
    T: Versioned,
    F: FnOnce(&T) -> AppResult<()>,
{
    let fresh = fresh.ok_or_else(|| {
        AppError::Conflict(format!(
            "{} {} удалено другой операцией",
            T::ENTITY,
            initial.id()
        ))
    })?;

    if fresh.version() != initial.version() {
        tracing::debug!(
            "{} {} changed since first read (version {} -> {})",
            T::ENTITY,
            initial.id(),
            initial.version(),
            fresh.version()
        );
    }

    guard(&fresh)?;
    Ok(fresh)
}
