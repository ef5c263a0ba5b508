use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use validator::ValidationError;

use crate::error::{AppError, AppResult};

static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{9,15}$").unwrap());

pub fn validate_phone(phone: &str) -> bool {
    PHONE_REGEX.is_match(&normalize_phone(phone))
}

/// Убирает пробелы, дефисы и скобки из номера телефона
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

pub fn validate_phone_field(phone: &str) -> Result<(), ValidationError> {
    if validate_phone(phone) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some("неверный формат телефона".into());
        Err(err)
    }
}

pub fn sanitize_string(input: &str) -> String {
    input.trim().to_string()
}

pub fn ensure_non_negative(field: &str, value: Decimal) -> AppResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::Validation(format!(
            "{} не может быть отрицательным",
            field
        )));
    }
    Ok(())
}

/// Показания счётчиков хранятся как NUMERIC(12, 3)
pub const METER_SCALE: u32 = 3;

/// Показание счётчика: неотрицательное, не больше трёх знаков после запятой
/// и помещается в колонку без округления
pub fn ensure_meter_reading(field: &str, value: Decimal) -> AppResult<()> {
    ensure_non_negative(field, value)?;
    let value = value.normalize();
    if value.scale() > METER_SCALE {
        return Err(AppError::Validation(format!(
            "{}: не более {} знаков после запятой",
            field, METER_SCALE
        )));
    }
    if value >= Decimal::new(1_000_000_000, 0) {
        return Err(AppError::Validation(format!(
            "{}: слишком большое показание",
            field
        )));
    }
    Ok(())
}
