use crate::limits::*;
use crate::model::Ms;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_date(date: Ms) -> Result<(), EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&date) {
        return Err(EngineError::InvalidInput("date out of range"));
    }
    Ok(())
}

pub(crate) fn validate_capacity(capacity: u32) -> Result<(), EngineError> {
    if capacity > MAX_CAPACITY {
        return Err(EngineError::InvalidInput("capacity too large"));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<(), EngineError> {
    if email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::InvalidInput("email too long"));
    }
    // Full address validation belongs to the identity provider; this only
    // rejects values that cannot possibly be deliverable.
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(EngineError::InvalidInput("malformed email"));
    }
    Ok(())
}

pub(crate) fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::InvalidInput("name too long"));
    }
    Ok(())
}

pub(crate) fn validate_theme(theme: &str) -> Result<(), EngineError> {
    if theme.len() > MAX_THEME_LEN {
        return Err(EngineError::InvalidInput("theme too long"));
    }
    Ok(())
}

pub(crate) fn validate_menu(menu: &str) -> Result<(), EngineError> {
    if menu.len() > MAX_MENU_LEN {
        return Err(EngineError::InvalidInput("menu too long"));
    }
    Ok(())
}

pub(crate) fn validate_location(location: &str) -> Result<(), EngineError> {
    if location.len() > MAX_LOCATION_LEN {
        return Err(EngineError::InvalidInput("location too long"));
    }
    Ok(())
}
