use crate::utils::error::{PartsError, Result};
use std::fmt::Display;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl Display, reason: impl Into<String>) -> PartsError {
    PartsError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// The database is only reached over plain HTTP(S).
pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    let url = Url::parse(url_str)
        .map_err(|e| invalid(field_name, url_str, format!("Invalid URL format: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(invalid(
            field_name,
            url_str,
            format!("Unsupported URL scheme: {}", scheme),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    match path {
        "" => Err(invalid(field_name, path, "Path cannot be empty")),
        p if p.contains('\0') => Err(invalid(field_name, p, "Path contains null bytes")),
        _ => Ok(()),
    }
}

pub fn validate_positive_number<T: PartialOrd + Display>(
    field_name: &str,
    value: T,
    min_value: T,
) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            &value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| PartsError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + Display>(field_name: &str, value: T, min: T, max: T) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            &value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("database.url", "http://localhost:8113").is_ok());
        assert!(validate_url("database.url", "https://cmsdca.cern.ch/mtd").is_ok());
        assert!(validate_url("database.url", "").is_err());
        assert!(validate_url("database.url", "localhost:8113/").is_err());
        assert!(validate_url("database.url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("fetch.max_group_span", 500u64, 1).is_ok());
        assert!(validate_positive_number("fetch.max_group_span", 0u64, 1).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("plot.png_dpi", 300, 10, 2400).is_ok());
        assert!(validate_range("plot.png_dpi", 5, 10, 2400).is_err());
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("out_yaml", "info/MIB/dm_info.yaml").is_ok());
        assert!(validate_path("out_yaml", "").is_err());
        assert!(validate_path("out_yaml", "bad\0name").is_err());
    }

    #[test]
    fn test_validate_non_empty_string() {
        assert!(validate_non_empty_string("kinds.sipm", "SiPMArray").is_ok());
        assert!(validate_non_empty_string("kinds.sipm", "   ").is_err());
    }
}
