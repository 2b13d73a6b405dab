use crate::utils::error::{Result, SelectorError};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

const REPOSITORY_SCHEMES: [&str; 3] = ["http", "https", "file"];

/// Parses a repository address, accepting only the schemes a package
/// repository can be served from.
pub fn validate_repository_url(field_name: &str, url_str: &str) -> Result<Url> {
    if url_str.trim().is_empty() {
        return Err(SelectorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    let url = Url::parse(url_str).map_err(|e| SelectorError::InvalidRepository {
        value: url_str.to_string(),
        reason: format!("Invalid URL format: {}", e),
    })?;

    if !REPOSITORY_SCHEMES.contains(&url.scheme()) {
        return Err(SelectorError::InvalidRepository {
            value: url_str.to_string(),
            reason: format!("Unsupported URL scheme: {}", url.scheme()),
        });
    }
    Ok(url)
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SelectorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| SelectorError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(SelectorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_repository_url() {
        assert!(validate_repository_url("uri", "https://gitlab.example.org/jmad").is_ok());
        assert!(validate_repository_url("uri", "file:///opt/modelpacks").is_ok());
        assert!(validate_repository_url("uri", "").is_err());
        assert!(validate_repository_url("uri", "not a url").is_err());
        assert!(validate_repository_url("uri", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("refresh.packages_timeout_seconds", 30, 1, 600).is_ok());
        assert!(validate_range("refresh.packages_timeout_seconds", 0, 1, 600).is_err());
        assert!(validate_range("refresh.packages_timeout_seconds", 601, 1, 600).is_err());
    }

    #[test]
    fn test_validate_required_field() {
        let present = Some("lhc".to_string());
        let missing: Option<String> = None;
        assert_eq!(validate_required_field("package", &present).unwrap(), "lhc");
        assert!(matches!(
            validate_required_field("package", &missing),
            Err(SelectorError::MissingConfigError { .. })
        ));
        assert!(validate_non_empty_string("package", "  ").is_err());
    }
}
