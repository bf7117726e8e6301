//! Configuration validation utilities.

use tracing_subscriber::filter::Directive;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotCreationOptions, LogOutput, LoggingConfig};
use courier_framework::DispatchConfig;
use tokio::sync::Semaphore;

/// Longest display name the upstream service accepts.
pub const MAX_NAME_LEN: usize = 64;
/// Longest description the upstream service accepts.
pub const MAX_DESCRIPTION_LEN: usize = 512;
/// Longest short description the upstream service accepts.
pub const MAX_SHORT_DESCRIPTION_LEN: usize = 120;

/// Validates a complete set of options.
pub fn validate_options(options: &BotCreationOptions) -> ConfigResult<()> {
    validate_token(&options.token)?;
    validate_length("name", options.name.as_deref(), MAX_NAME_LEN)?;
    validate_length(
        "description",
        options.description.as_deref(),
        MAX_DESCRIPTION_LEN,
    )?;
    validate_length(
        "short_description",
        options.short_description.as_deref(),
        MAX_SHORT_DESCRIPTION_LEN,
    )?;
    if options.logger_name.trim().is_empty() {
        return Err(ConfigError::validation(
            "logger_name",
            "must not be empty",
        ));
    }
    if let Some(username) = options.username.as_deref()
        && (username.trim_start_matches('@').is_empty()
            || username.chars().any(char::is_whitespace))
    {
        return Err(ConfigError::validation(
            "username",
            "must be a non-empty name without whitespace",
        ));
    }
    validate_dispatch(&options.dispatch)?;
    validate_logging(&options.logging)?;
    Ok(())
}

fn validate_token(token: &str) -> ConfigResult<()> {
    if token.is_empty() {
        return Err(ConfigError::validation("token", "must not be empty"));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation(
            "token",
            "must not contain whitespace",
        ));
    }
    Ok(())
}

/// Lengths are counted in characters, not bytes.
fn validate_length(field: &str, value: Option<&str>, max: usize) -> ConfigResult<()> {
    let Some(value) = value else {
        return Ok(());
    };
    let len = value.chars().count();
    if len > max {
        return Err(ConfigError::validation(
            field,
            format!("is {len} characters long, the limit is {max}"),
        ));
    }
    Ok(())
}

fn validate_dispatch(dispatch: &DispatchConfig) -> ConfigResult<()> {
    match dispatch.max_in_flight {
        Some(0) => Err(ConfigError::validation(
            "dispatch.max_in_flight",
            "must be greater than 0",
        )),
        Some(limit) if limit > Semaphore::MAX_PERMITS => Err(ConfigError::validation(
            "dispatch.max_in_flight",
            format!("must be at most {}", Semaphore::MAX_PERMITS),
        )),
        _ => Ok(()),
    }
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    for (target, level) in &logging.filters {
        let directive = format!("{target}={level}");
        if target.trim().is_empty() || directive.parse::<Directive>().is_err() {
            return Err(ConfigError::validation(
                format!("logging.filters.{target}"),
                format!("'{directive}' is not a valid filter directive"),
            ));
        }
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path",
            "is required when logging.output is \"file\"",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    fn valid() -> BotCreationOptions {
        BotCreationOptions::new("123456:abc-DEF")
    }

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_options() {
        assert!(validate_options(&valid().name("Demo").short_description("Hi")).is_ok());
    }

    #[test]
    fn test_token_rules() {
        assert_eq!(field_of(validate_options(&BotCreationOptions::default())), "token");
        assert_eq!(field_of(validate_options(&BotCreationOptions::new("12 34"))), "token");
    }

    #[test]
    fn test_metadata_lengths() {
        let ok = valid().name("n".repeat(MAX_NAME_LEN));
        assert!(validate_options(&ok).is_ok());

        let long_name = valid().name("n".repeat(MAX_NAME_LEN + 1));
        assert_eq!(field_of(validate_options(&long_name)), "name");

        // Multi-byte characters count once.
        let wide = valid().short_description("é".repeat(MAX_SHORT_DESCRIPTION_LEN));
        assert!(validate_options(&wide).is_ok());

        let long_desc = valid().description("d".repeat(MAX_DESCRIPTION_LEN + 1));
        assert_eq!(field_of(validate_options(&long_desc)), "description");
    }

    #[test]
    fn test_max_in_flight_bounds() {
        let mut options = valid();
        options.dispatch.max_in_flight = Some(0);
        assert_eq!(field_of(validate_options(&options)), "dispatch.max_in_flight");

        options.dispatch.max_in_flight = Some(usize::MAX);
        assert_eq!(field_of(validate_options(&options)), "dispatch.max_in_flight");

        options.dispatch.max_in_flight = Some(Semaphore::MAX_PERMITS + 1);
        assert_eq!(field_of(validate_options(&options)), "dispatch.max_in_flight");

        for limit in [1, Semaphore::MAX_PERMITS] {
            options.dispatch.max_in_flight = Some(limit);
            assert!(validate_options(&options).is_ok());
        }
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_options(&valid().username("@courier_bot")).is_ok());
        assert_eq!(field_of(validate_options(&valid().username("@"))), "username");
        assert_eq!(field_of(validate_options(&valid().username("my bot"))), "username");
    }

    #[test]
    fn test_logging_rules() {
        let mut options = valid();
        options
            .logging
            .filters
            .insert("courier_framework".into(), LogLevel::Debug);
        assert!(validate_options(&options).is_ok());

        options.logging.filters.insert(" ".into(), LogLevel::Debug);
        assert!(validate_options(&options).is_err());

        let mut options = valid();
        options.logging.output = LogOutput::File;
        assert_eq!(field_of(validate_options(&options)), "logging.file_path");
    }
}
