use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Dataset '{dataset}' is invalid: {message}")]
    DatasetError { dataset: String, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Data,
    Io,
    Processing,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn dataset(dataset: impl Into<String>, message: impl Into<String>) -> Self {
        EtlError::DatasetError {
            dataset: dataset.into(),
            message: message.into(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        EtlError::ProcessingError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => ErrorCategory::Configuration,
            EtlError::CsvError(_) | EtlError::DatasetError { .. } | EtlError::ValidationError { .. } => {
                ErrorCategory::Data
            }
            EtlError::IoError(_) => ErrorCategory::Io,
            EtlError::ProcessingError { .. } => ErrorCategory::Processing,
            EtlError::ZipError(_) | EtlError::SerializationError(_) => ErrorCategory::Output,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Data => ErrorSeverity::Medium,
            ErrorCategory::Processing => ErrorSeverity::High,
            ErrorCategory::Io | ErrorCategory::Output => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::ConfigError { .. } | EtlError::ConfigValidationError { .. } => {
                "Check the TOML syntax and section names in the configuration file".to_string()
            }
            EtlError::InvalidConfigValueError { field, .. } => {
                format!("Fix the value of '{}' and run again", field)
            }
            EtlError::MissingConfigError { field } => {
                format!("Add '{}' to the configuration or pass it on the command line", field)
            }
            EtlError::CsvError(_) | EtlError::DatasetError { .. } => {
                "Verify the export headers and that dates use YYYY-MM-DD".to_string()
            }
            EtlError::ValidationError { .. } => {
                "Inspect the input data for inconsistent rows".to_string()
            }
            EtlError::IoError(_) => {
                "Check that the input files exist and the output directory is writable".to_string()
            }
            EtlError::ProcessingError { .. } => {
                "Run again with --verbose to see which report section failed".to_string()
            }
            EtlError::ZipError(_) | EtlError::SerializationError(_) => {
                "Disable compression or free disk space and retry".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Data => format!("Input data problem: {}", self),
            ErrorCategory::Io => format!("File access problem: {}", self),
            ErrorCategory::Processing => format!("Report computation failed: {}", self),
            ErrorCategory::Output => format!("Could not write the report: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_and_severity() {
        let err = EtlError::MissingConfigError {
            field: "source.sales_file".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.recovery_suggestion().contains("source.sales_file"));

        let err = EtlError::dataset("sales.csv", "line 3: bad date");
        assert_eq!(err.category(), ErrorCategory::Data);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.user_friendly_message().starts_with("Input data problem"));
    }

    #[test]
    fn test_io_errors_are_critical() {
        let err: EtlError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }
}
