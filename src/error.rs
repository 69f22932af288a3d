use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("bad request")]
    BadRequest,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("request timed out")]
    Timeout,
    #[error("server error")]
    ServerError,
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("failed to parse response")]
    ParseError,
    #[error("no internet connection")]
    NoInternet,
    #[error("unknown network error")]
    Unknown,
}

impl NetworkError {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            408 => Self::Timeout,
            500 => Self::ServerError,
            503 => Self::ServiceUnavailable,
            _ => Self::Unknown,
        }
    }

    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::NoInternet
        } else if err.is_decode() {
            Self::ParseError
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocalError {
    #[error("no read permission")]
    NoReadPermission,
    #[error("no write permission")]
    NoWritePermission,
    #[error("failed to read")]
    FailedToRead,
    #[error("failed to write")]
    FailedToWrite,
    #[error("unknown local error")]
    Unknown,
}

impl LocalError {
    pub fn from_io(err: &std::io::Error, writing: bool) -> Self {
        match (err.kind(), writing) {
            (std::io::ErrorKind::PermissionDenied, false) => Self::NoReadPermission,
            (std::io::ErrorKind::PermissionDenied, true) => Self::NoWritePermission,
            (_, false) => Self::FailedToRead,
            (_, true) => Self::FailedToWrite,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DataError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Local(#[from] LocalError),
}

impl DataError {
    /// Short text shown to the user when an action fails.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Network(NetworkError::BadRequest) => "Title or artist is missing",
            Self::Network(NetworkError::Unauthorized) => "Not authorized",
            Self::Network(NetworkError::Forbidden) => "Access forbidden",
            Self::Network(NetworkError::NotFound) => "Nothing found",
            Self::Network(NetworkError::Timeout) => "Request timed out",
            Self::Network(NetworkError::ServerError) => "Server error, try again later",
            Self::Network(NetworkError::ServiceUnavailable) => "Service is unavailable",
            Self::Network(NetworkError::ParseError) => "Failed to parse response",
            Self::Network(NetworkError::NoInternet) => "No internet connection",
            Self::Local(LocalError::NoReadPermission) => "No read permission",
            Self::Local(LocalError::NoWritePermission) => "No write permission",
            Self::Local(LocalError::FailedToRead) => "Failed to read file",
            Self::Local(LocalError::FailedToWrite) => "Failed to write file",
            Self::Network(NetworkError::Unknown) | Self::Local(LocalError::Unknown) => {
                "Unknown error occurred"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LyricsError {
    #[error("malformed lyrics timestamp: {0}")]
    Format(String),
    #[error("synced lines not found")]
    NoSyncedLines,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_categories() {
        assert_eq!(NetworkError::from_status(400), NetworkError::BadRequest);
        assert_eq!(NetworkError::from_status(404), NetworkError::NotFound);
        assert_eq!(NetworkError::from_status(503), NetworkError::ServiceUnavailable);
        assert_eq!(NetworkError::from_status(418), NetworkError::Unknown);
    }

    #[test]
    fn io_errors_split_by_direction() {
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(LocalError::from_io(&denied, false), LocalError::NoReadPermission);
        assert_eq!(LocalError::from_io(&denied, true), LocalError::NoWritePermission);

        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(LocalError::from_io(&missing, false), LocalError::FailedToRead);
    }

    #[test]
    fn data_error_wraps_both_sides() {
        let err: DataError = NetworkError::NoInternet.into();
        assert_eq!(err.user_message(), "No internet connection");
        assert_eq!(err.to_string(), "no internet connection");
    }
}
