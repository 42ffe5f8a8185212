use crate::fetch::error::FetchError;
use crate::fetch::result::{ProtocolStatus, RetryScope};

/// What the engine should do with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified {
    pub scope: RetryScope,
    /// Whether the driver that produced the error is unusable: retired and
    /// dropped from its pool without a graceful quit round-trip
    pub retire_driver: bool,
}

/// Map a fetch error to its retry scope and driver disposition
pub fn classify(error: &FetchError) -> Classified {
    let (scope, retire_driver) = match error {
        FetchError::Canceled => (RetryScope::Privacy, false),
        FetchError::SessionLost(_) => (RetryScope::Privacy, true),
        FetchError::ConnectionFailure(_) => (RetryScope::Protocol, true),
        FetchError::ScriptTimeout(_) => (RetryScope::Protocol, true),
        FetchError::ElementNotFound(_) => (RetryScope::Protocol, false),
        FetchError::MaxRetriesExceeded(_) => (RetryScope::Crawl, false),
        FetchError::Driver(_) => (RetryScope::Protocol, true),
    };
    Classified {
        scope,
        retire_driver,
    }
}

/// Terminal status a failed attempt reports back to the scheduler
pub fn status_for(error: &FetchError) -> ProtocolStatus {
    match error {
        FetchError::Canceled | FetchError::SessionLost(_) => {
            ProtocolStatus::Retry(RetryScope::Privacy)
        }
        FetchError::ConnectionFailure(_)
        | FetchError::ScriptTimeout(_)
        | FetchError::Driver(_) => ProtocolStatus::Retry(RetryScope::Protocol),
        FetchError::ElementNotFound(_) => ProtocolStatus::Failed(RetryScope::Protocol),
        FetchError::MaxRetriesExceeded(_) => ProtocolStatus::Failed(RetryScope::Crawl),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_and_driver_disposition() {
        let cases = [
            (FetchError::Canceled, RetryScope::Privacy, false),
            (
                FetchError::SessionLost("gone".into()),
                RetryScope::Privacy,
                true,
            ),
            (
                FetchError::ConnectionFailure("refused".into()),
                RetryScope::Protocol,
                true,
            ),
            (
                FetchError::ScriptTimeout("slow".into()),
                RetryScope::Protocol,
                true,
            ),
            (
                FetchError::ElementNotFound("missing".into()),
                RetryScope::Protocol,
                false,
            ),
            (FetchError::MaxRetriesExceeded(3), RetryScope::Crawl, false),
            (
                FetchError::Driver("odd".into()),
                RetryScope::Protocol,
                true,
            ),
        ];
        for (error, scope, retire) in cases {
            let classified = classify(&error);
            assert_eq!(classified.scope, scope, "{error:?}");
            assert_eq!(classified.retire_driver, retire, "{error:?}");
        }
    }

    #[test]
    fn statuses_separate_retry_from_failed() {
        assert_eq!(
            status_for(&FetchError::Canceled),
            ProtocolStatus::Retry(RetryScope::Privacy)
        );
        assert_eq!(
            status_for(&FetchError::SessionLost("gone".into())),
            ProtocolStatus::Retry(RetryScope::Privacy)
        );
        assert_eq!(
            status_for(&FetchError::ScriptTimeout("slow".into())),
            ProtocolStatus::Retry(RetryScope::Protocol)
        );
        assert_eq!(
            status_for(&FetchError::ElementNotFound("missing".into())),
            ProtocolStatus::Failed(RetryScope::Protocol)
        );
        assert_eq!(
            status_for(&FetchError::MaxRetriesExceeded(3)),
            ProtocolStatus::Failed(RetryScope::Crawl)
        );
    }
}
