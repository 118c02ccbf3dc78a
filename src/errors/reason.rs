use serde::{Deserialize, Serialize};

macro_rules! error_reasons {
    ($($name:ident = $code:literal),+ $(,)?) => {
        /// Categorical cause attached to every classified error.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ErrorReason {
            $($name),+
        }

        impl ErrorReason {
            pub const ALL: &'static [ErrorReason] = &[$(ErrorReason::$name),+];

            pub fn code(&self) -> i32 {
                match self {
                    $(ErrorReason::$name => $code),+
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ErrorReason::$name => stringify!($name)),+
                }
            }

            pub fn from_code(code: i32) -> Option<Self> {
                match code {
                    $($code => Some(ErrorReason::$name),)+
                    _ => None,
                }
            }
        }
    };
}

error_reasons! {
    Undefined = 0,
    PerformanceCounterNotFound = 100,
    MonitorUnexpectedAnomaly = 101,
    DiskInformationNotAvailable = 300,
    DiskFilterNotSupported = 301,
    WorkloadResultsNotFound = 314,
    WorkloadFailed = 315,
    WorkloadResultsParsingFailed = 316,
    MonitorFailed = 318,
    HttpNonSuccessResponse = 320,
    Http400BadRequestResponse = 321,
    Http404NotFoundResponse = 322,
    Http409ConflictResponse = 323,
    Http403ForbiddenResponse = 324,
    Http412PreconditionFailedResponse = 325,
    InvalidResults = 400,
    ApiStatePollingTimeout = 410,
    ApiRequestFailed = 411,
    SystemMemoryReadFailed = 420,
    WorkloadUnexpectedAnomaly = 430,
    FileUploadNotificationCreationFailed = 440,
    ProfileNotFound = 500,
    InvalidProfileDefinition = 501,
    NotSupported = 502,
    PlatformNotSupported = 503,
    ProcessorArchitectureNotSupported = 504,
    DependencyDescriptionInvalid = 505,
    DependencyInstallationFailed = 506,
    DependencyNotFound = 507,
    EnvironmentIsInsufficent = 508,
    InstructionsNotValid = 510,
    InstructionsNotProvided = 511,
    InvalidOrMissingLicense = 512,
    DiskFormatFailed = 515,
    DiskMountFailed = 516,
    SystemOperationFailed = 517,
    LinuxDistributionNotSupported = 518,
    NetworkTargetDoesNotExist = 520,
    WorkloadNotFound = 525,
    WorkloadDependencyMissing = 526,
    CriticalWorkloadFailure = 527,
    PackageStoreNotDefined = 530,
    ApiStartupFailed = 535,
    Unauthorized = 540,
    EnvironmentLayoutNotDefined = 550,
    LayoutInvalid = 551,
    LayoutIPAddressDoesNotMatch = 552,
    EnvironmentLayoutClientInstancesNotFound = 553,
    EnvironmentLayoutClientInstanceDuplicates = 554,
    ExtensionAssemblyInvalid = 580,
    DuplicateExtensionsFound = 581,
    DuplicatePackagesFound = 582,
    VersionNotSupported = 590,
}

impl ErrorReason {
    /// Reasons in the 500 range stop a profile run regardless of fail-fast settings.
    pub fn is_fatal(&self) -> bool {
        self.code() >= 500
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let mut codes: Vec<i32> = ErrorReason::ALL.iter().map(|r| r.code()).collect();
        let total = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), total);
    }

    #[test]
    fn test_from_code() {
        assert_eq!(ErrorReason::from_code(410), Some(ErrorReason::ApiStatePollingTimeout));
        assert_eq!(ErrorReason::from_code(9999), None);
        assert!(ErrorReason::ProfileNotFound.is_fatal());
        assert!(!ErrorReason::WorkloadFailed.is_fatal());
    }
}
