use super::ErrorReason;

/// Process exit-code bands derived from an error reason.
pub struct StatusCodeRegistry;

impl StatusCodeRegistry {
    pub const SUCCESS: i32 = 0;
    pub const GENERIC_CODE_ERROR: i32 = 1;
    pub const TOOLSET_ERROR_BASE: i32 = 1000;
    pub const CONFIGURATION_ERROR_BASE: i32 = 2000;
    pub const USAGE_ERROR_BASE: i32 = 3000;
    pub const SYSTEM_ERROR_BASE: i32 = 4000;
    pub const THRESHOLD_ERROR_BASE: i32 = 5000;

    pub fn band(reason: ErrorReason) -> StatusBand {
        use ErrorReason::*;

        match reason {
            WorkloadFailed
            | WorkloadResultsNotFound
            | WorkloadResultsParsingFailed
            | WorkloadUnexpectedAnomaly
            | WorkloadDependencyMissing
            | CriticalWorkloadFailure
            | MonitorFailed
            | MonitorUnexpectedAnomaly => StatusBand::Toolset,

            ProfileNotFound
            | InstructionsNotProvided
            | NotSupported
            | PlatformNotSupported
            | ProcessorArchitectureNotSupported
            | LinuxDistributionNotSupported
            | VersionNotSupported
            | InvalidOrMissingLicense => StatusBand::Usage,

            InvalidProfileDefinition
            | InstructionsNotValid
            | DependencyDescriptionInvalid
            | DiskFilterNotSupported
            | NetworkTargetDoesNotExist
            | WorkloadNotFound
            | PackageStoreNotDefined
            | EnvironmentLayoutNotDefined
            | LayoutInvalid
            | LayoutIPAddressDoesNotMatch
            | EnvironmentLayoutClientInstancesNotFound
            | EnvironmentLayoutClientInstanceDuplicates
            | ExtensionAssemblyInvalid
            | DuplicateExtensionsFound
            | DuplicatePackagesFound => StatusBand::Configuration,

            PerformanceCounterNotFound
            | DiskInformationNotAvailable
            | HttpNonSuccessResponse
            | Http400BadRequestResponse
            | Http404NotFoundResponse
            | Http409ConflictResponse
            | Http403ForbiddenResponse
            | Http412PreconditionFailedResponse
            | ApiStatePollingTimeout
            | ApiRequestFailed
            | SystemMemoryReadFailed
            | FileUploadNotificationCreationFailed
            | DependencyInstallationFailed
            | DependencyNotFound
            | EnvironmentIsInsufficent
            | DiskFormatFailed
            | DiskMountFailed
            | SystemOperationFailed
            | ApiStartupFailed
            | Unauthorized => StatusBand::System,

            InvalidResults => StatusBand::Threshold,

            Undefined => StatusBand::CodeError,
        }
    }

    pub fn status_code(reason: ErrorReason) -> i32 {
        match Self::band(reason) {
            StatusBand::CodeError => Self::GENERIC_CODE_ERROR,
            band => band.base() + reason.code(),
        }
    }

    /// Exit code for a terminal error; errors without a reason use the generic band.
    pub fn exit_code(error: &anyhow::Error) -> i32 {
        super::classify(error)
            .and_then(|e| e.reason())
            .map(Self::status_code)
            .unwrap_or(Self::GENERIC_CODE_ERROR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBand {
    Toolset,
    Configuration,
    Usage,
    System,
    Threshold,
    CodeError,
}

impl StatusBand {
    pub fn base(&self) -> i32 {
        match self {
            StatusBand::Toolset => StatusCodeRegistry::TOOLSET_ERROR_BASE,
            StatusBand::Configuration => StatusCodeRegistry::CONFIGURATION_ERROR_BASE,
            StatusBand::Usage => StatusCodeRegistry::USAGE_ERROR_BASE,
            StatusBand::System => StatusCodeRegistry::SYSTEM_ERROR_BASE,
            StatusBand::Threshold => StatusCodeRegistry::THRESHOLD_ERROR_BASE,
            StatusBand::CodeError => StatusCodeRegistry::GENERIC_CODE_ERROR,
        }
    }
}
