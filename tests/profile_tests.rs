//! Profile loading and preparation from files on disk.

use std::fs;

use tandem::definitions::{ComponentCategory, ExecutionProfile, ProfileExpressionEvaluator};
use tandem::engine::{prepare_profile, ProfileOptions};
use tandem::errors::{classify, ErrorReason};
use tandem::types::{Architecture, ParameterMap, Platform, PlatformSpecifics, Scalar};

const DISK_PROFILE: &str = r#"{
    "Description": "Disk IO profile",
    "MinimumExecutionInterval": "00:00:05",
    "Metadata": { "SupportsIterations": true },
    "Parameters": { "FileSize": 64, "Threads": 1 },
    "ParametersOn": [
        { "Condition": "{calculate({LogicalCoreCount} >= 32)}", "Threads": 16 },
        { "Condition": "{calculate({LogicalCoreCount} >= 8)}", "Threads": 8 }
    ],
    "Actions": [
        {
            "Type": "SequentialExecution",
            "Parameters": { "Scenario": "RandomWrite", "LoopCount": 2 },
            "Components": [
                {
                    "Type": "WaitExecutor",
                    "Parameters": {
                        "Scenario": "RandomWrite-Small",
                        "Duration": 1,
                        "Threads": "$.Parameters.Threads",
                        "QueueDepth": "{calculate({Threads} * 4)}"
                    }
                }
            ]
        },
        {
            "Type": "WaitExecutor",
            "Parameters": { "Scenario": "RandomWrite-Large", "Duration": 1, "FileSize": 1 }
        }
    ],
    "Monitors": [
        { "Type": "WaitExecutor", "Parameters": { "Scenario": "Counters", "Duration": 1 } }
    ]
}"#;

const NETWORK_PROFILE: &str = r#"
description: Network profile
parameters:
  Port: 5001
  Threads: 2
dependencies:
  - type: WaitExecutor
    parameters:
      Scenario: InstallTools
      Duration: 0
actions:
  - type: StateSynchronization
    parameters:
      Scenario: Sync
      StateId: $.parameters.Port
"#;

fn evaluator() -> ProfileExpressionEvaluator {
    ProfileExpressionEvaluator::new(
        Some(PlatformSpecifics::new(Platform::Linux, Architecture::X64)),
        8,
    )
}

#[test]
fn test_load_json_and_yaml_profiles() {
    let dir = tempfile::tempdir().unwrap();
    let json_path = dir.path().join("disk.json");
    let yaml_path = dir.path().join("network.yml");
    fs::write(&json_path, DISK_PROFILE).unwrap();
    fs::write(&yaml_path, NETWORK_PROFILE).unwrap();

    let disk = ExecutionProfile::load(&json_path).unwrap();
    assert_eq!(disk.description, "Disk IO profile");
    assert_eq!(disk.actions.len(), 2);
    assert_eq!(disk.monitors[0].category, ComponentCategory::Monitor);

    let network = ExecutionProfile::load(&yaml_path).unwrap();
    assert_eq!(network.dependencies[0].category, ComponentCategory::Dependency);
    assert_eq!(
        network.actions[0].parameters.get("StateId"),
        Some(&Scalar::from("$.Parameters.Port"))
    );
}

#[test]
fn test_missing_profile_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = ExecutionProfile::load(&dir.path().join("absent.json")).unwrap_err();
    let reason = classify(&err).and_then(|e| e.reason());
    assert_eq!(reason, Some(ErrorReason::ProfileNotFound));
}

#[test]
fn test_prepared_profile_resolves_conditions_references_and_expressions() {
    let profile = ExecutionProfile::from_json(DISK_PROFILE).unwrap();
    let profile = prepare_profile(profile, &ProfileOptions::default(), &evaluator()).unwrap();

    // Eight logical cores select the second section.
    assert_eq!(profile.parameters.get("Threads"), Some(&Scalar::Integer(8)));
    assert!(profile.parameters_on.is_empty());

    let wait = &profile.actions[0].components[0];
    assert_eq!(wait.parameters.get("Threads"), Some(&Scalar::Integer(8)));
    assert_eq!(wait.parameters.get("QueueDepth"), Some(&Scalar::Integer(32)));
    assert_eq!(
        wait.metadata.get("SupportsIterations"),
        Some(&Scalar::Boolean(true))
    );
}

#[test]
fn test_command_line_overrides_and_scenarios() {
    let profile = ExecutionProfile::from_json(DISK_PROFILE).unwrap();
    let options = ProfileOptions {
        parameters: [("FileSize", 256i64)].into_iter().collect::<ParameterMap>(),
        scenarios: vec!["-RandomWrite-Large".to_string()],
    };

    let profile = prepare_profile(profile, &options, &evaluator()).unwrap();

    assert_eq!(profile.parameters.get("FileSize"), Some(&Scalar::Integer(256)));
    assert_eq!(profile.actions.len(), 1);
    assert_eq!(profile.actions[0].scenario().as_deref(), Some("RandomWrite"));
    assert_eq!(profile.monitors.len(), 1);
}

#[test]
fn test_merged_profiles_keep_first_profile_values() {
    let mut disk = ExecutionProfile::from_json(DISK_PROFILE).unwrap();
    let network = ExecutionProfile::from_yaml(NETWORK_PROFILE).unwrap();
    disk.merge(network);

    assert_eq!(disk.description, "Disk IO profile");
    assert_eq!(disk.parameters.get("Threads"), Some(&Scalar::Integer(1)));
    assert_eq!(disk.parameters.get("Port"), Some(&Scalar::Integer(5001)));
    assert_eq!(disk.actions.len(), 3);
    assert_eq!(disk.dependencies.len(), 1);

    let prepared = prepare_profile(disk, &ProfileOptions::default(), &evaluator()).unwrap();
    assert_eq!(
        prepared.actions[2].parameters.get("StateId"),
        Some(&Scalar::Integer(5001))
    );
}

#[test]
fn test_unresolved_reference_is_a_schema_error() {
    let mut profile = ExecutionProfile::from_json(DISK_PROFILE).unwrap();
    profile.parameters.remove("Threads");
    profile.parameters_on.clear();

    let err = prepare_profile(profile, &ProfileOptions::default(), &evaluator()).unwrap_err();
    let kind = classify(&err).map(|e| e.kind());
    assert_eq!(kind, Some("Schema"));
}
