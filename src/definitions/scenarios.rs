use crate::definitions::{ExecutionProfile, ProfileElement};

impl ProfileElement {
    /// True when the element's `Scenario` matches one of `scenarios`.
    pub fn is_targeted(&self, scenarios: &[String]) -> bool {
        match self.scenario() {
            Some(scenario) => scenarios.iter().any(|s| s.eq_ignore_ascii_case(&scenario)),
            None => false,
        }
    }

    /// True when `-<Scenario>` appears in `scenarios`.
    pub fn is_excluded(&self, scenarios: &[String]) -> bool {
        match self.scenario() {
            Some(scenario) => scenarios.iter().any(|s| {
                s.strip_prefix('-')
                    .map(|name| name.eq_ignore_ascii_case(&scenario))
                    .unwrap_or(false)
            }),
            None => false,
        }
    }

    fn has_targeted_descendant(&self, includes: &[String]) -> bool {
        self.components
            .iter()
            .any(|c| c.is_targeted(includes) || c.has_targeted_descendant(includes))
    }
}

/// Splits a scenario list into `(includes, excludes)`; excludes keep their `-` prefix.
pub fn split_scenarios(scenarios: &[String]) -> (Vec<String>, Vec<String>) {
    scenarios
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .partition(|s| !s.starts_with('-'))
}

impl ExecutionProfile {
    /// Removes components not selected by the scenario list.
    ///
    /// Excluded (`-Name`) components are removed everywhere. When include names are given,
    /// only actions that are targeted (or contain a targeted child) remain; children of a
    /// targeted composite are kept unless excluded. Includes take precedence over excludes.
    pub fn filter_scenarios(&mut self, scenarios: &[String]) {
        let (includes, excludes) = split_scenarios(scenarios);
        if includes.is_empty() && excludes.is_empty() {
            return;
        }

        retain(&mut self.actions, &includes, &excludes);
        retain(&mut self.dependencies, &[], &excludes);
        retain(&mut self.monitors, &[], &excludes);
    }
}

fn retain(elements: &mut Vec<ProfileElement>, includes: &[String], excludes: &[String]) {
    elements.retain(|e| {
        if !includes.is_empty() {
            e.is_targeted(includes) || e.has_targeted_descendant(includes)
        } else {
            !e.is_excluded(excludes)
        }
    });

    for element in elements.iter_mut() {
        if !includes.is_empty() && element.is_targeted(includes) {
            retain(&mut element.components, &[], excludes);
        } else {
            retain(&mut element.components, includes, excludes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParameterMap;

    fn element(scenario: &str) -> ProfileElement {
        ProfileElement::new("WaitExecutor", [("Scenario", scenario)].into_iter().collect())
    }

    fn names(elements: &[ProfileElement]) -> Vec<String> {
        elements.iter().filter_map(|e| e.scenario()).collect()
    }

    #[test]
    fn test_targeting_is_case_insensitive() {
        let e = element("RandomRead");
        assert!(e.is_targeted(&["randomread".to_string()]));
        assert!(e.is_excluded(&["-RANDOMREAD".to_string()]));
        assert!(!e.is_excluded(&["randomread".to_string()]));
    }

    #[test]
    fn test_exclusions_apply_everywhere() {
        let mut profile = ExecutionProfile::new("scenarios");
        profile.actions = vec![element("A"), element("B")];
        profile.monitors = vec![element("M")];

        profile.filter_scenarios(&["-B".to_string(), "-M".to_string()]);

        assert_eq!(names(&profile.actions), vec!["A"]);
        assert!(profile.monitors.is_empty());
    }

    #[test]
    fn test_includes_take_precedence() {
        let mut profile = ExecutionProfile::new("scenarios");
        profile.actions = vec![element("A"), element("B"), element("C")];
        profile.dependencies = vec![element("D")];

        profile.filter_scenarios(&["B".to_string(), "-B".to_string()]);

        assert_eq!(names(&profile.actions), vec!["B"]);
        assert_eq!(names(&profile.dependencies), vec!["D"]);
    }

    #[test]
    fn test_composite_kept_for_targeted_child() {
        let mut profile = ExecutionProfile::new("scenarios");
        let parent = ProfileElement::new("ParallelLoopExecution", ParameterMap::new())
            .with_children(vec![element("A"), element("B")]);
        profile.actions = vec![parent];

        profile.filter_scenarios(&["b".to_string()]);

        assert_eq!(profile.actions.len(), 1);
        assert_eq!(names(&profile.actions[0].components), vec!["B"]);
    }
}
