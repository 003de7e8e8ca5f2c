//! Static checks run before a descriptor touches the session.

use std::collections::BTreeSet;
use std::fmt;

use uase_core_types::UiMode;

use perf_observe::Metric;

use super::{Descriptor, DescriptorError, StepOp, StepSpec};

/// Input devices steps drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Device {
    Keyboard,
    Mouse,
    Touchscreen,
    Trackpad,
}

impl Device {
    pub fn resource_kind(&self) -> &'static str {
        match self {
            Device::Keyboard => "keyboard",
            Device::Mouse => "mouse",
            Device::Touchscreen => "touchscreen",
            Device::Trackpad => "trackpad",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_kind())
    }
}

/// Devices `op` drives in `mode`; mode-dependent ops need nothing when the mode is unknown.
pub fn required_devices(op: &StepOp, mode: Option<UiMode>) -> Vec<Device> {
    match op {
        StepOp::Accel { .. }
        | StepOp::Type { .. }
        | StepOp::PressAndHold { .. }
        | StepOp::OpenLauncher => vec![Device::Keyboard],
        StepOp::LeftClick { .. }
        | StepOp::RightClick { .. }
        | StepOp::DoubleClick { .. }
        | StepOp::Scroll { .. } => vec![Device::Mouse],
        StepOp::Swipe { .. } | StepOp::LongPress { .. } => vec![Device::Touchscreen],
        StepOp::TrackpadScroll { .. } | StepOp::TrackpadSwipe { .. } => vec![Device::Trackpad],
        StepOp::Click { .. } | StepOp::SwipePage { .. } => match mode {
            Some(UiMode::Clamshell) => vec![Device::Mouse],
            Some(UiMode::Tablet) => vec![Device::Touchscreen],
            None => Vec::new(),
        },
        StepOp::SwitchTabForward => match mode {
            Some(UiMode::Clamshell) => vec![Device::Keyboard],
            Some(UiMode::Tablet) => vec![Device::Touchscreen],
            None => Vec::new(),
        },
        StepOp::ShowHotseat => match mode {
            Some(UiMode::Tablet) => vec![Device::Touchscreen],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Checks `descriptor` without running anything.
///
/// Every problem found is reported in one [`DescriptorError::Invalid`], joined by `"; "`.
pub fn validate(descriptor: &Descriptor) -> Result<(), DescriptorError> {
    let mut problems = Vec::new();

    if descriptor.name.trim().is_empty() {
        problems.push("scenario name is empty".to_string());
    }
    if descriptor.steps.is_empty() {
        problems.push("no steps".to_string());
    }

    let mut kinds = BTreeSet::new();
    for resource in &descriptor.resources {
        if !kinds.insert(resource.kind()) {
            problems.push(format!("resource {} is declared twice", resource.kind()));
        }
    }

    let mode = descriptor.pinned_mode();
    let mut needed = BTreeSet::new();
    check_steps("steps", &descriptor.steps, mode, &mut needed, &mut problems);
    check_steps("teardown", &descriptor.teardown, mode, &mut needed, &mut problems);

    if let Some(metrics) = &descriptor.metrics {
        if metrics.histograms.is_empty() {
            problems.push("metrics block names no histogram".to_string());
        }
        let mut names = BTreeSet::new();
        for histogram in &metrics.histograms {
            if !names.insert(histogram.name.as_str()) {
                problems.push(format!("histogram {} is listed twice", histogram.name));
            }
            match histogram.metric_config() {
                Ok(config) => {
                    let metric: Metric = config.metric();
                    if let Err(err) = metric.validate() {
                        problems.push(err.to_string());
                    }
                }
                Err(reason) => problems.push(reason),
            }
        }
        check_steps("metrics action", &metrics.action, mode, &mut needed, &mut problems);
    }

    for device in needed {
        if !kinds.contains(device.resource_kind()) {
            problems.push(format!(
                "steps drive the {} but no {} resource is declared",
                device, device
            ));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(descriptor.invalid(problems.join("; ")))
    }
}

fn check_steps(
    section: &str,
    steps: &[StepSpec],
    mode: Option<UiMode>,
    needed: &mut BTreeSet<Device>,
    problems: &mut Vec<String>,
) {
    let mut names = BTreeSet::new();
    for step in steps {
        if step.name.trim().is_empty() {
            problems.push(format!("{}: a {} step has no name", section, step.op.name()));
        } else if !names.insert(step.name.as_str()) {
            problems.push(format!("{}: step name {:?} is used twice", section, step.name));
        }
        check_step(section, step, mode, needed, problems);
    }
}

fn check_step(
    section: &str,
    step: &StepSpec,
    mode: Option<UiMode>,
    needed: &mut BTreeSet<Device>,
    problems: &mut Vec<String>,
) {
    needed.extend(required_devices(&step.op, mode));
    if let Some(finder) = step.op.finder() {
        if let Err(err) = finder.validate() {
            problems.push(format!("{}: {}: {}", section, step.name, err));
        }
    }
    match &step.op {
        StepOp::TrackpadSwipe { fingers, .. } if !(1..=5).contains(fingers) => {
            problems.push(format!(
                "{}: {}: trackpad swipe needs 1..=5 fingers, got {}",
                section, step.name, fingers
            ));
        }
        StepOp::Retry { attempts: 0, .. } => {
            problems.push(format!("{}: {}: retry needs at least one attempt", section, step.name));
        }
        StepOp::Sequence { steps } => {
            let nested = format!("{}: {}", section, step.name);
            check_steps(&nested, steps, mode, needed, problems);
            return;
        }
        _ => {}
    }
    for child in step.op.children() {
        if child.name.trim().is_empty() {
            problems.push(format!(
                "{}: {}: a nested {} step has no name",
                section,
                step.name,
                child.op.name()
            ));
        }
        check_step(section, child, mode, needed, problems);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Descriptor {
        Descriptor::from_yaml(text).unwrap()
    }

    fn problems(text: &str) -> String {
        match validate(&parse(text)) {
            Err(DescriptorError::Invalid { reason, .. }) => reason,
            other => panic!("expected invalid descriptor, got {:?}", other),
        }
    }

    #[test]
    fn well_formed_descriptor_passes() {
        let d = parse(
            r#"
name: ok
resources:
  - kind: keyboard
  - kind: mouse
steps:
  - name: new tab
    op: accel
    keys: Ctrl+T
  - name: click
    op: left_click
    finder: { role: button, name_regex: "^Reload" }
"#,
        );
        validate(&d).unwrap();
    }

    #[test]
    fn accel_needs_a_keyboard() {
        let reason = problems(
            r#"
name: missing
steps:
  - name: new tab
    op: accel
    keys: Ctrl+T
"#,
        );
        assert_eq!(
            reason,
            "steps drive the keyboard but no keyboard resource is declared"
        );
    }

    #[test]
    fn mode_dependent_steps_follow_the_pinned_mode() {
        let reason = problems(
            r#"
name: tablet
resources:
  - kind: ui_mode
    mode: tablet
steps:
  - name: tap
    op: click
    finder: { role: button }
"#,
        );
        assert!(reason.contains("no touchscreen resource"), "{}", reason);

        let d = parse(
            r#"
name: unknown mode
steps:
  - name: tap
    op: click
    finder: { role: button }
"#,
        );
        validate(&d).unwrap();
    }

    #[test]
    fn duplicate_names_bad_regex_and_resources_are_reported_together() {
        let reason = problems(
            r#"
name: broken
resources:
  - kind: mouse
  - kind: mouse
steps:
  - name: a
    op: wait_until_exists
    finder: { name_regex: "(" }
  - name: a
    op: sleep
    duration: 10ms
  - name: ""
    op: sleep
    duration: 10ms
metrics:
  histograms:
    - name: "bad name!"
      preset: jank
"#,
        );
        assert!(reason.contains("resource mouse is declared twice"), "{}", reason);
        assert!(reason.contains("steps: a: invalid finder"), "{}", reason);
        assert!(reason.contains("step name \"a\" is used twice"), "{}", reason);
        assert!(reason.contains("a sleep step has no name"), "{}", reason);
        assert!(reason.contains("bad name!"), "{}", reason);
    }

    #[test]
    fn nested_steps_are_checked() {
        let reason = problems(
            r#"
name: nested
resources:
  - kind: keyboard
steps:
  - name: outer
    op: retry_until
    action: { name: swipe, op: swipe, from: { x: 1, y: 1 }, to: { x: 9, y: 9 } }
    condition: { name: check, op: assert_exists, finder: { role: menu } }
"#,
        );
        assert!(reason.contains("no touchscreen resource"), "{}", reason);
    }
}
